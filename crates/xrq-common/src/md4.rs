// md4.rs — Block checksum over the RSA MD4 digest (RustCrypto `md4`)

use ::md4::{Digest, Md4};

/// XOR of the four little-endian MD4 digest words. Used as the map
/// checksum clients compare against the server's.
pub fn com_block_checksum(data: &[u8]) -> u32 {
    let digest = Md4::digest(data);
    digest
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0, |acc, w| acc ^ w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_checksum_empty() {
        // MD4("") = 31d6cfe0 d16ae931 b73c59d7 e0c089c0
        let words = [0xe0cfd631u32, 0x31e96ad1, 0xd7593cb7, 0xc089c0e0];
        assert_eq!(com_block_checksum(&[]), words.iter().fold(0, |a, w| a ^ w));
    }

    #[test]
    fn test_block_checksum_differs() {
        assert_ne!(com_block_checksum(b"IBSP\x2e\0\0\0"), com_block_checksum(b"IBSP\x2f\0\0\0"));
    }
}
