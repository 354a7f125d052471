// qfiles.rs — Compiled BSP file format: header, lump directory and record codecs
//
// Everything on disk is little-endian. Records are decoded through a
// `RecordReader` that performs the host load followed by the LittleLong /
// LittleFloat swap, so the same path is taken on either host byte order.

use rayon::prelude::*;

use crate::error::BspError;
use crate::q_shared::{Vec2, Vec3};

// ============================================================
// Header
// ============================================================

/// "IBSP" read as a little-endian int.
pub const BSP_IDENT: i32 = ((b'P' as i32) << 24) | ((b'S' as i32) << 16) | ((b'B' as i32) << 8) | b'I' as i32;
pub const BSP_VERSION: i32 = 46;

pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_SHADERS: usize = 1;
pub const LUMP_PLANES: usize = 2;
pub const LUMP_NODES: usize = 3;
pub const LUMP_LEAFS: usize = 4;
pub const LUMP_LEAFSURFACES: usize = 5;
pub const LUMP_LEAFBRUSHES: usize = 6;
pub const LUMP_MODELS: usize = 7;
pub const LUMP_BRUSHES: usize = 8;
pub const LUMP_BRUSHSIDES: usize = 9;
pub const LUMP_DRAWVERTS: usize = 10;
pub const LUMP_DRAWINDEXES: usize = 11;
pub const LUMP_FOGS: usize = 12;
pub const LUMP_SURFACES: usize = 13;
pub const LUMP_LIGHTMAPS: usize = 14;
pub const LUMP_LIGHTGRID: usize = 15;
pub const LUMP_VISIBILITY: usize = 16;
pub const HEADER_LUMPS: usize = 17;

pub const LUMP_NAMES: [&str; HEADER_LUMPS] = [
    "entities",
    "shaders",
    "planes",
    "nodes",
    "leafs",
    "leafsurfaces",
    "leafbrushes",
    "models",
    "brushes",
    "brushsides",
    "drawverts",
    "drawindexes",
    "fogs",
    "surfaces",
    "lightmaps",
    "lightgrid",
    "visibility",
];

/// ident + version + lump directory
pub const HEADER_SIZE: usize = 8 + HEADER_LUMPS * 8;

pub const MAX_PATCH_SIZE: usize = 32;
pub const MAX_GRID_SIZE: usize = 65;
pub const LIGHTGRID_POINT_SIZE: usize = 8;

/// Below this record count sequential decoding is faster.
pub const PARALLEL_LUMP_THRESHOLD: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lump {
    pub fileofs: i32,
    pub filelen: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DHeader {
    pub ident: i32,
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MapSurfaceType {
    Bad = 0,
    Planar = 1,
    Patch = 2,
    TriangleSoup = 3,
    Flare = 4,
}

impl MapSurfaceType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Bad),
            1 => Some(Self::Planar),
            2 => Some(Self::Patch),
            3 => Some(Self::TriangleSoup),
            4 => Some(Self::Flare),
            _ => None,
        }
    }
}

// ============================================================
// Byte order
// ============================================================

/// Byte order of the host doing the decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOrder {
    Little,
    Big,
}

impl HostOrder {
    pub const NATIVE: HostOrder = if cfg!(target_endian = "big") {
        HostOrder::Big
    } else {
        HostOrder::Little
    };

    /// A 4 byte memory load as this host performs it.
    #[inline]
    pub fn load(self, b: [u8; 4]) -> u32 {
        match self {
            HostOrder::Little => u32::from_le_bytes(b),
            HostOrder::Big => u32::from_be_bytes(b),
        }
    }

    #[inline]
    pub fn little_long(self, raw: u32) -> i32 {
        match self {
            HostOrder::Little => raw as i32,
            HostOrder::Big => raw.swap_bytes() as i32,
        }
    }

    #[inline]
    pub fn little_float(self, raw: u32) -> f32 {
        f32::from_bits(self.little_long(raw) as u32)
    }
}

/// Field reader over one fixed-size record.
#[derive(Clone, Copy)]
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    order: HostOrder,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8], order: HostOrder) -> Self {
        Self { bytes, order }
    }

    #[inline]
    fn raw(&self, ofs: usize) -> u32 {
        let b = &self.bytes[ofs..ofs + 4];
        self.order.load([b[0], b[1], b[2], b[3]])
    }

    #[inline]
    pub fn long(&self, ofs: usize) -> i32 {
        self.order.little_long(self.raw(ofs))
    }

    #[inline]
    pub fn float(&self, ofs: usize) -> f32 {
        self.order.little_float(self.raw(ofs))
    }

    pub fn vec2(&self, ofs: usize) -> Vec2 {
        [self.float(ofs), self.float(ofs + 4)]
    }

    pub fn vec3(&self, ofs: usize) -> Vec3 {
        [self.float(ofs), self.float(ofs + 4), self.float(ofs + 8)]
    }

    pub fn ivec3(&self, ofs: usize) -> [i32; 3] {
        [self.long(ofs), self.long(ofs + 4), self.long(ofs + 8)]
    }

    pub fn bytes4(&self, ofs: usize) -> [u8; 4] {
        let b = &self.bytes[ofs..ofs + 4];
        [b[0], b[1], b[2], b[3]]
    }

    /// NUL terminated fixed-width name.
    pub fn name(&self, ofs: usize, width: usize) -> String {
        let raw = &self.bytes[ofs..ofs + width];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(width);
        String::from_utf8_lossy(&raw[..len]).into_owned()
    }
}

fn put_long(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_float(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_floats(out: &mut Vec<u8>, v: &[f32]) {
    for &f in v {
        put_float(out, f);
    }
}

fn put_name(out: &mut Vec<u8>, name: &str, width: usize) {
    let mut field = vec![0u8; width];
    let n = name.len().min(width - 1);
    field[..n].copy_from_slice(&name.as_bytes()[..n]);
    out.extend_from_slice(&field);
}

// ============================================================
// Records
// ============================================================

/// A fixed-stride lump record.
pub trait LumpRecord: Sized + Send {
    const SIZE: usize;
    fn decode(r: &RecordReader) -> Self;
    fn encode(&self, out: &mut Vec<u8>);
}

/// Leaf surfaces, leaf brushes and draw indexes are plain ints.
impl LumpRecord for i32 {
    const SIZE: usize = 4;
    fn decode(r: &RecordReader) -> Self {
        r.long(0)
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_long(out, *self);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DShader {
    pub shader: String,
    pub surface_flags: i32,
    pub content_flags: i32,
}

impl LumpRecord for DShader {
    const SIZE: usize = 72;
    fn decode(r: &RecordReader) -> Self {
        Self {
            shader: r.name(0, 64),
            surface_flags: r.long(64),
            content_flags: r.long(68),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_name(out, &self.shader, 64);
        put_long(out, self.surface_flags);
        put_long(out, self.content_flags);
    }
}

/// Axial type and sign bits are derived at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DPlane {
    pub normal: Vec3,
    pub dist: f32,
}

impl LumpRecord for DPlane {
    const SIZE: usize = 16;
    fn decode(r: &RecordReader) -> Self {
        Self {
            normal: r.vec3(0),
            dist: r.float(12),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_floats(out, &self.normal);
        put_float(out, self.dist);
    }
}

/// Negative children are `-1 - leaf`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DNode {
    pub plane_num: i32,
    pub children: [i32; 2],
    pub mins: [i32; 3],
    pub maxs: [i32; 3],
}

impl LumpRecord for DNode {
    const SIZE: usize = 36;
    fn decode(r: &RecordReader) -> Self {
        Self {
            plane_num: r.long(0),
            children: [r.long(4), r.long(8)],
            mins: r.ivec3(12),
            maxs: r.ivec3(24),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_long(out, self.plane_num);
        self.children.iter().for_each(|&c| put_long(out, c));
        self.mins.iter().for_each(|&c| put_long(out, c));
        self.maxs.iter().for_each(|&c| put_long(out, c));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DLeaf {
    pub cluster: i32,
    pub area: i32,
    pub mins: [i32; 3],
    pub maxs: [i32; 3],
    pub first_leaf_surface: i32,
    pub num_leaf_surfaces: i32,
    pub first_leaf_brush: i32,
    pub num_leaf_brushes: i32,
}

impl LumpRecord for DLeaf {
    const SIZE: usize = 48;
    fn decode(r: &RecordReader) -> Self {
        Self {
            cluster: r.long(0),
            area: r.long(4),
            mins: r.ivec3(8),
            maxs: r.ivec3(20),
            first_leaf_surface: r.long(32),
            num_leaf_surfaces: r.long(36),
            first_leaf_brush: r.long(40),
            num_leaf_brushes: r.long(44),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_long(out, self.cluster);
        put_long(out, self.area);
        self.mins.iter().for_each(|&c| put_long(out, c));
        self.maxs.iter().for_each(|&c| put_long(out, c));
        put_long(out, self.first_leaf_surface);
        put_long(out, self.num_leaf_surfaces);
        put_long(out, self.first_leaf_brush);
        put_long(out, self.num_leaf_brushes);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_surface: i32,
    pub num_surfaces: i32,
    pub first_brush: i32,
    pub num_brushes: i32,
}

impl LumpRecord for DModel {
    const SIZE: usize = 40;
    fn decode(r: &RecordReader) -> Self {
        Self {
            mins: r.vec3(0),
            maxs: r.vec3(12),
            first_surface: r.long(24),
            num_surfaces: r.long(28),
            first_brush: r.long(32),
            num_brushes: r.long(36),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_floats(out, &self.mins);
        put_floats(out, &self.maxs);
        put_long(out, self.first_surface);
        put_long(out, self.num_surfaces);
        put_long(out, self.first_brush);
        put_long(out, self.num_brushes);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DBrush {
    pub first_side: i32,
    pub num_sides: i32,
    pub shader_num: i32,
}

impl LumpRecord for DBrush {
    const SIZE: usize = 12;
    fn decode(r: &RecordReader) -> Self {
        Self {
            first_side: r.long(0),
            num_sides: r.long(4),
            shader_num: r.long(8),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_long(out, self.first_side);
        put_long(out, self.num_sides);
        put_long(out, self.shader_num);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DBrushSide {
    pub plane_num: i32,
    pub shader_num: i32,
}

impl LumpRecord for DBrushSide {
    const SIZE: usize = 8;
    fn decode(r: &RecordReader) -> Self {
        Self {
            plane_num: r.long(0),
            shader_num: r.long(4),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_long(out, self.plane_num);
        put_long(out, self.shader_num);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawVert {
    pub xyz: Vec3,
    pub st: Vec2,
    pub lightmap: Vec2,
    pub normal: Vec3,
    pub color: [u8; 4],
}

impl LumpRecord for DrawVert {
    const SIZE: usize = 44;
    fn decode(r: &RecordReader) -> Self {
        Self {
            xyz: r.vec3(0),
            st: r.vec2(12),
            lightmap: r.vec2(20),
            normal: r.vec3(28),
            color: r.bytes4(40),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_floats(out, &self.xyz);
        put_floats(out, &self.st);
        put_floats(out, &self.lightmap);
        put_floats(out, &self.normal);
        out.extend_from_slice(&self.color);
    }
}

/// A visible side of -1 means the fog has no gradient surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DFog {
    pub shader: String,
    pub brush_num: i32,
    pub visible_side: i32,
}

impl LumpRecord for DFog {
    const SIZE: usize = 72;
    fn decode(r: &RecordReader) -> Self {
        Self {
            shader: r.name(0, 64),
            brush_num: r.long(64),
            visible_side: r.long(68),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        put_name(out, &self.shader, 64);
        put_long(out, self.brush_num);
        put_long(out, self.visible_side);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DSurface {
    pub shader_num: i32,
    pub fog_num: i32,
    pub surface_type: i32,
    pub first_vert: i32,
    pub num_verts: i32,
    pub first_index: i32,
    pub num_indexes: i32,
    pub lightmap_num: i32,
    pub lightmap_x: i32,
    pub lightmap_y: i32,
    pub lightmap_width: i32,
    pub lightmap_height: i32,
    pub lightmap_origin: Vec3,
    /// For patches, [0] and [1] bound the LOD group. For faces [2] is the
    /// plane normal; flares keep their color in [0] and normal in [2].
    pub lightmap_vecs: [Vec3; 3],
    pub patch_width: i32,
    pub patch_height: i32,
}

impl LumpRecord for DSurface {
    const SIZE: usize = 104;
    fn decode(r: &RecordReader) -> Self {
        Self {
            shader_num: r.long(0),
            fog_num: r.long(4),
            surface_type: r.long(8),
            first_vert: r.long(12),
            num_verts: r.long(16),
            first_index: r.long(20),
            num_indexes: r.long(24),
            lightmap_num: r.long(28),
            lightmap_x: r.long(32),
            lightmap_y: r.long(36),
            lightmap_width: r.long(40),
            lightmap_height: r.long(44),
            lightmap_origin: r.vec3(48),
            lightmap_vecs: [r.vec3(60), r.vec3(72), r.vec3(84)],
            patch_width: r.long(96),
            patch_height: r.long(100),
        }
    }
    fn encode(&self, out: &mut Vec<u8>) {
        for v in [
            self.shader_num,
            self.fog_num,
            self.surface_type,
            self.first_vert,
            self.num_verts,
            self.first_index,
            self.num_indexes,
            self.lightmap_num,
            self.lightmap_x,
            self.lightmap_y,
            self.lightmap_width,
            self.lightmap_height,
        ] {
            put_long(out, v);
        }
        put_floats(out, &self.lightmap_origin);
        for v in &self.lightmap_vecs {
            put_floats(out, v);
        }
        put_long(out, self.patch_width);
        put_long(out, self.patch_height);
    }
}

// ============================================================
// File view
// ============================================================

/// A validated view over a compiled BSP file.
pub struct BspFile<'a> {
    name: String,
    data: &'a [u8],
    order: HostOrder,
    pub header: DHeader,
}

impl<'a> BspFile<'a> {
    pub fn parse(name: &str, data: &'a [u8]) -> Result<Self, BspError> {
        Self::parse_with_order(name, data, HostOrder::NATIVE)
    }

    pub fn parse_with_order(name: &str, data: &'a [u8], order: HostOrder) -> Result<Self, BspError> {
        if data.len() < HEADER_SIZE {
            return Err(BspError::TooShort {
                name: name.to_string(),
                len: data.len(),
            });
        }

        let r = RecordReader::new(&data[..HEADER_SIZE], order);
        let ident = r.long(0);
        if ident != BSP_IDENT {
            return Err(BspError::WrongIdent {
                name: name.to_string(),
                ident,
            });
        }
        let version = r.long(4);
        if version != BSP_VERSION {
            return Err(BspError::WrongVersion {
                name: name.to_string(),
                found: version,
                expected: BSP_VERSION,
            });
        }

        let mut lumps = [Lump::default(); HEADER_LUMPS];
        for (i, lump) in lumps.iter_mut().enumerate() {
            lump.fileofs = r.long(8 + i * 8);
            lump.filelen = r.long(12 + i * 8);
            let end = lump.fileofs as i64 + lump.filelen as i64;
            if lump.fileofs < 0 || lump.filelen < 0 || end > data.len() as i64 {
                return Err(BspError::LumpOutOfBounds {
                    name: name.to_string(),
                    lump: LUMP_NAMES[i],
                    offset: lump.fileofs as i64,
                    len: lump.filelen as i64,
                });
            }
        }

        Ok(Self {
            name: name.to_string(),
            data,
            order,
            header: DHeader {
                ident,
                version,
                lumps,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> HostOrder {
        self.order
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn lump_bytes(&self, lump: usize) -> &'a [u8] {
        let l = &self.header.lumps[lump];
        let ofs = l.fileofs as usize;
        &self.data[ofs..ofs + l.filelen as usize]
    }

    /// Decodes a fixed-stride lump. The lump length must be a whole number
    /// of records.
    pub fn records<T: LumpRecord>(&self, lump: usize) -> Result<Vec<T>, BspError> {
        let bytes = self.lump_bytes(lump);
        if bytes.len() % T::SIZE != 0 {
            return Err(BspError::FunnyLumpSize {
                name: self.name.clone(),
                lump: LUMP_NAMES[lump],
                len: bytes.len(),
                record: T::SIZE,
            });
        }
        let count = bytes.len() / T::SIZE;
        let order = self.order;
        let decode = |i: usize| T::decode(&RecordReader::new(&bytes[i * T::SIZE..(i + 1) * T::SIZE], order));

        // Use parallel parsing for large lumps
        if count >= PARALLEL_LUMP_THRESHOLD {
            Ok((0..count).into_par_iter().map(decode).collect())
        } else {
            Ok((0..count).map(decode).collect())
        }
    }
}

// ============================================================
// Writer
// ============================================================

/// Assembles a BSP file from lump payloads.
pub struct BspWriter {
    version: i32,
    lumps: Vec<Vec<u8>>,
}

impl Default for BspWriter {
    fn default() -> Self {
        Self {
            version: BSP_VERSION,
            lumps: vec![Vec::new(); HEADER_LUMPS],
        }
    }
}

impl BspWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn set_records<T: LumpRecord>(&mut self, lump: usize, records: &[T]) -> &mut Self {
        let mut out = Vec::with_capacity(records.len() * T::SIZE);
        for r in records {
            r.encode(&mut out);
        }
        self.lumps[lump] = out;
        self
    }

    pub fn set_raw(&mut self, lump: usize, bytes: Vec<u8>) -> &mut Self {
        self.lumps[lump] = bytes;
        self
    }

    /// Lump payloads are padded to 4 byte boundaries; the directory keeps
    /// the unpadded length.
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_long(&mut out, BSP_IDENT);
        put_long(&mut out, self.version);
        out.resize(HEADER_SIZE, 0);

        for (i, lump) in self.lumps.iter().enumerate() {
            let ofs = out.len() as i32;
            out.extend_from_slice(lump);
            while out.len() % 4 != 0 {
                out.push(0);
            }
            out[8 + i * 8..12 + i * 8].copy_from_slice(&ofs.to_le_bytes());
            out[12 + i * 8..16 + i * 8].copy_from_slice(&(lump.len() as i32).to_le_bytes());
        }
        out
    }
}
