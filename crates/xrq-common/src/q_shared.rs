// q_shared.rs — Shared math, plane and string utilities

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];
pub type Vec4 = [f32; 4];
/// Column-major 4x4 matrix.
pub type Matrix = [f32; 16];
/// Orientation axes: forward, left, up.
pub type Axis = [Vec3; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];
pub const AXIS_IDENTITY: Axis = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

pub const MAX_TOKEN_CHARS: usize = 1024;

// ============================================================
// Contents flags
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;
pub const CONTENTS_WATER: i32 = 32;

pub const CONTENTS_PLAYERCLIP: i32 = 0x10000;
pub const CONTENTS_BODY: i32 = 0x2000000;

pub const MASK_PLAYERSOLID: i32 = CONTENTS_SOLID | CONTENTS_PLAYERCLIP | CONTENTS_BODY;

// ============================================================
// Entity numbers reported by traces
// ============================================================

pub const MAX_GENTITIES: i32 = 1024;
pub const ENTITYNUM_NONE: i32 = MAX_GENTITIES - 1;
pub const ENTITYNUM_WORLD: i32 = MAX_GENTITIES - 2;

// ============================================================
// Plane
// ============================================================

pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_NON_AXIAL: u8 = 3;

/// Results of `box_on_plane_side`.
pub const SIDE_FRONT: i32 = 1;
pub const SIDE_BACK: i32 = 2;
pub const SIDE_CROSS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8,
    pub signbits: u8,
}

impl Default for CPlane {
    fn default() -> Self {
        Self {
            normal: [0.0; 3],
            dist: 0.0,
            plane_type: PLANE_X,
            signbits: 0,
        }
    }
}

impl CPlane {
    /// Builds a plane and derives its axial type and sign bits.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self {
            normal,
            dist,
            plane_type: plane_type_for_normal(&normal),
            signbits: signbits_for_normal(&normal),
        }
    }

    /// Signed distance from the plane to `p`.
    #[inline]
    pub fn distance_to(&self, p: &Vec3) -> f32 {
        dot_product(&self.normal, p) - self.dist
    }

    pub fn as_vec4(&self) -> Vec4 {
        [self.normal[0], self.normal[1], self.normal[2], self.dist]
    }
}

pub fn plane_type_for_normal(n: &Vec3) -> u8 {
    if n[0] == 1.0 {
        PLANE_X
    } else if n[1] == 1.0 {
        PLANE_Y
    } else if n[2] == 1.0 {
        PLANE_Z
    } else {
        PLANE_NON_AXIAL
    }
}

/// Bit `j` is set when normal component `j` is negative.
pub fn signbits_for_normal(n: &Vec3) -> u8 {
    let mut bits = 0u8;
    for (j, &c) in n.iter().enumerate() {
        if c < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

/// Plane through three points with Quake winding.
/// Returns `None` when the points are collinear or coincident.
pub fn plane_from_points(a: &Vec3, b: &Vec3, c: &Vec3) -> Option<CPlane> {
    let d1 = vector_subtract(b, a);
    let d2 = vector_subtract(c, a);
    let mut normal = cross_product(&d2, &d1);
    if vector_normalize(&mut normal) == 0.0 {
        return None;
    }
    let dist = dot_product(a, &normal);
    Some(CPlane::new(normal, dist))
}

/// Classifies a box against a plane: SIDE_FRONT, SIDE_BACK or SIDE_CROSS.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if p.plane_type < PLANE_NON_AXIAL {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return SIDE_FRONT;
        }
        if p.dist >= emaxs[t] {
            return SIDE_BACK;
        }
        return SIDE_CROSS;
    }

    // general case: pick the corner nearest and farthest along the normal
    let n = &p.normal;
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for j in 0..3 {
        if p.signbits & (1 << j) != 0 {
            far[j] = emins[j];
            near[j] = emaxs[j];
        } else {
            far[j] = emaxs[j];
            near[j] = emins[j];
        }
    }
    let dist1 = dot_product(n, &far);
    let dist2 = dot_product(n, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = SIDE_FRONT;
    }
    if dist2 < p.dist {
        sides |= SIDE_BACK;
    }
    sides
}

// ============================================================
// Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_clear(v: &mut Vec3) {
    *v = [0.0; 3];
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

#[inline]
pub fn vector_lerp(from: &Vec3, to: &Vec3, frac: f32) -> Vec3 {
    [
        from[0] + frac * (to[0] - from[0]),
        from[1] + frac * (to[1] - from[1]),
        from[2] + frac * (to[2] - from[2]),
    ]
}

pub fn vector_compare(v1: &Vec3, v2: &Vec3) -> bool {
    v1[0] == v2[0] && v1[1] == v2[1] && v1[2] == v2[2]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

pub fn vector_length_squared(v: &Vec3) -> f32 {
    dot_product(v, v)
}

pub fn distance(a: &Vec3, b: &Vec3) -> f32 {
    vector_length(&vector_subtract(a, b))
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

/// Returns a normalized copy and the original length. A zero vector stays zero.
pub fn vector_normalize2(v: &Vec3) -> (Vec3, f32) {
    let mut out = *v;
    let length = vector_normalize(&mut out);
    (out, length)
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

// ============================================================
// Bounds
// ============================================================

pub fn clear_bounds(mins: &mut Vec3, maxs: &mut Vec3) {
    *mins = [99999.0; 3];
    *maxs = [-99999.0; 3];
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

/// Touching boxes count as intersecting.
pub fn bounds_intersect(mins: &Vec3, maxs: &Vec3, mins2: &Vec3, maxs2: &Vec3) -> bool {
    !(maxs[0] < mins2[0]
        || maxs[1] < mins2[1]
        || maxs[2] < mins2[2]
        || mins[0] > maxs2[0]
        || mins[1] > maxs2[1]
        || mins[2] > maxs2[2])
}

// ============================================================
// Matrix operations (column-major)
// ============================================================

pub fn matrix_identity() -> Matrix {
    let mut m = [0.0f32; 16];
    m[0] = 1.0;
    m[5] = 1.0;
    m[10] = 1.0;
    m[15] = 1.0;
    m
}

/// Rigid transform whose columns are the axes followed by the origin.
pub fn matrix_setup_transform(axis: &Axis, origin: &Vec3) -> Matrix {
    let [forward, left, up] = axis;
    [
        forward[0], forward[1], forward[2], 0.0,
        left[0], left[1], left[2], 0.0,
        up[0], up[1], up[2], 0.0,
        origin[0], origin[1], origin[2], 1.0,
    ]
}

pub fn matrix_setup_scale(x: f32, y: f32, z: f32) -> Matrix {
    let mut m = matrix_identity();
    m[0] = x;
    m[5] = y;
    m[10] = z;
    m
}

pub fn matrix_multiply(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
        }
    }
    out
}

/// Inverse of a rotation + translation matrix.
pub fn matrix_affine_inverse(m: &Matrix) -> Matrix {
    let mut out = matrix_identity();
    // transpose the rotation part
    for i in 0..3 {
        for j in 0..3 {
            out[i * 4 + j] = m[j * 4 + i];
        }
    }
    for i in 0..3 {
        out[12 + i] = -(out[i] * m[12] + out[4 + i] * m[13] + out[8 + i] * m[14]);
    }
    out
}

pub fn matrix_transform_point(m: &Matrix, p: &Vec3) -> Vec3 {
    [
        m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12],
        m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13],
        m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14],
    ]
}

/// Perspective projection from horizontal/vertical field of view in degrees.
pub fn matrix_perspective_projection(fov_x: f32, fov_y: f32, near: f32, far: f32) -> Matrix {
    let x_max = near * (fov_x.to_radians() * 0.5).tan();
    let y_max = near * (fov_y.to_radians() * 0.5).tan();
    let (left, right, bottom, top) = (-x_max, x_max, -y_max, y_max);

    let mut m = [0.0f32; 16];
    m[0] = (2.0 * near) / (right - left);
    m[5] = (2.0 * near) / (top - bottom);
    m[8] = (right + left) / (right - left);
    m[9] = (top + bottom) / (top - bottom);
    m[10] = -(far + near) / (far - near);
    m[11] = -1.0;
    m[14] = -(2.0 * far * near) / (far - near);
    m
}

// ============================================================
// Path and string helpers
// ============================================================

pub fn com_skip_path(pathname: &str) -> &str {
    match pathname.rfind('/') {
        Some(pos) => &pathname[pos + 1..],
        None => pathname,
    }
}

pub fn com_strip_extension(input: &str) -> String {
    match input.rfind('.') {
        Some(pos) if !input[pos..].contains('/') => input[..pos].to_string(),
        _ => input.to_string(),
    }
}

/// Parse data as text and return the next token plus the remaining text.
/// Handles `//` and `/* */` comments and quoted strings. Returns an empty
/// token and `None` at end of data.
pub fn com_parse(data: &str) -> (String, Option<&str>) {
    let mut chars = data.as_bytes();

    // skip whitespace and comments
    loop {
        while !chars.is_empty() && chars[0] <= b' ' {
            chars = &chars[1..];
        }
        if chars.is_empty() {
            return (String::new(), None);
        }
        if chars.len() >= 2 && chars[0] == b'/' && chars[1] == b'/' {
            while !chars.is_empty() && chars[0] != b'\n' {
                chars = &chars[1..];
            }
            continue;
        }
        if chars.len() >= 2 && chars[0] == b'/' && chars[1] == b'*' {
            chars = &chars[2..];
            while !chars.is_empty() && !(chars.len() >= 2 && chars[0] == b'*' && chars[1] == b'/') {
                chars = &chars[1..];
            }
            if !chars.is_empty() {
                chars = &chars[2..];
            }
            continue;
        }
        break;
    }

    // tokens are sliced from data so multi-byte characters survive
    let (start, end) = if chars[0] == b'"' {
        chars = &chars[1..];
        let start = data.len() - chars.len();
        while !chars.is_empty() && chars[0] != b'"' {
            chars = &chars[1..];
        }
        let end = data.len() - chars.len();
        if !chars.is_empty() {
            chars = &chars[1..]; // skip closing quote
        }
        (start, end)
    } else {
        let start = data.len() - chars.len();
        while !chars.is_empty() && chars[0] > b' ' {
            chars = &chars[1..];
        }
        (start, data.len() - chars.len())
    };

    let mut end = end.min(start + MAX_TOKEN_CHARS);
    while !data.is_char_boundary(end) {
        end -= 1;
    }
    let token = data[start..end].to_string();

    let offset = data.len() - chars.len();
    (token, Some(&data[offset..]))
}

/// Parses whitespace separated floats into a fixed array.
/// Missing or malformed components leave the array untouched and return `None`.
pub fn parse_floats<const N: usize>(s: &str) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut parts = s.split_whitespace();
    for v in out.iter_mut() {
        *v = parts.next()?.parse().ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_type_and_signbits() {
        assert_eq!(plane_type_for_normal(&[1.0, 0.0, 0.0]), PLANE_X);
        assert_eq!(plane_type_for_normal(&[0.0, 0.0, 1.0]), PLANE_Z);
        assert_eq!(plane_type_for_normal(&[0.0, 0.0, -1.0]), PLANE_NON_AXIAL);
        assert_eq!(signbits_for_normal(&[-1.0, 0.5, -0.2]), 0b101);
    }

    #[test]
    fn test_plane_from_points_winding() {
        let p = plane_from_points(&[0.0, 0.0, 0.0], &[0.0, 10.0, 0.0], &[10.0, 10.0, 0.0])
            .expect("valid triangle");
        assert_eq!(p.normal, [0.0, 0.0, 1.0]);
        assert_eq!(p.dist, 0.0);
        assert_eq!(p.plane_type, PLANE_Z);
    }

    #[test]
    fn test_plane_from_points_degenerate() {
        let a = [0.0, 0.0, 0.0];
        assert!(plane_from_points(&a, &[1.0, 1.0, 1.0], &[2.0, 2.0, 2.0]).is_none());
        assert!(plane_from_points(&a, &a, &a).is_none());
    }

    #[test]
    fn test_box_on_plane_side_axial() {
        let p = CPlane::new([1.0, 0.0, 0.0], 10.0);
        assert_eq!(box_on_plane_side(&[11.0, 0.0, 0.0], &[20.0, 1.0, 1.0], &p), SIDE_FRONT);
        assert_eq!(box_on_plane_side(&[0.0, 0.0, 0.0], &[5.0, 1.0, 1.0], &p), SIDE_BACK);
        assert_eq!(box_on_plane_side(&[0.0, 0.0, 0.0], &[15.0, 1.0, 1.0], &p), SIDE_CROSS);
    }

    #[test]
    fn test_box_on_plane_side_general() {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let p = CPlane::new([s, -s, 0.0], 0.0);
        assert_eq!(p.plane_type, PLANE_NON_AXIAL);
        assert_eq!(box_on_plane_side(&[10.0, -20.0, 0.0], &[20.0, -11.0, 1.0], &p), SIDE_FRONT);
        assert_eq!(box_on_plane_side(&[-20.0, 10.0, 0.0], &[-11.0, 20.0, 1.0], &p), SIDE_BACK);
        assert_eq!(box_on_plane_side(&[-1.0, -1.0, -1.0], &[1.0, 1.0, 1.0], &p), SIDE_CROSS);
    }

    #[test]
    fn test_bounds_intersect() {
        let a = ([0.0, 0.0, 0.0], [10.0, 10.0, 10.0]);
        assert!(bounds_intersect(&a.0, &a.1, &[10.0, 5.0, 5.0], &[20.0, 6.0, 6.0]));
        assert!(!bounds_intersect(&a.0, &a.1, &[10.5, 5.0, 5.0], &[20.0, 6.0, 6.0]));
    }

    #[test]
    fn test_matrix_inverse_round_trip() {
        let axis = [[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let m = matrix_setup_transform(&axis, &[10.0, 20.0, 30.0]);
        let inv = matrix_affine_inverse(&m);
        let p = [3.0, -4.0, 5.0];
        let back = matrix_transform_point(&inv, &matrix_transform_point(&m, &p));
        for i in 0..3 {
            assert!((back[i] - p[i]).abs() < 1e-4);
        }
        let id = matrix_multiply(&m, &inv);
        for (i, v) in id.iter().enumerate() {
            let expected = if i % 5 == 0 { 1.0 } else { 0.0 };
            assert!((v - expected).abs() < 1e-5, "element {} = {}", i, v);
        }
    }

    #[test]
    fn test_com_parse_tokens() {
        let text = "{ \"classname\" \"light\" // comment\n /* block */ origin }";
        let mut rest = Some(text);
        let mut tokens = Vec::new();
        while let Some(data) = rest {
            let (tok, next) = com_parse(data);
            if next.is_none() {
                break;
            }
            tokens.push(tok);
            rest = next;
        }
        assert_eq!(tokens, vec!["{", "classname", "light", "origin", "}"]);
    }

    #[test]
    fn test_com_parse_keeps_utf8_tokens() {
        let (tok, rest) = com_parse("\"textures/über/ŝtone\" naïve");
        assert_eq!(tok, "textures/über/ŝtone");
        let (tok, rest) = com_parse(rest.unwrap());
        assert_eq!(tok, "naïve");
        assert_eq!(rest, Some(""));

        // truncation never splits a character
        let long = "é".repeat(MAX_TOKEN_CHARS);
        let (tok, _) = com_parse(&long);
        assert_eq!(tok.len(), MAX_TOKEN_CHARS);
        assert!(tok.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_parse_floats() {
        assert_eq!(parse_floats::<3>("1 2.5 -3"), Some([1.0, 2.5, -3.0]));
        assert_eq!(parse_floats::<3>("1 2"), None);
        assert_eq!(parse_floats::<2>("x 2"), None);
    }

    #[test]
    fn test_com_skip_path_and_extension() {
        assert_eq!(com_skip_path("maps/q3dm1.bsp"), "q3dm1.bsp");
        assert_eq!(com_strip_extension("q3dm1.bsp"), "q3dm1");
    }
}
