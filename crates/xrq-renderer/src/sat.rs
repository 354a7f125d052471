// sat.rs — Triangle vs oriented box overlap by separating axes
//
// Thirteen candidate axes: the triangle normal, the three box faces and the
// nine cross products of box axes with triangle edges. The first axis with
// a gap proves the shapes disjoint. While testing, the axis of least
// penetration is tracked; edge axes have their depth scaled by 1.5 so that
// face axes win ties.

use xrq_common::q_shared::{cross_product, dot_product, vector_length, vector_scale, vector_subtract, Axis, Vec3};

use crate::model_types::TrRefLight;

const EDGE_BIAS: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: Vec3,
    pub axis: Axis,
    pub half_size: Vec3,
}

impl OrientedBox {
    /// The light's volume as a box around its authored origin.
    pub fn from_light(light: &TrRefLight) -> Self {
        Self {
            center: light.l.origin,
            axis: light.l.axis,
            half_size: light.l.radius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatResult {
    pub intersects: bool,
    /// 1 for the triangle normal, 2-4 for box faces, 5-13 for edge axes.
    /// On a miss this is the separating axis, on a hit the axis of least
    /// penetration.
    pub axis: u32,
    pub depth: f32,
    /// Unit push-out direction along the best axis.
    pub normal: Vec3,
}

struct Tester {
    best_axis: u32,
    best_depth: f32,
    best_normal: Vec3,
}

impl Tester {
    fn new() -> Self {
        Self {
            best_axis: 0,
            best_depth: f32::MAX,
            best_normal: [0.0; 3],
        }
    }

    fn record(&mut self, axis: u32, depth: f32, normal: &Vec3, scale: f32) {
        let len = vector_length(normal);
        if len <= 0.0 {
            return;
        }
        let depth = depth / len * scale;
        if depth < self.best_depth {
            self.best_axis = axis;
            self.best_depth = depth;
            self.best_normal = vector_scale(normal, 1.0 / len);
        }
    }

    /// One-sided test along the triangle normal.
    fn normal_axis(&mut self, p0: f32, r: f32, n: &Vec3, axis: u32) -> bool {
        let depth = r + p0;
        if depth < 0.0 {
            return false;
        }
        self.record(axis, depth, &vector_scale(n, -1.0), 1.0);
        true
    }

    /// Overlap of the triangle interval [min(p), max(p)] with [-r, r].
    fn interval_axis(&mut self, p0: f32, p1: f32, r: f32, n: &Vec3, axis: u32, scale: f32) -> bool {
        let (min, max) = if p0 < p1 { (p0, p1) } else { (p1, p0) };

        let depth_min = r - min;
        let depth_max = max + r;
        if depth_min < 0.0 || depth_max < 0.0 {
            return false;
        }

        let (depth, dir) = if depth_min > depth_max {
            (depth_max, vector_scale(n, -1.0))
        } else {
            (depth_min, *n)
        };
        self.record(axis, depth, &dir, scale);
        true
    }
}

fn three_way(a: f32, b: f32, c: f32) -> (f32, f32) {
    (a.min(b).min(c), a.max(b).max(c))
}

/// Full separating axis test between a triangle and a box.
pub fn triangle_box_test(b: &OrientedBox, v0: &Vec3, v1: &Vec3, v2: &Vec3) -> SatResult {
    let e0 = vector_subtract(v1, v0);
    let e1 = vector_subtract(v2, v0);
    let e2 = vector_subtract(&e1, &e0);
    let n = cross_product(&e0, &e1);
    let d = vector_subtract(v0, &b.center);
    let a = &b.axis;
    let fa = &b.half_size;

    let mut t = Tester::new();
    let miss = |t: &Tester, axis: u32| SatResult {
        intersects: false,
        axis,
        depth: 0.0,
        normal: t.best_normal,
    };

    // triangle normal
    let p0 = dot_product(&n, &d);
    let r = fa[0] * dot_product(&n, &a[0]).abs()
        + fa[1] * dot_product(&n, &a[1]).abs()
        + fa[2] * dot_product(&n, &a[2]).abs();
    if !t.normal_axis(p0, r, &n, 1) {
        return miss(&t, 1);
    }

    // box faces
    for i in 0..3 {
        let p0 = dot_product(&a[i], &d);
        let p1 = p0 + dot_product(&a[i], &e0);
        let p2 = p0 + dot_product(&a[i], &e1);
        let (min, max) = three_way(p0, p1, p2);
        if !t.interval_axis(min, max, fa[i], &a[i], 2 + i as u32, 1.0) {
            return miss(&t, 2 + i as u32);
        }
    }

    // box axis x triangle edge
    let an: [f32; 3] = [dot_product(&a[0], &n), dot_product(&a[1], &n), dot_product(&a[2], &n)];
    for i in 0..3 {
        let (j, k) = ((i + 1) % 3, (i + 2) % 3);
        for (m, edge) in [e0, e1, e2].iter().enumerate() {
            let axis = 5 + (i * 3 + m) as u32;
            let l = cross_product(&a[i], edge);
            let p0 = dot_product(&l, &d);
            let r = fa[j] * dot_product(&a[k], edge).abs() + fa[k] * dot_product(&a[j], edge).abs();
            let p1 = match m {
                0 => p0 + an[i],
                _ => p0 - an[i],
            };
            if !t.interval_axis(p0, p1, r, &l, axis, EDGE_BIAS) {
                return miss(&t, axis);
            }
        }
    }

    SatResult {
        intersects: true,
        axis: t.best_axis,
        depth: t.best_depth,
        normal: t.best_normal,
    }
}

/// True when the triangle touches the light's box.
pub fn triangle_in_light(light: &TrRefLight, v0: &Vec3, v1: &Vec3, v2: &Vec3) -> bool {
    triangle_box_test(&OrientedBox::from_light(light), v0, v1, v2).intersects
}
