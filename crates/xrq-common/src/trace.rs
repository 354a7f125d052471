// trace.rs — Trace results, the collision query seam, and a convex brush tracer

use crate::q_shared::*;

/// Traces stop this far in front of the surface they hit.
pub const SURFACE_CLIP_EPSILON: f32 = 0.125;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    /// The whole move was inside solid.
    pub allsolid: bool,
    /// The move started inside solid.
    pub startsolid: bool,
    /// 1.0 means nothing was hit.
    pub fraction: f32,
    pub endpos: Vec3,
    /// Surface normal at impact.
    pub plane: CPlane,
    pub surface_flags: i32,
    pub contents: i32,
    pub entity_num: i32,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            endpos: [0.0; 3],
            plane: CPlane::default(),
            surface_flags: 0,
            contents: 0,
            entity_num: ENTITYNUM_NONE,
        }
    }
}

/// Collision queries consumed by movement. Implementations must return the
/// same result for identical inputs within a frame.
pub trait TraceSource {
    fn trace(&self, start: &Vec3, end: &Vec3, mins: &Vec3, maxs: &Vec3, content_mask: i32) -> Trace;

    fn point_contents(&self, _point: &Vec3) -> i32 {
        0
    }
}

impl<T: TraceSource + ?Sized> TraceSource for &T {
    fn trace(&self, start: &Vec3, end: &Vec3, mins: &Vec3, maxs: &Vec3, content_mask: i32) -> Trace {
        (**self).trace(start, end, mins, maxs, content_mask)
    }

    fn point_contents(&self, point: &Vec3) -> i32 {
        (**self).point_contents(point)
    }
}

// ============================================================
// Convex brushes
// ============================================================

/// A convex volume bounded by outward facing planes.
#[derive(Debug, Clone)]
pub struct ConvexBrush {
    pub planes: Vec<CPlane>,
    pub contents: i32,
    pub surface_flags: i32,
    pub entity_num: i32,
}

impl ConvexBrush {
    pub fn from_planes(planes: Vec<CPlane>, contents: i32) -> Self {
        Self {
            planes,
            contents,
            surface_flags: 0,
            entity_num: ENTITYNUM_WORLD,
        }
    }

    /// Axial box brush.
    pub fn from_bounds(mins: Vec3, maxs: Vec3, contents: i32) -> Self {
        let mut planes = Vec::with_capacity(6);
        for i in 0..3 {
            let mut normal = [0.0f32; 3];
            normal[i] = 1.0;
            planes.push(CPlane::new(normal, maxs[i]));
            normal[i] = -1.0;
            planes.push(CPlane::new(normal, -mins[i]));
        }
        Self::from_planes(planes, contents)
    }

    pub fn contains_point(&self, p: &Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to(p) <= 0.0)
    }

    /// Sweeps the box `mins`/`maxs` from `p1` to `p2` against this brush,
    /// tightening `trace` when the brush is hit earlier than anything so far.
    fn clip_box(&self, mins: &Vec3, maxs: &Vec3, p1: &Vec3, p2: &Vec3, trace: &mut Trace) {
        if self.planes.is_empty() {
            return;
        }

        let mut enterfrac: f32 = -1.0;
        let mut leavefrac: f32 = 1.0;
        let mut clipplane: Option<&CPlane> = None;

        let mut getout = false;
        let mut startout = false;

        for plane in &self.planes {
            // push the plane out by the box corner nearest to it
            let mut ofs = [0.0f32; 3];
            for j in 0..3 {
                ofs[j] = if plane.normal[j] < 0.0 { maxs[j] } else { mins[j] };
            }
            let dist = plane.dist - dot_product(&ofs, &plane.normal);

            let d1 = dot_product(p1, &plane.normal) - dist;
            let d2 = dot_product(p2, &plane.normal) - dist;

            if d2 > 0.0 {
                getout = true;
            }
            if d1 > 0.0 {
                startout = true;
            }

            // completely in front of this face, no intersection
            if d1 > 0.0 && d2 >= d1 {
                return;
            }
            if d1 <= 0.0 && d2 <= 0.0 {
                continue;
            }

            if d1 > d2 {
                // entering
                let f = (d1 - SURFACE_CLIP_EPSILON) / (d1 - d2);
                if f > enterfrac {
                    enterfrac = f;
                    clipplane = Some(plane);
                }
            } else {
                // leaving
                let f = (d1 + SURFACE_CLIP_EPSILON) / (d1 - d2);
                if f < leavefrac {
                    leavefrac = f;
                }
            }
        }

        if !startout {
            trace.startsolid = true;
            if !getout {
                trace.allsolid = true;
                trace.fraction = 0.0;
                trace.contents = self.contents;
                trace.entity_num = self.entity_num;
            }
            return;
        }

        if enterfrac < leavefrac && enterfrac > -1.0 && enterfrac < trace.fraction {
            trace.fraction = enterfrac.max(0.0);
            if let Some(plane) = clipplane {
                trace.plane = *plane;
            }
            trace.surface_flags = self.surface_flags;
            trace.contents = self.contents;
            trace.entity_num = self.entity_num;
        }
    }
}

/// A static set of convex brushes that answers swept box traces.
#[derive(Debug, Clone, Default)]
pub struct BrushWorld {
    brushes: Vec<ConvexBrush>,
}

impl BrushWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_brush(&mut self, brush: ConvexBrush) -> &mut Self {
        self.brushes.push(brush);
        self
    }

    pub fn brushes(&self) -> &[ConvexBrush] {
        &self.brushes
    }
}

impl TraceSource for BrushWorld {
    fn trace(&self, start: &Vec3, end: &Vec3, mins: &Vec3, maxs: &Vec3, content_mask: i32) -> Trace {
        let mut trace = Trace::default();

        for brush in &self.brushes {
            if brush.contents & content_mask == 0 {
                continue;
            }
            brush.clip_box(mins, maxs, start, end, &mut trace);
            if trace.allsolid {
                break;
            }
        }

        trace.endpos = if trace.fraction == 1.0 {
            *end
        } else {
            vector_lerp(start, end, trace.fraction)
        };
        trace
    }

    fn point_contents(&self, point: &Vec3) -> i32 {
        self.brushes
            .iter()
            .filter(|b| b.contains_point(point))
            .fold(0, |acc, b| acc | b.contents)
    }
}
