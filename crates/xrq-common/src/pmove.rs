// pmove.rs — Player slide move: clip-plane solver, stair stepping, ground trace
//
// input: origin, velocity, bounds, ground plane, trace source
// output: origin, velocity, touched entities, step events

use tracing::debug;

use crate::config::PmoveConfig;
use crate::q_shared::*;
use crate::trace::{Trace, TraceSource};

// ============================================================
// Constants
// ============================================================

pub const MAX_CLIP_PLANES: usize = 5;
pub const MAXTOUCH: usize = 32;
/// Steepest surface that still counts as walkable ground.
pub const MIN_WALK_NORMAL: f32 = 0.7;

const NUMBUMPS: usize = 4;
/// A hit plane this close to one already tracked is treated as the same plane.
const SAME_PLANE_COSINE: f32 = 0.99;
/// Velocity entering a plane by less than this doesn't interact with it.
const INTO_PLANE_EPSILON: f32 = 0.1;
/// Crease directions shorter than this come from nearly parallel planes.
const CREASE_EPSILON: f32 = 1.0e-6;
const GROUND_TRACE_DEPTH: f32 = 0.25;

/// Events raised by movement for the game to play sounds and smooth views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmEvent {
    Step4,
    Step8,
    Step12,
    Step16,
}

// ============================================================
// State
// ============================================================

/// Player state that persists between frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerState {
    pub origin: Vec3,
    pub velocity: Vec3,
    /// Downward acceleration for this player.
    pub gravity: f32,
    /// Milliseconds left on a movement timer (knockback, landing).
    /// While it runs, collision response doesn't alter velocity.
    pub pm_time: i32,
}

/// Per-call movement inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmoveParams {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub tracemask: i32,
    /// Seconds simulated by this call.
    pub frametime: f32,
}

impl Default for PmoveParams {
    fn default() -> Self {
        Self {
            mins: [-15.0, -15.0, -24.0],
            maxs: [15.0, 15.0, 32.0],
            tracemask: MASK_PLAYERSOLID,
            frametime: 0.0,
        }
    }
}

/// Result of the last ground trace.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroundState {
    /// Something is directly below the player.
    pub ground_plane: bool,
    /// The ground is flat enough to walk on.
    pub walking: bool,
    pub ground_trace: Trace,
}

/// Clip `inv` so it no longer drives into `normal`. The component going
/// into the plane is removed and pushed `overbounce` past it; a velocity
/// already leaving the plane is returned unchanged.
pub fn clip_velocity(inv: &Vec3, normal: &Vec3, overbounce: f32) -> Vec3 {
    let backoff = dot_product(inv, normal);
    if backoff >= 0.0 {
        return *inv;
    }
    vector_ma(inv, -backoff * overbounce, normal)
}

/// Holds everything one movement call needs.
pub struct PmoveContext<'a, T: TraceSource + ?Sized> {
    pub ps: &'a mut PlayerState,
    pub params: PmoveParams,
    pub ground: GroundState,
    pub touch_ents: Vec<i32>,
    pub events: Vec<PmEvent>,
    /// Hardest hit taken this call, in units/s into the plane.
    pub impact_speed: f32,
    tracer: &'a T,
    config: &'a PmoveConfig,
}

impl<'a, T: TraceSource + ?Sized> PmoveContext<'a, T> {
    pub fn new(ps: &'a mut PlayerState, tracer: &'a T, config: &'a PmoveConfig, params: PmoveParams) -> Self {
        Self {
            ps,
            params,
            ground: GroundState::default(),
            touch_ents: Vec::new(),
            events: Vec::new(),
            impact_speed: 0.0,
            tracer,
            config,
        }
    }

    fn trace(&self, start: &Vec3, end: &Vec3) -> Trace {
        self.tracer
            .trace(start, end, &self.params.mins, &self.params.maxs, self.params.tracemask)
    }

    fn add_touch_ent(&mut self, entity_num: i32) {
        if entity_num == ENTITYNUM_NONE || self.touch_ents.len() >= MAXTOUCH {
            return;
        }
        if !self.touch_ents.contains(&entity_num) {
            self.touch_ents.push(entity_num);
        }
    }

    /// Treat `trace` as the ground the player stands on.
    pub fn set_ground(&mut self, trace: Trace) {
        self.ground = GroundState {
            ground_plane: true,
            walking: trace.plane.normal[2] >= MIN_WALK_NORMAL,
            ground_trace: trace,
        };
    }

    pub fn clear_ground(&mut self) {
        self.ground = GroundState::default();
    }

    // --------------------------------------------------------
    // Ground trace
    // --------------------------------------------------------

    /// Traces just below the player to find what it stands on.
    pub fn ground_trace(&mut self) {
        let origin = self.ps.origin;
        let point = [origin[0], origin[1], origin[2] - GROUND_TRACE_DEPTH];
        let trace = self.trace(&origin, &point);

        if trace.allsolid || trace.fraction == 1.0 {
            // stuck, or in free fall
            self.clear_ground();
            return;
        }

        // check if getting thrown off the ground
        if self.ps.velocity[2] > 0.0 && dot_product(&self.ps.velocity, &trace.plane.normal) > 10.0 {
            if self.config.debug_level > 0 {
                debug!("kickoff");
            }
            self.clear_ground();
            return;
        }

        if trace.plane.normal[2] < MIN_WALK_NORMAL {
            if self.config.debug_level > 0 {
                debug!("steep");
            }
        }

        self.add_touch_ent(trace.entity_num);
        self.set_ground(trace);
    }

    // --------------------------------------------------------
    // Slide move
    // --------------------------------------------------------

    /// Moves the player along its velocity for one frame, sliding along
    /// everything it touches. Returns true if the velocity was clipped in
    /// some way.
    pub fn slide_move(&mut self, gravity: bool) -> bool {
        let overclip = self.config.overclip;
        let mut primal_velocity = self.ps.velocity;
        let mut end_velocity = self.ps.velocity;

        if gravity {
            end_velocity[2] -= self.ps.gravity * self.params.frametime;
            self.ps.velocity[2] = (self.ps.velocity[2] + end_velocity[2]) * 0.5;
            primal_velocity[2] = end_velocity[2];
            if self.ground.ground_plane {
                // slide along the ground plane
                let normal = self.ground.ground_trace.plane.normal;
                self.ps.velocity = clip_velocity(&self.ps.velocity, &normal, overclip);
                end_velocity = clip_velocity(&end_velocity, &normal, overclip);
            }
        }

        let mut time_left = self.params.frametime;
        let mut planes: Vec<Vec3> = Vec::with_capacity(MAX_CLIP_PLANES);

        // never turn against the ground plane
        if self.ground.ground_plane {
            planes.push(self.ground.ground_trace.plane.normal);
        }

        // never turn against original velocity
        planes.push(vector_normalize2(&self.ps.velocity).0);

        let mut bumpcount = 0;
        while bumpcount < NUMBUMPS {
            // calculate position we are trying to move to
            let end = vector_ma(&self.ps.origin, time_left, &self.ps.velocity);

            // see if we can make it there
            let trace = self.trace(&self.ps.origin, &end);
            if self.config.debug_level > 1 {
                debug!(
                    allsolid = trace.allsolid,
                    startsolid = trace.startsolid,
                    endpos = ?trace.endpos,
                    "slide bump {}",
                    bumpcount
                );
            }

            if trace.allsolid {
                // entity is completely trapped in another solid; don't build
                // up falling damage, but allow sideways acceleration
                self.ps.velocity[2] = 0.0;
                return true;
            }

            if trace.fraction > 0.0 {
                // actually covered some distance
                self.ps.origin = trace.endpos;
            }

            if trace.fraction == 1.0 {
                break; // moved the entire distance
            }

            // save entity for contact
            self.add_touch_ent(trace.entity_num);

            time_left -= time_left * trace.fraction;

            if planes.len() >= MAX_CLIP_PLANES {
                if self.config.debug_level > 0 {
                    debug!("too many clip planes");
                }
                vector_clear(&mut self.ps.velocity);
                return true;
            }

            bumpcount += 1;

            // if this is the same plane we hit before, nudge velocity out
            // along it, which fixes some epsilon issues with non-axial planes
            let hit = trace.plane.normal;
            if planes.iter().any(|p| dot_product(&hit, p) > SAME_PLANE_COSINE) {
                self.ps.velocity = vector_add(&hit, &self.ps.velocity);
                continue;
            }
            planes.push(hit);

            // modify velocity so it parallels all of the clip planes
            match self.clip_to_planes(&planes, &end_velocity, overclip) {
                PlaneClip::Clipped { velocity, end } => {
                    self.ps.velocity = velocity;
                    end_velocity = end;
                }
                PlaneClip::Untouched => {}
                PlaneClip::Wedged => {
                    vector_clear(&mut self.ps.velocity);
                    return true;
                }
            }
        }

        if gravity {
            self.ps.velocity = end_velocity;
        }

        // don't change velocity if in a timer
        if self.ps.pm_time != 0 {
            self.ps.velocity = primal_velocity;
        }

        bumpcount != 0
    }

    /// Finds the first plane the velocity drives into and slides along it,
    /// falling back to the crease between two planes. Wedged means a third
    /// plane blocks the crease as well.
    fn clip_to_planes(&mut self, planes: &[Vec3], end_velocity: &Vec3, overclip: f32) -> PlaneClip {
        let velocity = self.ps.velocity;

        for (i, plane_i) in planes.iter().enumerate() {
            let into = dot_product(&velocity, plane_i);
            if into >= INTO_PLANE_EPSILON {
                continue; // move doesn't interact with the plane
            }

            // see how hard we are hitting things
            if -into > self.impact_speed {
                self.impact_speed = -into;
            }

            // slide along the plane
            let mut clip = clip_velocity(&velocity, plane_i, overclip);
            let mut end_clip = clip_velocity(end_velocity, plane_i, overclip);

            // see if there is a second plane that the new move enters
            for (j, plane_j) in planes.iter().enumerate() {
                if j == i || dot_product(&clip, plane_j) >= INTO_PLANE_EPSILON {
                    continue;
                }

                // try clipping the move to the plane
                clip = clip_velocity(&clip, plane_j, overclip);
                end_clip = clip_velocity(&end_clip, plane_j, overclip);

                // see if it goes back into the first clip plane
                if dot_product(&clip, plane_i) >= 0.0 {
                    continue;
                }

                // slide the original velocity along the crease; parallel
                // planes leave no crease to slide along
                let mut dir = cross_product(plane_i, plane_j);
                if vector_normalize(&mut dir) < CREASE_EPSILON {
                    if self.config.debug_level > 0 {
                        debug!("degenerate crease");
                    }
                    clip = VEC3_ORIGIN;
                    end_clip = VEC3_ORIGIN;
                } else {
                    clip = vector_scale(&dir, dot_product(&dir, &velocity));
                    end_clip = vector_scale(&dir, dot_product(&dir, end_velocity));
                }

                // see if there is a third plane the new move enters
                let blocked = planes
                    .iter()
                    .enumerate()
                    .any(|(k, plane_k)| k != i && k != j && dot_product(&clip, plane_k) < INTO_PLANE_EPSILON);
                if blocked {
                    // stop dead at a triple plane interaction
                    if self.config.debug_level > 0 {
                        debug!("triple plane interaction");
                    }
                    return PlaneClip::Wedged;
                }
            }

            // if we have fixed all interactions, try another move
            return PlaneClip::Clipped { velocity: clip, end: end_clip };
        }

        PlaneClip::Untouched
    }

    // --------------------------------------------------------
    // Stair stepping
    // --------------------------------------------------------

    fn step_event(&mut self, from: &Vec3, to: &Vec3, normal: &Vec3) {
        let delta = vector_subtract(from, to);
        let size = dot_product(normal, &delta).abs();

        if size > 2.0 {
            let event = if size < 7.0 {
                PmEvent::Step4
            } else if size < 11.0 {
                PmEvent::Step8
            } else if size < 15.0 {
                PmEvent::Step12
            } else {
                PmEvent::Step16
            };
            self.events.push(event);
        }

        if self.config.debug_level > 0 {
            debug!(size, "stepped");
        }
    }

    /// Slide move that also climbs steps up to the configured step size and
    /// follows the floor down ledges. Returns true if the player stepped.
    pub fn step_slide_move(&mut self, gravity: bool, predictive: bool) -> bool {
        let normal: Vec3 = [0.0, 0.0, 1.0];
        let step_height = self.config.step_size;
        let mut stepped = false;

        let start_o = self.ps.origin;
        let start_v = self.ps.velocity;

        if !self.slide_move(gravity) {
            let down = vector_ma(&start_o, -step_height, &normal);
            let trace = self.trace(&start_o, &down);

            // we can step down
            if trace.fraction > 0.01 && trace.fraction < 1.0 && !trace.allsolid && self.ground.ground_plane {
                if self.config.debug_level > 0 {
                    debug!("step down");
                }
                stepped = true;
            }
        } else {
            let down = vector_ma(&start_o, -step_height, &normal);
            let trace = self.trace(&start_o, &down);

            // never step up when you still have up velocity
            if dot_product(&trace.plane.normal, &self.ps.velocity) > 0.0
                && (trace.fraction == 1.0 || dot_product(&trace.plane.normal, &normal) < MIN_WALK_NORMAL)
            {
                return stepped;
            }

            // test the player position if they were a stepheight higher
            let up = vector_ma(&start_o, step_height, &normal);
            let trace = self.trace(&start_o, &up);
            if trace.allsolid {
                if self.config.debug_level > 0 {
                    debug!("bend can't step");
                }
                return stepped; // can't step up
            }

            let step_size = dot_product(&normal, &vector_subtract(&trace.endpos, &start_o));

            // try slidemove from this position
            self.ps.origin = trace.endpos;
            self.ps.velocity = start_v;

            if !self.slide_move(gravity) {
                if self.config.debug_level > 0 {
                    debug!("step up");
                }
                stepped = true;
            }

            // push down the final amount
            let down = vector_ma(&self.ps.origin, -step_size, &normal);
            let trace = self.trace(&self.ps.origin, &down);
            if !trace.allsolid {
                self.ps.origin = trace.endpos;
            }
            if trace.fraction < 1.0 {
                self.ps.velocity = clip_velocity(&self.ps.velocity, &trace.plane.normal, self.config.overclip);
            }
        }

        if !predictive && stepped {
            let origin = self.ps.origin;
            self.step_event(&start_o, &origin, &normal);
        }

        stepped
    }

    /// Reports whether a step would happen this frame without moving the
    /// player.
    pub fn predict_step_move(&mut self) -> bool {
        let velocity = self.ps.velocity;
        let origin = self.ps.origin;
        let impact_speed = self.impact_speed;

        let stepped = self.step_slide_move(false, true);

        self.ps.velocity = velocity;
        self.ps.origin = origin;
        self.impact_speed = impact_speed;

        stepped
    }
}

enum PlaneClip {
    Clipped { velocity: Vec3, end: Vec3 },
    Untouched,
    Wedged,
}

// ============================================================
// Unit tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{BrushWorld, ConvexBrush};
    use approx::assert_abs_diff_eq;
    use std::cell::{Cell, RefCell};

    /// Replays a fixed list of impacts, then reports open air.
    struct ScriptedTracer {
        hits: RefCell<Vec<(f32, Vec3)>>,
        traces: Cell<usize>,
    }

    impl ScriptedTracer {
        fn new(mut hits: Vec<(f32, Vec3)>) -> Self {
            hits.reverse();
            Self {
                hits: RefCell::new(hits),
                traces: Cell::new(0),
            }
        }
    }

    impl TraceSource for ScriptedTracer {
        fn trace(&self, start: &Vec3, end: &Vec3, _mins: &Vec3, _maxs: &Vec3, _mask: i32) -> Trace {
            self.traces.set(self.traces.get() + 1);
            match self.hits.borrow_mut().pop() {
                Some((fraction, normal)) => Trace {
                    fraction,
                    endpos: vector_lerp(start, end, fraction),
                    plane: CPlane::new(normal, 0.0),
                    entity_num: ENTITYNUM_WORLD,
                    ..Trace::default()
                },
                None => Trace { endpos: *end, ..Trace::default() },
            }
        }
    }

    fn floor_world(extent: f32) -> BrushWorld {
        let mut world = BrushWorld::new();
        world.add_brush(ConvexBrush::from_bounds(
            [-extent, -extent, -64.0],
            [extent, extent, 0.0],
            CONTENTS_SOLID,
        ));
        world
    }

    fn floor_trace() -> Trace {
        Trace {
            fraction: 0.0,
            plane: CPlane::new([0.0, 0.0, 1.0], 0.0),
            entity_num: ENTITYNUM_WORLD,
            ..Trace::default()
        }
    }

    fn params(frametime: f32) -> PmoveParams {
        PmoveParams { frametime, ..PmoveParams::default() }
    }

    #[test]
    fn test_clip_velocity_into_floor() {
        let out = clip_velocity(&[10.0, 0.0, -10.0], &[0.0, 0.0, 1.0], 1.001);
        assert_abs_diff_eq!(out[0], 10.0);
        assert_abs_diff_eq!(out[2], 0.01, epsilon = 1e-5);
    }

    #[test]
    fn test_clip_velocity_leaving_plane_is_unchanged() {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        for v in [[10.0, 0.0, 5.0], [0.0, 3.0, 0.0], [-1.0, 2.0, 0.0]] {
            let normal = [0.0, s, s];
            assert!(dot_product(&v, &normal) >= 0.0);
            assert_eq!(clip_velocity(&v, &normal, 1.001), v);
        }
    }

    #[test]
    fn test_flat_floor_walk() {
        let world = floor_world(1000.0);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [0.0, 0.0, 100.0],
            velocity: [100.0, 0.0, 0.0],
            gravity: 800.0,
            pm_time: 0,
        };
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));
        pm.set_ground(floor_trace());

        let clipped = pm.slide_move(true);

        assert!(!clipped);
        assert_abs_diff_eq!(pm.ps.origin[0], 10.0, epsilon = 1e-4);
        assert_abs_diff_eq!(pm.ps.velocity[0], 100.0, epsilon = 1e-4);
        assert!(pm.ps.velocity[2].abs() < 0.5, "vz = {}", pm.ps.velocity[2]);
        assert!(pm.touch_ents.is_empty());
    }

    #[test]
    fn test_corner_wedge_stops_dead() {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let tracer = ScriptedTracer::new(vec![
            (0.0, [1.0, 0.0, 0.0]),
            (0.0, [0.0, 1.0, 0.0]),
            (0.0, [s, s, 0.0]),
        ]);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            velocity: [-100.0, -100.0, 0.0],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &tracer, &config, params(0.1));

        assert!(pm.slide_move(false));
        assert_eq!(pm.ps.velocity, [0.0, 0.0, 0.0]);
        assert_eq!(pm.touch_ents, vec![ENTITYNUM_WORLD]);
    }

    #[test]
    fn test_v_corridor_slides_along_crease() {
        // two walls meeting in a vertical edge ahead of the player
        let left = [-0.6, 0.8, 0.0];
        let right = [-0.6, -0.8, 0.0];
        let tracer = ScriptedTracer::new(vec![(0.5, left), (0.5, right)]);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            velocity: [100.0, 10.0, 20.0],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &tracer, &config, params(0.1));

        assert!(pm.slide_move(false));

        // only the part along the edge survives
        let crease = cross_product(&left, &right);
        assert_abs_diff_eq!(crease[0], 0.0);
        assert_abs_diff_eq!(crease[1], 0.0);
        assert_abs_diff_eq!(pm.ps.velocity[0], 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pm.ps.velocity[1], 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pm.ps.velocity[2], 20.0, epsilon = 1e-3);
        assert_eq!(tracer.traces.get(), 3);
    }

    #[test]
    fn test_head_on_wall_zeroes_velocity_and_keeps_bumping() {
        // the wall and the original direction are parallel, so the crease
        // between them has no direction
        let tracer = ScriptedTracer::new(vec![(0.5, [-1.0, 0.0, 0.0])]);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            velocity: [100.0, 0.0, 0.0],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &tracer, &config, params(0.1));

        assert!(pm.slide_move(false));
        assert_eq!(pm.ps.velocity, [0.0, 0.0, 0.0]);
        assert_abs_diff_eq!(pm.ps.origin[0], 5.0, epsilon = 1e-4);
        // the second bump still traces, with nothing left to move
        assert_eq!(tracer.traces.get(), 2);
        assert!(pm.impact_speed > 99.0);
    }

    #[test]
    fn test_head_on_wall_with_third_plane_is_wedged() {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        // a glancing plane the velocity leaves, then the wall head on
        let tracer = ScriptedTracer::new(vec![(0.5, [s, s, 0.0]), (0.5, [-1.0, 0.0, 0.0]), (0.5, [0.0, -1.0, 0.0])]);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            velocity: [100.0, 0.0, 0.0],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &tracer, &config, params(0.1));

        assert!(pm.slide_move(false));
        assert_eq!(pm.ps.velocity, [0.0, 0.0, 0.0]);
        // stopped dead without tracing again
        assert_eq!(tracer.traces.get(), 2);
    }

    #[test]
    fn test_clip_plane_budget_exceeded() {
        // planes the velocity never drives into still use up the budget
        let tracer = ScriptedTracer::new(vec![
            (0.5, [0.5, 0.866, 0.0]),
            (0.5, [0.5, -0.866, 0.0]),
            (0.5, [0.5, 0.0, 0.866]),
            (0.5, [0.5, 0.0, -0.866]),
        ]);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            velocity: [100.0, 0.0, 0.0],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &tracer, &config, params(0.1));
        pm.set_ground(floor_trace());

        assert!(pm.slide_move(false));
        assert_eq!(pm.ps.velocity, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_allsolid_keeps_horizontal_velocity() {
        let world = floor_world(1024.0);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [0.0, 0.0, -30.0],
            velocity: [50.0, 20.0, -300.0],
            gravity: 800.0,
            pm_time: 0,
        };
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));

        assert!(pm.slide_move(false));
        assert_eq!(pm.ps.velocity, [50.0, 20.0, 0.0]);
        assert_eq!(pm.ps.origin, [0.0, 0.0, -30.0]);
    }

    #[test]
    fn test_wall_slide() {
        let mut world = floor_world(1024.0);
        world.add_brush(ConvexBrush::from_bounds(
            [64.0, -1024.0, 0.0],
            [128.0, 1024.0, 256.0],
            CONTENTS_SOLID,
        ));
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [30.0, 0.0, 100.0],
            velocity: [400.0, 200.0, 0.0],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));

        assert!(pm.slide_move(false));
        // stopped against the wall face at x = 64 - 15
        assert!(pm.ps.origin[0] < 49.0 && pm.ps.origin[0] > 48.5);
        assert!(pm.ps.origin[1] > 0.0);
        assert!(pm.ps.velocity[0] <= 0.0);
        assert_abs_diff_eq!(pm.ps.velocity[1], 200.0, epsilon = 1e-3);
    }

    #[test]
    fn test_timer_restores_velocity() {
        let mut world = floor_world(1024.0);
        world.add_brush(ConvexBrush::from_bounds(
            [64.0, -1024.0, 0.0],
            [128.0, 1024.0, 256.0],
            CONTENTS_SOLID,
        ));
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [30.0, 0.0, 100.0],
            velocity: [400.0, 0.0, 0.0],
            pm_time: 250,
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));

        assert!(pm.slide_move(false));
        assert_eq!(pm.ps.velocity, [400.0, 0.0, 0.0]);
        assert!(pm.ps.origin[0] < 49.0);
    }

    #[test]
    fn test_slide_move_stays_finite() {
        // closed box room
        let mut world = BrushWorld::new();
        world
            .add_brush(ConvexBrush::from_bounds([-512.0, -512.0, -64.0], [512.0, 512.0, 0.0], CONTENTS_SOLID))
            .add_brush(ConvexBrush::from_bounds([-512.0, -512.0, 256.0], [512.0, 512.0, 320.0], CONTENTS_SOLID))
            .add_brush(ConvexBrush::from_bounds([-576.0, -512.0, 0.0], [-512.0, 512.0, 256.0], CONTENTS_SOLID))
            .add_brush(ConvexBrush::from_bounds([512.0, -512.0, 0.0], [576.0, 512.0, 256.0], CONTENTS_SOLID))
            .add_brush(ConvexBrush::from_bounds([-512.0, -576.0, 0.0], [512.0, -512.0, 256.0], CONTENTS_SOLID))
            .add_brush(ConvexBrush::from_bounds([-512.0, 512.0, 0.0], [512.0, 576.0, 256.0], CONTENTS_SOLID));
        let config = PmoveConfig::default();

        let velocities = [
            [0.0, 0.0, 0.0],
            [5000.0, 3000.0, 2000.0],
            [-9000.0, 1.0, -9000.0],
            [1.0e-6, -1.0e-6, 0.0],
            [480.0, -480.0, 960.0],
        ];
        for v in velocities {
            let mut ps = PlayerState {
                origin: [100.0, -50.0, 120.0],
                velocity: v,
                gravity: 800.0,
                pm_time: 0,
            };
            let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.05));
            pm.ground_trace();
            pm.slide_move(true);
            assert!(pm.ps.origin.iter().all(|c| c.is_finite()), "{:?}", pm.ps.origin);
            assert!(pm.ps.velocity.iter().all(|c| c.is_finite()), "{:?}", pm.ps.velocity);
        }
    }

    #[test]
    fn test_ground_trace() {
        let world = floor_world(1024.0);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [0.0, 0.0, 24.125],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));
        pm.ground_trace();
        assert!(pm.ground.ground_plane);
        assert!(pm.ground.walking);
        assert_eq!(pm.ground.ground_trace.plane.normal, [0.0, 0.0, 1.0]);

        pm.ps.origin[2] = 60.0;
        pm.ground_trace();
        assert!(!pm.ground.ground_plane);
    }

    #[test]
    fn test_ground_trace_kickoff() {
        let world = floor_world(1024.0);
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [0.0, 0.0, 24.125],
            velocity: [0.0, 0.0, 270.0],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));
        pm.ground_trace();
        assert!(!pm.ground.ground_plane);
    }

    fn stair_world() -> BrushWorld {
        let mut world = floor_world(1024.0);
        world.add_brush(ConvexBrush::from_bounds(
            [64.0, -1024.0, 0.0],
            [1024.0, 1024.0, 16.0],
            CONTENTS_SOLID,
        ));
        world
    }

    #[test]
    fn test_step_up_stair() {
        let world = stair_world();
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [30.0, 0.0, 24.125],
            velocity: [400.0, 0.0, 0.0],
            gravity: 800.0,
            pm_time: 0,
        };
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));
        pm.ground_trace();

        assert!(pm.step_slide_move(false, false));
        assert_abs_diff_eq!(pm.ps.origin[0], 70.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pm.ps.origin[2], 40.125, epsilon = 1e-3);
        assert_eq!(pm.events, vec![PmEvent::Step16]);
    }

    #[test]
    fn test_step_blocked_by_tall_wall() {
        let mut world = floor_world(1024.0);
        world.add_brush(ConvexBrush::from_bounds(
            [64.0, -1024.0, 0.0],
            [1024.0, 1024.0, 64.0],
            CONTENTS_SOLID,
        ));
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [30.0, 0.0, 24.125],
            velocity: [400.0, 0.0, 0.0],
            ..PlayerState::default()
        };
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));
        pm.ground_trace();

        assert!(!pm.step_slide_move(false, false));
        assert!(pm.ps.origin[0] < 49.0);
        assert_abs_diff_eq!(pm.ps.origin[2], 24.125, epsilon = 1e-3);
        assert!(pm.events.is_empty());
    }

    #[test]
    fn test_predict_step_move_restores_state() {
        let world = stair_world();
        let config = PmoveConfig::default();
        let mut ps = PlayerState {
            origin: [30.0, 0.0, 24.125],
            velocity: [400.0, 0.0, 0.0],
            ..PlayerState::default()
        };
        let before = ps.clone();
        let mut pm = PmoveContext::new(&mut ps, &world, &config, params(0.1));
        pm.ground_trace();

        assert!(pm.predict_step_move());
        assert_eq!(*pm.ps, before);
        assert!(pm.events.is_empty());
    }
}
