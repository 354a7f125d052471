// interaction.rs — Static light / surface interaction precache
//
// For every light: walk the BSP with the light's world bounds, test each
// surface reached once, keep the triangles that face the light and, when
// stencil shadows are on, build the shadow volume indexes for them. A
// second walk collects the leafs the light touches.

use rayon::prelude::*;
use tracing::{debug, info};
use xrq_common::config::PrecacheConfig;
use xrq_common::error::BspError;
use xrq_common::q_shared::{bounds_intersect, box_on_plane_side, dot_product, plane_from_points, SIDE_BACK, SIDE_FRONT};

use crate::light::{cube_side_bits, cull_box, setup_light};
use crate::model_types::{
    InteractionCache, InteractionId, LightId, NodeId, NodeKind, RefLightType, SrfTriangle, SrfVert, SurfaceData,
    SurfaceId, TrRefLight, World, CUBESIDE_CLIPALL,
};
use crate::sat::triangle_in_light;
use crate::shader::{CullType, ShaderLookup, SurfaceFlags};

/// Shadow indexes one facing triangle can contribute: three silhouette
/// quads plus both caps.
const SHADOW_INDEXES_PER_TRIANGLE: usize = 6 * 3 + 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecacheStats {
    pub lights: usize,
    pub interactions: usize,
    /// Surfaces rejected by bounds or frustum before any triangle test.
    pub culled_surfaces: usize,
    pub culled_face_triangles: usize,
    pub culled_grid_triangles: usize,
    pub culled_tri_triangles: usize,
    /// Interactions that got no shadow volume because of the index budget.
    pub shadow_budget_skips: usize,
}

/// Traversal state. The pass counter is bumped for every walk; a node or
/// surface stamped with the current pass has already been visited.
pub struct InteractionPrecacher<'a> {
    shaders: &'a dyn ShaderLookup,
    config: &'a PrecacheConfig,
    light_count: u32,
    node_stamps: Vec<u32>,
    surface_stamps: Vec<u32>,
    stats: PrecacheStats,
}

/// What one light produced, not yet linked into the world.
struct LightResult {
    interactions: Vec<InteractionCache>,
    leafs: Vec<NodeId>,
}

impl<'a> InteractionPrecacher<'a> {
    pub fn new(world: &World, shaders: &'a dyn ShaderLookup, config: &'a PrecacheConfig) -> Self {
        Self {
            shaders,
            config,
            light_count: 0,
            node_stamps: vec![0; world.nodes.len()],
            surface_stamps: vec![0; world.surfaces.len()],
            stats: PrecacheStats::default(),
        }
    }

    /// Sets up every light of the world and fills its interaction chain.
    pub fn precache_world(mut self, world: &mut World) -> Result<PrecacheStats, BspError> {
        info!("...precaching {} lights", world.lights.len());

        world.interactions.clear();
        world.lights.par_iter_mut().for_each(|light| {
            setup_light(light);
            light.first_interaction = None;
            light.last_interaction = None;
            light.leafs.clear();
        });

        for i in 0..world.lights.len() {
            let result = self.precache_light(world, LightId(i))?;
            link_interactions(world, LightId(i), result);
            self.stats.lights += 1;
        }

        self.stats.interactions = world.interactions.len();
        info!("{} interactions precached", self.stats.interactions);
        info!(
            "{} culled surfaces, {} culled face / {} grid / {} triangle soup triangles",
            self.stats.culled_surfaces,
            self.stats.culled_face_triangles,
            self.stats.culled_grid_triangles,
            self.stats.culled_tri_triangles
        );
        if self.stats.shadow_budget_skips > 0 {
            info!("{} interactions without shadow volume", self.stats.shadow_budget_skips);
        }

        Ok(self.stats)
    }

    fn next_pass(&mut self) -> u32 {
        self.light_count += 1;
        self.light_count
    }

    fn precache_light(&mut self, world: &World, id: LightId) -> Result<LightResult, BspError> {
        let mut result = LightResult {
            interactions: Vec::new(),
            leafs: Vec::new(),
        };
        if world.nodes.is_empty() {
            return Ok(result);
        }
        let light = &world.lights[id.0];

        let pass = self.next_pass();
        self.recursive_interaction_node(world, light, id, NodeId(0), pass, &mut result.interactions)?;

        let pass = self.next_pass();
        self.recursive_add_leafs(world, light, NodeId(0), pass, &mut result.leafs);

        debug!(
            "light {}: {} interactions, {} leafs",
            id.0,
            result.interactions.len(),
            result.leafs.len()
        );
        Ok(result)
    }

    fn recursive_interaction_node(
        &mut self,
        world: &World,
        light: &TrRefLight,
        id: LightId,
        node: NodeId,
        pass: u32,
        out: &mut Vec<InteractionCache>,
    ) -> Result<(), BspError> {
        self.node_stamps[node.0] = pass;

        match world.node(node).kind {
            NodeKind::Leaf(leaf) => {
                for &surface in world.leaf_surfaces(&leaf) {
                    if self.surface_stamps[surface.0] == pass {
                        continue;
                    }
                    self.surface_stamps[surface.0] = pass;
                    if let Some(ia) = self.precache_interaction(world, light, id, surface)? {
                        out.push(ia);
                    }
                }
                Ok(())
            }
            NodeKind::Decision { plane, children } => {
                let [mins, maxs] = &light.world_bounds;
                match box_on_plane_side(mins, maxs, &world.planes[plane]) {
                    SIDE_FRONT => self.recursive_interaction_node(world, light, id, children[0], pass, out),
                    SIDE_BACK => self.recursive_interaction_node(world, light, id, children[1], pass, out),
                    _ => {
                        self.recursive_interaction_node(world, light, id, children[0], pass, out)?;
                        self.recursive_interaction_node(world, light, id, children[1], pass, out)
                    }
                }
            }
        }
    }

    fn recursive_add_leafs(&mut self, world: &World, light: &TrRefLight, node: NodeId, pass: u32, leafs: &mut Vec<NodeId>) {
        if self.node_stamps[node.0] == pass {
            return;
        }
        self.node_stamps[node.0] = pass;

        let n = world.node(node);
        match n.kind {
            NodeKind::Leaf(_) => {
                if !cull_box(light, &n.mins, &n.maxs) {
                    leafs.push(node);
                }
            }
            NodeKind::Decision { plane, children } => {
                let [mins, maxs] = &light.world_bounds;
                match box_on_plane_side(mins, maxs, &world.planes[plane]) {
                    SIDE_FRONT => self.recursive_add_leafs(world, light, children[0], pass, leafs),
                    SIDE_BACK => self.recursive_add_leafs(world, light, children[1], pass, leafs),
                    _ => {
                        self.recursive_add_leafs(world, light, children[0], pass, leafs);
                        self.recursive_add_leafs(world, light, children[1], pass, leafs);
                    }
                }
            }
        }
    }

    fn count_culled(&mut self, data: &SurfaceData, culled: usize) {
        match data {
            SurfaceData::Face(_) => self.stats.culled_face_triangles += culled,
            SurfaceData::Grid(_) => self.stats.culled_grid_triangles += culled,
            SurfaceData::Triangles(_) => self.stats.culled_tri_triangles += culled,
            SurfaceData::Flare(_) | SurfaceData::Skip => {}
        }
    }

    fn precache_interaction(
        &mut self,
        world: &World,
        light: &TrRefLight,
        id: LightId,
        surface_id: SurfaceId,
    ) -> Result<Option<InteractionCache>, BspError> {
        let shaders = self.shaders;
        let surface = world.surface(surface_id);
        let shader = shaders.shader(surface.shader);

        if shader.surface_flags.intersects(SurfaceFlags::NODLIGHT | SurfaceFlags::SKY) || shader.is_sky() {
            return Ok(None);
        }

        let (Some((verts, triangles)), Some(bounds)) = (surface.data.mesh(), surface.data.bounds()) else {
            return Ok(None);
        };

        let [lmins, lmaxs] = &light.world_bounds;
        if !bounds_intersect(lmins, lmaxs, &bounds[0], &bounds[1]) {
            self.stats.culled_surfaces += 1;
            return Ok(None);
        }
        if light.l.rl_type == RefLightType::Proj && cull_box(light, &bounds[0], &bounds[1]) {
            self.stats.culled_surfaces += 1;
            return Ok(None);
        }

        let facing = facing_triangles(light, verts, triangles, shader.cull_type);

        let mut light_indexes = Vec::new();
        let mut num_facing = 0;
        for (tri, _) in triangles.iter().zip(&facing).filter(|(_, f)| **f) {
            if light_indexes.len() >= self.config.max_indexes {
                return Err(BspError::IndexBudget {
                    surface: shader.name.clone(),
                    count: light_indexes.len(),
                    max: self.config.max_indexes,
                });
            }
            light_indexes.extend_from_slice(&tri.indexes);
            num_facing += 1;
        }

        self.count_culled(&surface.data, triangles.len() - num_facing);
        if num_facing == 0 {
            return Ok(None);
        }

        let mut shadow_indexes = Vec::new();
        if self.config.shadow_volumes && !light.l.no_shadows {
            if num_facing * SHADOW_INDEXES_PER_TRIANGLE < self.config.max_indexes {
                shadow_indexes = build_shadow_indexes(triangles, &facing, verts.len() as u32);
            } else {
                self.stats.shadow_budget_skips += 1;
            }
        }

        if !self.config.light_indexes || light_indexes.len() < 3 {
            light_indexes.clear();
        }
        if !self.config.shadow_indexes || shadow_indexes.len() < SHADOW_INDEXES_PER_TRIANGLE {
            shadow_indexes.clear();
        }

        let cube_side_bits = match light.l.rl_type {
            RefLightType::Omni => cube_side_bits(light, bounds),
            RefLightType::Proj => CUBESIDE_CLIPALL,
        };

        Ok(Some(InteractionCache {
            light: id,
            surface: surface_id,
            light_indexes,
            shadow_indexes,
            next: None,
            cube_side_bits,
        }))
    }
}

/// Per triangle: does it face the light? Degenerate triangles always do.
pub fn facing_triangles(light: &TrRefLight, verts: &[SrfVert], triangles: &[SrfTriangle], cull: CullType) -> Vec<bool> {
    triangles
        .iter()
        .map(|tri| {
            let [v0, v1, v2] = tri.indexes.map(|i| &verts[i as usize].xyz);
            let Some(plane) = plane_from_points(v0, v1, v2) else {
                return true;
            };

            let d = dot_product(&plane.normal, &light.origin) - plane.dist;
            if d <= 0.0 || cull == CullType::BackSided {
                return false;
            }

            light.l.rl_type != RefLightType::Omni || triangle_in_light(light, v0, v1, v2)
        })
        .collect()
}

/// Shadow volume for the facing triangles of a mesh whose extruded copy of
/// the verts starts at `num_verts`: a quad per silhouette edge, then a light
/// and a dark cap per facing triangle.
pub fn build_shadow_indexes(triangles: &[SrfTriangle], facing: &[bool], num_verts: u32) -> Vec<u32> {
    let nv = num_verts;
    let mut indexes = Vec::new();

    let is_silhouette = |n: Option<usize>| n.map_or(true, |j| !facing.get(j).copied().unwrap_or(false));

    for (tri, _) in triangles.iter().zip(facing).filter(|(_, f)| **f) {
        let [i0, i1, i2] = tri.indexes;
        if is_silhouette(tri.neighbors[0]) {
            indexes.extend_from_slice(&[i1, i0, i0 + nv, i1, i0 + nv, i1 + nv]);
        }
        if is_silhouette(tri.neighbors[1]) {
            indexes.extend_from_slice(&[i2, i1, i1 + nv, i2, i1 + nv, i2 + nv]);
        }
        if is_silhouette(tri.neighbors[2]) {
            indexes.extend_from_slice(&[i0, i2, i2 + nv, i0, i2 + nv, i0 + nv]);
        }
    }

    for (tri, _) in triangles.iter().zip(facing).filter(|(_, f)| **f) {
        let [i0, i1, i2] = tri.indexes;
        indexes.extend_from_slice(&[i0, i1, i2]);
        indexes.extend_from_slice(&[i2 + nv, i1 + nv, i0 + nv]);
    }

    indexes
}

fn link_interactions(world: &mut World, id: LightId, result: LightResult) {
    for mut ia in result.interactions {
        let new_id = InteractionId(world.interactions.len());
        ia.next = None;

        let light = &mut world.lights[id.0];
        match light.last_interaction {
            Some(last) => world.interactions[last.0].next = Some(new_id),
            None => light.first_interaction = Some(new_id),
        }
        light.last_interaction = Some(new_id);
        world.interactions.push(ia);
    }
    world.lights[id.0].leafs = result.leafs;
}

/// Convenience wrapper over [`InteractionPrecacher`].
pub fn precache_interactions(
    world: &mut World,
    shaders: &dyn ShaderLookup,
    config: &PrecacheConfig,
) -> Result<PrecacheStats, BspError> {
    InteractionPrecacher::new(world, shaders, config).precache_world(world)
}
