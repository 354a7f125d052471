// model_types.rs — In-memory world representation
//
// d* structures in qfiles are the on-disk records, the types here are what
// the loader builds from them. Cross references are indices, never pointers:
// nodes address their children and parent by NodeId, leafs address their
// surfaces through the mark surface list, lights chain their interactions
// by InteractionId.

use xrq_common::q_shared::{Axis, CPlane, Matrix, Vec2, Vec3, Vec4, AXIS_IDENTITY};

use crate::shader::{FogParms, ShaderHandle, SurfaceFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InteractionId(pub usize);

// ============================================================================
// Surfaces
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SrfVert {
    pub xyz: Vec3,
    pub st: Vec2,
    pub lightmap: Vec2,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub binormal: Vec3,
    pub color: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrfTriangle {
    pub indexes: [u32; 3],
    /// Triangle across edge k (indexes k and k+1), if any.
    pub neighbors: [Option<usize>; 3],
    pub plane: Vec4,
    pub degenerate: bool,
}

impl SrfTriangle {
    pub fn new(indexes: [u32; 3]) -> Self {
        Self {
            indexes,
            neighbors: [None; 3],
            plane: [0.0; 4],
            degenerate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceFace {
    pub plane: CPlane,
    pub bounds: [Vec3; 2],
    pub verts: Vec<SrfVert>,
    pub triangles: Vec<SrfTriangle>,
}

/// A curved patch subdivided into a width x height vertex grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceGrid {
    pub width: usize,
    pub height: usize,
    pub verts: Vec<SrfVert>,
    pub triangles: Vec<SrfTriangle>,

    /// 1/error per column and per row; 999 marks a collapsed line.
    pub width_lod_error: Vec<f32>,
    pub height_lod_error: Vec<f32>,

    /// Centre and radius shared by every patch of one LOD group.
    pub lod_origin: Vec3,
    pub lod_radius: f32,

    pub mesh_bounds: [Vec3; 2],
    pub local_origin: Vec3,
    pub mesh_radius: f32,

    pub lod_fixed: u8,
    pub lod_stitched: bool,
}

impl SurfaceGrid {
    #[inline]
    pub fn vert(&self, row: usize, column: usize) -> &SrfVert {
        &self.verts[row * self.width + column]
    }

    /// True when this grid and `other` belong to the same LOD group.
    pub fn same_lod_group(&self, other: &SurfaceGrid) -> bool {
        self.lod_radius == other.lod_radius && self.lod_origin == other.lod_origin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceTriangles {
    pub bounds: [Vec3; 2],
    pub verts: Vec<SrfVert>,
    pub triangles: Vec<SrfTriangle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceFlare {
    pub origin: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceData {
    Face(SurfaceFace),
    Grid(SurfaceGrid),
    Triangles(SurfaceTriangles),
    Flare(SurfaceFlare),
    /// Kept for collision only; never drawn or lit.
    Skip,
}

impl SurfaceData {
    /// Vertex and triangle lists of the kinds that have them.
    pub fn mesh(&self) -> Option<(&[SrfVert], &[SrfTriangle])> {
        match self {
            SurfaceData::Face(f) => Some((&f.verts, &f.triangles)),
            SurfaceData::Grid(g) => Some((&g.verts, &g.triangles)),
            SurfaceData::Triangles(t) => Some((&t.verts, &t.triangles)),
            SurfaceData::Flare(_) | SurfaceData::Skip => None,
        }
    }

    pub fn bounds(&self) -> Option<&[Vec3; 2]> {
        match self {
            SurfaceData::Face(f) => Some(&f.bounds),
            SurfaceData::Grid(g) => Some(&g.mesh_bounds),
            SurfaceData::Triangles(t) => Some(&t.bounds),
            SurfaceData::Flare(_) | SurfaceData::Skip => None,
        }
    }

    pub fn as_grid(&self) -> Option<&SurfaceGrid> {
        match self {
            SurfaceData::Grid(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_grid_mut(&mut self) -> Option<&mut SurfaceGrid> {
        match self {
            SurfaceData::Grid(g) => Some(g),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MSurface {
    pub shader: ShaderHandle,
    /// 0 is the "no fog" slot.
    pub fog_index: usize,
    pub data: SurfaceData,
}

/// Shader lump entry.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldShader {
    pub name: String,
    pub surface_flags: SurfaceFlags,
    pub content_flags: i32,
}

// ============================================================================
// BSP tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MLeaf {
    pub cluster: i32,
    pub area: i32,
    pub first_mark_surface: usize,
    pub num_mark_surfaces: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Decision { plane: usize, children: [NodeId; 2] },
    Leaf(MLeaf),
}

/// Decision nodes come first in World::nodes, leafs follow them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MNode {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl MNode {
    /// -1 for decision nodes, 0 for leafs.
    pub fn contents(&self) -> i32 {
        match self.kind {
            NodeKind::Decision { .. } => -1,
            NodeKind::Leaf(_) => 0,
        }
    }

    pub fn leaf(&self) -> Option<&MLeaf> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Decision { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BModel {
    pub bounds: [Vec3; 2],
    pub first_surface: usize,
    pub num_surfaces: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub original_brush_number: i32,
    pub bounds: [Vec3; 2],
    pub parms: FogParms,
    pub color: [u8; 4],
    pub tc_scale: f32,
    /// Gradient plane of the visible side, if there is one.
    pub surface: Option<Vec4>,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            original_brush_number: -1,
            bounds: [[0.0; 3]; 2],
            parms: FogParms::default(),
            color: [0; 4],
            tc_scale: 0.0,
            surface: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightGrid {
    pub size: Vec3,
    pub inverse_size: Vec3,
    pub origin: Vec3,
    pub bounds: [i32; 3],
    /// 8 bytes per point: ambient rgb, directed rgb, lat/long direction.
    pub data: Vec<u8>,
}

// ============================================================================
// Lights and interactions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefLightType {
    #[default]
    Omni,
    Proj,
}

/// Light parameters as authored in the entity lump.
#[derive(Debug, Clone, PartialEq)]
pub struct RefLight {
    pub rl_type: RefLightType,
    pub origin: Vec3,
    /// Offset of the lighting origin from `origin`, in light space.
    pub center: Vec3,
    pub color: Vec3,
    /// Half extents of an omni light's box.
    pub radius: Vec3,
    pub axis: Axis,
    pub fov_x: f32,
    pub fov_y: f32,
    pub distance: f32,
    pub attenuation_shader: Option<String>,
    pub no_shadows: bool,
}

impl Default for RefLight {
    fn default() -> Self {
        Self {
            rl_type: RefLightType::Omni,
            origin: [0.0; 3],
            center: [0.0; 3],
            color: [1.0; 3],
            radius: [300.0; 3],
            axis: AXIS_IDENTITY,
            fov_x: 90.0,
            fov_y: 90.0,
            distance: 300.0,
            attenuation_shader: None,
            no_shadows: false,
        }
    }
}

/// A static light with everything the precache derived for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrRefLight {
    pub l: RefLight,

    pub transform: Matrix,
    /// Where lighting and shadows are computed from.
    pub origin: Vec3,
    pub view_matrix: Matrix,
    pub projection_matrix: Matrix,

    pub local_bounds: [Vec3; 2],
    pub world_bounds: [Vec3; 2],
    /// Inward facing planes; a box entirely behind any of them is outside.
    pub frustum: [CPlane; 6],

    pub leafs: Vec<NodeId>,
    pub first_interaction: Option<InteractionId>,
    pub last_interaction: Option<InteractionId>,
}

impl TrRefLight {
    pub fn new(l: RefLight) -> Self {
        Self {
            l,
            transform: [0.0; 16],
            origin: [0.0; 3],
            view_matrix: [0.0; 16],
            projection_matrix: [0.0; 16],
            local_bounds: [[0.0; 3]; 2],
            world_bounds: [[0.0; 3]; 2],
            frustum: [CPlane::default(); 6],
            leafs: Vec::new(),
            first_interaction: None,
            last_interaction: None,
        }
    }
}

/// All six cube sides may be touched.
pub const CUBESIDE_CLIPALL: u8 = 0x3f;

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionCache {
    pub light: LightId,
    pub surface: SurfaceId,
    /// Triangles facing the light; empty when light indexes are not precached.
    pub light_indexes: Vec<u32>,
    /// Silhouette quads followed by light and dark caps; empty when no
    /// shadow volume was built.
    pub shadow_indexes: Vec<u32>,
    pub next: Option<InteractionId>,
    pub cube_side_bits: u8,
}

// ============================================================================
// World
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct World {
    /// "maps/q3dm1.bsp"
    pub name: String,
    /// "q3dm1"
    pub base_name: String,
    pub checksum: u32,
    pub data_size: usize,

    pub shaders: Vec<WorldShader>,
    pub planes: Vec<CPlane>,

    pub nodes: Vec<MNode>,
    pub num_decision_nodes: usize,

    pub surfaces: Vec<MSurface>,
    pub mark_surfaces: Vec<SurfaceId>,
    pub bmodels: Vec<BModel>,

    /// Index 0 is unused so a surface fog index of 0 means "no fog".
    pub fogs: Vec<Fog>,

    pub num_clusters: usize,
    pub cluster_bytes: usize,
    pub vis: Option<Vec<u8>>,
    /// One all-visible cluster row.
    pub novis: Vec<u8>,

    pub light_grid_size: Vec3,
    pub light_grid: Option<LightGrid>,

    pub entity_string: String,
    /// (original, replacement) shader names from worldspawn.
    pub remaps: Vec<(String, String)>,

    pub lights: Vec<TrRefLight>,
    pub interactions: Vec<InteractionCache>,
}

impl World {
    pub fn num_leafs(&self) -> usize {
        self.nodes.len() - self.num_decision_nodes
    }

    pub fn leaf_id(&self, leaf: usize) -> NodeId {
        NodeId(self.num_decision_nodes + leaf)
    }

    pub fn node(&self, id: NodeId) -> &MNode {
        &self.nodes[id.0]
    }

    pub fn surface(&self, id: SurfaceId) -> &MSurface {
        &self.surfaces[id.0]
    }

    pub fn leaf_surfaces(&self, leaf: &MLeaf) -> &[SurfaceId] {
        &self.mark_surfaces[leaf.first_mark_surface..leaf.first_mark_surface + leaf.num_mark_surfaces]
    }

    /// Walks a light's interaction chain in creation order.
    pub fn light_interactions(&self, light: LightId) -> LightInteractions<'_> {
        LightInteractions {
            world: self,
            next: self.lights.get(light.0).and_then(|l| l.first_interaction),
        }
    }
}

pub struct LightInteractions<'a> {
    world: &'a World,
    next: Option<InteractionId>,
}

impl<'a> Iterator for LightInteractions<'a> {
    type Item = &'a InteractionCache;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let ia = self.world.interactions.get(id.0)?;
        self.next = ia.next;
        Some(ia)
    }
}
