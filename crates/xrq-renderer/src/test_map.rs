// test_map.rs — Small synthetic maps for unit tests
//
// Two 128x128 floor quads on either side of the x=0 split plane, one leaf
// each, a single cluster per leaf and one omni light above the +x quad.

use xrq_common::config::EngineConfig;
use xrq_common::qfiles::*;

use crate::bsp::WorldLoader;
use crate::model_types::World;
use crate::shader::{Shader, ShaderRegistry};

pub const QUAD_SHADER: &str = "textures/test/floor";

pub const QUAD_ENTITIES: &str = "{\n\"classname\" \"worldspawn\"\n\"gridsize\" \"128 128 128\"\n}\n\
{\n\"classname\" \"light\"\n\"origin\" \"128 0 64\"\n\"light\" \"128\"\n}\n";

pub fn draw_vert(x: f32, y: f32, z: f32) -> DrawVert {
    DrawVert {
        xyz: [x, y, z],
        st: [x / 128.0, y / 128.0],
        lightmap: [0.0, 0.0],
        normal: [0.0, 0.0, 1.0],
        color: [255, 255, 255, 255],
    }
}

pub fn face(first_vert: i32, num_verts: i32, first_index: i32, num_indexes: i32) -> DSurface {
    DSurface {
        shader_num: 0,
        fog_num: -1,
        surface_type: MapSurfaceType::Planar as i32,
        first_vert,
        num_verts,
        first_index,
        num_indexes,
        lightmap_vecs: [[0.0; 3], [0.0; 3], [0.0, 0.0, 1.0]],
        ..Default::default()
    }
}

/// Lumps of the two-quad map; tests replace single lumps before `finish`.
pub struct QuadMap {
    pub shaders: Vec<DShader>,
    pub planes: Vec<DPlane>,
    pub nodes: Vec<DNode>,
    pub leafs: Vec<DLeaf>,
    pub leaf_surfaces: Vec<i32>,
    pub models: Vec<DModel>,
    pub verts: Vec<DrawVert>,
    pub indexes: Vec<i32>,
    pub surfaces: Vec<DSurface>,
    pub brushes: Vec<DBrush>,
    pub brush_sides: Vec<DBrushSide>,
    pub fogs: Vec<DFog>,
    pub entities: String,
    pub visibility: Vec<u8>,
    pub light_grid: Vec<u8>,
}

/// 5 x 5 x 1 grid points over the model bounds at 128 unit spacing.
pub const QUAD_GRID_POINTS: usize = 25;

impl Default for QuadMap {
    fn default() -> Self {
        let mut verts = Vec::new();
        for dx in [0.0, -256.0] {
            verts.push(draw_vert(64.0 + dx, -64.0, 0.0));
            verts.push(draw_vert(64.0 + dx, 64.0, 0.0));
            verts.push(draw_vert(192.0 + dx, 64.0, 0.0));
            verts.push(draw_vert(192.0 + dx, -64.0, 0.0));
        }

        let mut visibility = Vec::new();
        visibility.extend_from_slice(&2i32.to_le_bytes());
        visibility.extend_from_slice(&1i32.to_le_bytes());
        visibility.extend_from_slice(&[0x01, 0x03]);

        let light_grid = [10u8, 20, 30, 100, 200, 50, 7, 9].repeat(QUAD_GRID_POINTS);

        Self {
            shaders: vec![DShader {
                shader: QUAD_SHADER.to_string(),
                surface_flags: 0,
                content_flags: 1,
            }],
            planes: vec![DPlane {
                normal: [1.0, 0.0, 0.0],
                dist: 0.0,
            }],
            nodes: vec![DNode {
                plane_num: 0,
                children: [-1, -2],
                mins: [-256, -256, -64],
                maxs: [256, 256, 64],
            }],
            leafs: vec![
                DLeaf {
                    cluster: 0,
                    area: 0,
                    mins: [0, -256, -64],
                    maxs: [256, 256, 64],
                    first_leaf_surface: 0,
                    num_leaf_surfaces: 1,
                    ..Default::default()
                },
                DLeaf {
                    cluster: 1,
                    area: 0,
                    mins: [-256, -256, -64],
                    maxs: [0, 256, 64],
                    first_leaf_surface: 1,
                    num_leaf_surfaces: 1,
                    ..Default::default()
                },
            ],
            leaf_surfaces: vec![0, 1],
            models: vec![DModel {
                mins: [-256.0, -256.0, -64.0],
                maxs: [256.0, 256.0, 64.0],
                first_surface: 0,
                num_surfaces: 2,
                ..Default::default()
            }],
            verts,
            indexes: vec![0, 1, 2, 0, 2, 3, 0, 1, 2, 0, 2, 3],
            surfaces: vec![face(0, 4, 0, 6), face(4, 4, 6, 6)],
            brushes: Vec::new(),
            brush_sides: Vec::new(),
            fogs: Vec::new(),
            entities: QUAD_ENTITIES.to_string(),
            visibility,
            light_grid,
        }
    }
}

impl QuadMap {
    pub fn finish(&self) -> Vec<u8> {
        let mut entities = self.entities.clone().into_bytes();
        entities.push(0);

        let mut w = BspWriter::new();
        w.set_raw(LUMP_ENTITIES, entities)
            .set_records(LUMP_SHADERS, &self.shaders)
            .set_records(LUMP_PLANES, &self.planes)
            .set_records(LUMP_NODES, &self.nodes)
            .set_records(LUMP_LEAFS, &self.leafs)
            .set_records(LUMP_LEAFSURFACES, &self.leaf_surfaces)
            .set_records(LUMP_MODELS, &self.models)
            .set_records(LUMP_BRUSHES, &self.brushes)
            .set_records(LUMP_BRUSHSIDES, &self.brush_sides)
            .set_records(LUMP_DRAWVERTS, &self.verts)
            .set_records(LUMP_DRAWINDEXES, &self.indexes)
            .set_records(LUMP_FOGS, &self.fogs)
            .set_records(LUMP_SURFACES, &self.surfaces)
            .set_raw(LUMP_LIGHTGRID, self.light_grid.clone())
            .set_raw(LUMP_VISIBILITY, self.visibility.clone());
        w.finish()
    }
}

pub fn quad_shaders() -> ShaderRegistry {
    let mut shaders = ShaderRegistry::new();
    shaders.register(Shader::new(QUAD_SHADER));
    shaders
}

/// The loaded two-quad map together with its material table.
pub fn quad_world() -> (World, ShaderRegistry) {
    let mut shaders = quad_shaders();
    let config = EngineConfig::default();
    let data = QuadMap::default().finish();
    let world = WorldLoader::new(&config, &mut shaders)
        .load("maps/quad.bsp", &data)
        .unwrap();
    (world, shaders)
}
