// bsp.rs — World map loading
//
// Lumps are loaded in dependency order into a scratch World. Nothing is
// visible to the rest of the engine until the whole load, interaction
// precache included, has succeeded and WorldSlot publishes the result.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};
use xrq_common::config::{EngineConfig, MAX_OVERBRIGHT_BITS};
use xrq_common::error::BspError;
use xrq_common::md4::com_block_checksum;
use xrq_common::q_shared::{
    add_point_to_bounds, clear_bounds, com_skip_path, com_strip_extension, dot_product, vector_length,
    vector_subtract, CPlane, Vec3,
};
use xrq_common::qfiles::*;

use crate::curve::{
    calc_surface_triangle_neighbors, calc_surface_triangle_planes, calc_tangent_spaces, mesh_bounds,
    smooth_shared_normals, subdivide_patch_to_grid,
};
use crate::entities::load_entities;
use crate::interaction::precache_interactions;
use crate::model_types::*;
use crate::shader::{ShaderHandle, ShaderLookup, SurfaceFlags};
use crate::stitch::{fix_shared_vertex_lod_error, stitch_all_patches};

/// Shifts baked lighting into the overbright range, scaling the color down
/// instead of saturating to white. Alpha is untouched.
pub fn color_shift_lighting_bytes(shift: i32, color: [u8; 4]) -> [u8; 4] {
    let shift = shift.clamp(0, MAX_OVERBRIGHT_BITS);
    let mut r = (color[0] as i32) << shift;
    let mut g = (color[1] as i32) << shift;
    let mut b = (color[2] as i32) << shift;

    if (r | g | b) > 255 {
        let max = r.max(g).max(b);
        r = r * 255 / max;
        g = g * 255 / max;
        b = b * 255 / max;
    }

    [r as u8, g as u8, b as u8, color[3]]
}

/// Builds a World from the bytes of a compiled map.
pub struct WorldLoader<'a> {
    config: &'a EngineConfig,
    shaders: &'a mut dyn ShaderLookup,
    world: World,
}

impl<'a> WorldLoader<'a> {
    pub fn new(config: &'a EngineConfig, shaders: &'a mut dyn ShaderLookup) -> Self {
        Self {
            config,
            shaders,
            world: World::default(),
        }
    }

    pub fn load(mut self, name: &str, data: &[u8]) -> Result<World, BspError> {
        info!("----- loading world map {} -----", name);

        let file = BspFile::parse(name, data)?;

        self.world.name = name.to_string();
        self.world.base_name = com_strip_extension(com_skip_path(name));
        self.world.checksum = com_block_checksum(data);
        self.world.data_size = data.len();

        self.load_entities(&file);
        self.load_shaders(&file)?;
        self.load_planes(&file)?;
        self.load_fogs(&file)?;
        self.load_surfaces(&file)?;
        self.load_mark_surfaces(&file)?;
        self.load_nodes_and_leafs(&file)?;
        self.load_submodels(&file)?;
        self.load_visibility(&file);
        self.load_light_grid(&file);

        precache_interactions(&mut self.world, &*self.shaders, &self.config.precache)?;

        Ok(self.world)
    }

    fn bad_index(&self, what: &'static str, index: i64, count: usize) -> BspError {
        BspError::BadIndex {
            name: self.world.name.clone(),
            what,
            index,
            count,
        }
    }

    /// `count` records starting at `first`, range checked.
    fn range<'r, T>(&self, what: &'static str, records: &'r [T], first: i32, count: i32) -> Result<&'r [T], BspError> {
        let end = first as i64 + count as i64;
        if first < 0 || count < 0 || end > records.len() as i64 {
            return Err(self.bad_index(what, if first < 0 { first as i64 } else { end }, records.len()));
        }
        Ok(&records[first as usize..end as usize])
    }

    // ============================================================
    // Entities, shaders, planes
    // ============================================================

    fn load_entities(&mut self, file: &BspFile) {
        let bytes = file.lump_bytes(LUMP_ENTITIES);
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let text = String::from_utf8_lossy(&bytes[..len]).into_owned();

        let lump = load_entities(&text, self.config.world.default_grid_size);
        self.world.light_grid_size = lump.grid_size;
        self.world.remaps = lump.remaps;
        self.world.lights = lump.lights.into_iter().map(TrRefLight::new).collect();
        self.world.entity_string = text;
    }

    fn load_shaders(&mut self, file: &BspFile) -> Result<(), BspError> {
        info!("...loading shaders");
        let shaders: Vec<DShader> = file.records(LUMP_SHADERS)?;
        self.world.shaders = shaders
            .into_iter()
            .map(|s| WorldShader {
                name: s.shader,
                surface_flags: SurfaceFlags::from_bits_retain(s.surface_flags),
                content_flags: s.content_flags,
            })
            .collect();
        Ok(())
    }

    /// Material for a shader lump index, honoring worldspawn remaps.
    fn shader_for(&mut self, shader_num: i32) -> Result<ShaderHandle, BspError> {
        let count = self.world.shaders.len();
        let Some(ws) = usize::try_from(shader_num).ok().and_then(|i| self.world.shaders.get(i)) else {
            return Err(self.bad_index("shader", shader_num as i64, count));
        };

        let name = self
            .world
            .remaps
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(&ws.name))
            .map_or_else(|| ws.name.clone(), |(_, to)| to.clone());

        Ok(self.shaders.find_shader(&name))
    }

    fn load_planes(&mut self, file: &BspFile) -> Result<(), BspError> {
        info!("...loading planes");
        let planes: Vec<DPlane> = file.records(LUMP_PLANES)?;
        self.world.planes = planes.iter().map(|p| CPlane::new(p.normal, p.dist)).collect();
        Ok(())
    }

    fn plane(&self, plane_num: i32) -> Result<&CPlane, BspError> {
        usize::try_from(plane_num)
            .ok()
            .and_then(|i| self.world.planes.get(i))
            .ok_or_else(|| self.bad_index("plane", plane_num as i64, self.world.planes.len()))
    }

    // ============================================================
    // Fogs
    // ============================================================

    fn load_fogs(&mut self, file: &BspFile) -> Result<(), BspError> {
        info!("...loading fogs");
        let fogs: Vec<DFog> = file.records(LUMP_FOGS)?;

        // slot 0 is "no fog"
        self.world.fogs = vec![Fog::default()];
        if fogs.is_empty() {
            return Ok(());
        }

        let brushes: Vec<DBrush> = file.records(LUMP_BRUSHES)?;
        let sides: Vec<DBrushSide> = file.records(LUMP_BRUSHSIDES)?;
        let identity_light = self.config.world.identity_light();

        for (i, ofog) in fogs.iter().enumerate() {
            let bad_fog = |reason: &str| BspError::BadFog {
                name: self.world.name.clone(),
                fog: i,
                reason: reason.to_string(),
            };

            let Some(brush) = usize::try_from(ofog.brush_num).ok().and_then(|b| brushes.get(b)) else {
                return Err(bad_fog("brush number out of range"));
            };
            let first_side = brush.first_side;
            if first_side < 0 || first_side as usize + 6 > sides.len() {
                return Err(bad_fog("brush sides out of range"));
            }
            let first_side = first_side as usize;

            let mut dist = [0.0f32; 6];
            for (k, d) in dist.iter_mut().enumerate() {
                *d = self.plane(sides[first_side + k].plane_num)?.dist;
            }

            let handle = self.shaders.find_shader(&ofog.shader);
            let parms = self.shaders.shader(handle).fog_parms.unwrap_or_default();

            let color_byte = |c: f32| (c * identity_light * 255.0).clamp(0.0, 255.0) as u8;
            let depth = if parms.depth_for_opaque < 1.0 { 1.0 } else { parms.depth_for_opaque };

            let surface = if ofog.visible_side == -1 {
                None
            } else {
                let side = usize::try_from(ofog.visible_side)
                    .ok()
                    .map(|s| first_side + s)
                    .filter(|&s| s < sides.len())
                    .ok_or_else(|| bad_fog("visible side out of range"))?;
                let plane = self.plane(sides[side].plane_num)?;
                Some([-plane.normal[0], -plane.normal[1], -plane.normal[2], -plane.dist])
            };

            self.world.fogs.push(Fog {
                original_brush_number: ofog.brush_num,
                bounds: [[-dist[0], -dist[2], -dist[4]], [dist[1], dist[3], dist[5]]],
                parms,
                color: [color_byte(parms.color[0]), color_byte(parms.color[1]), color_byte(parms.color[2]), 255],
                tc_scale: 1.0 / (depth * 8.0),
                surface,
            });
        }

        Ok(())
    }

    // ============================================================
    // Surfaces
    // ============================================================

    fn fog_index(&self, fog_num: i32) -> Result<usize, BspError> {
        let index = fog_num as i64 + 1;
        if index < 0 || index >= self.world.fogs.len() as i64 {
            return Err(self.bad_index("fog", fog_num as i64, self.world.fogs.len() - 1));
        }
        Ok(index as usize)
    }

    fn copy_vert(&self, dv: &DrawVert) -> SrfVert {
        SrfVert {
            xyz: dv.xyz,
            st: dv.st,
            lightmap: dv.lightmap,
            normal: dv.normal,
            color: color_shift_lighting_bytes(self.config.world.color_shift(), dv.color),
            ..Default::default()
        }
    }

    fn triangles(&self, ds: &DSurface, indexes: &[i32], num_verts: usize) -> Result<Vec<SrfTriangle>, BspError> {
        let src = self.range("draw index", indexes, ds.first_index, ds.num_indexes)?;
        src.chunks_exact(3)
            .map(|tri| {
                let mut out = [0u32; 3];
                for (o, &index) in out.iter_mut().zip(tri) {
                    if index < 0 || index as usize >= num_verts {
                        return Err(self.bad_index("triangle vertex", index as i64, num_verts));
                    }
                    *o = index as u32;
                }
                Ok(SrfTriangle::new(out))
            })
            .collect()
    }

    fn parse_face(&mut self, ds: &DSurface, verts: &[DrawVert], indexes: &[i32]) -> Result<MSurface, BspError> {
        let fog_index = self.fog_index(ds.fog_num)?;
        let mut shader = self.shader_for(ds.shader_num)?;

        let mut src = self.range("vertex", verts, ds.first_vert, ds.num_verts)?;
        let max = self.config.world.max_face_points;
        if src.len() > max {
            warn!("MAX_FACE_POINTS exceeded: {}", src.len());
            src = &src[..max];
            shader = self.shaders.default_shader();
        }

        let mut face_verts: Vec<SrfVert> = src.iter().map(|dv| self.copy_vert(dv)).collect();
        let mut triangles = self.triangles(ds, indexes, face_verts.len())?;

        calc_surface_triangle_neighbors(&mut triangles);
        calc_surface_triangle_planes(&mut triangles, &face_verts);

        // the plane comes from the lightmap vectors
        let normal = ds.lightmap_vecs[2];
        let dist = face_verts.first().map_or(0.0, |v| dot_product(&v.xyz, &normal));

        calc_tangent_spaces(&mut face_verts, &triangles, true);

        Ok(MSurface {
            shader,
            fog_index,
            data: SurfaceData::Face(SurfaceFace {
                plane: CPlane::new(normal, dist),
                bounds: mesh_bounds(&face_verts),
                verts: face_verts,
                triangles,
            }),
        })
    }

    fn parse_mesh(&mut self, ds: &DSurface, verts: &[DrawVert]) -> Result<MSurface, BspError> {
        let fog_index = self.fog_index(ds.fog_num)?;
        let shader = self.shader_for(ds.shader_num)?;

        // nodraw patches are kept for collision only
        let nodraw = self.world.shaders[ds.shader_num as usize]
            .surface_flags
            .contains(SurfaceFlags::NODRAW);
        if nodraw {
            return Ok(MSurface {
                shader,
                fog_index,
                data: SurfaceData::Skip,
            });
        }

        let (width, height) = (ds.patch_width, ds.patch_height);
        let valid = |d: i32| d >= 3 && d % 2 == 1 && d as usize <= MAX_PATCH_SIZE;
        if !valid(width) || !valid(height) || width * height > ds.num_verts {
            return Err(self.bad_index("patch dimensions", width as i64 * height as i64, ds.num_verts.max(0) as usize));
        }

        let src = self.range("vertex", verts, ds.first_vert, width * height)?;
        let points: Vec<SrfVert> = src.iter().map(|dv| self.copy_vert(dv)).collect();

        let mut grid = subdivide_patch_to_grid(width as usize, height as usize, &points, self.config.world.subdivisions);

        // every curve of one LOD group shares this origin and radius
        let [lo, hi, _] = ds.lightmap_vecs;
        let mut origin = [0.0; 3];
        for i in 0..3 {
            origin[i] = (lo[i] + hi[i]) * 0.5;
        }
        grid.lod_origin = origin;
        grid.lod_radius = vector_length(&vector_subtract(&lo, &origin));

        Ok(MSurface {
            shader,
            fog_index,
            data: SurfaceData::Grid(grid),
        })
    }

    fn parse_tri_surf(&mut self, ds: &DSurface, verts: &[DrawVert], indexes: &[i32]) -> Result<MSurface, BspError> {
        let fog_index = self.fog_index(ds.fog_num)?;
        let shader = self.shader_for(ds.shader_num)?;

        let src = self.range("vertex", verts, ds.first_vert, ds.num_verts)?;
        let mut tri_verts: Vec<SrfVert> = src.iter().map(|dv| self.copy_vert(dv)).collect();
        let mut triangles = self.triangles(ds, indexes, tri_verts.len())?;

        // bounds over referenced verts only
        let mut bounds = [[0.0f32; 3]; 2];
        {
            let [mins, maxs] = &mut bounds;
            clear_bounds(mins, maxs);
            for tri in &triangles {
                for &i in &tri.indexes {
                    add_point_to_bounds(&tri_verts[i as usize].xyz, mins, maxs);
                }
            }
        }

        calc_surface_triangle_neighbors(&mut triangles);
        calc_surface_triangle_planes(&mut triangles, &tri_verts);
        calc_tangent_spaces(&mut tri_verts, &triangles, true);
        smooth_shared_normals(&mut tri_verts);

        Ok(MSurface {
            shader,
            fog_index,
            data: SurfaceData::Triangles(SurfaceTriangles {
                bounds,
                verts: tri_verts,
                triangles,
            }),
        })
    }

    fn parse_flare(&mut self, ds: &DSurface) -> Result<MSurface, BspError> {
        let fog_index = self.fog_index(ds.fog_num)?;
        let shader = self.shader_for(ds.shader_num)?;

        Ok(MSurface {
            shader,
            fog_index,
            data: SurfaceData::Flare(SurfaceFlare {
                origin: ds.lightmap_origin,
                color: ds.lightmap_vecs[0],
                normal: ds.lightmap_vecs[2],
            }),
        })
    }

    fn load_surfaces(&mut self, file: &BspFile) -> Result<(), BspError> {
        info!("...loading surfaces");

        let in_surfaces: Vec<DSurface> = file.records(LUMP_SURFACES)?;
        let verts: Vec<DrawVert> = file.records(LUMP_DRAWVERTS)?;
        let indexes: Vec<i32> = file.records(LUMP_DRAWINDEXES)?;

        let (mut num_faces, mut num_meshes, mut num_tri_surfs, mut num_flares) = (0, 0, 0, 0);
        let mut surfaces = Vec::with_capacity(in_surfaces.len());

        for (i, ds) in in_surfaces.iter().enumerate() {
            let surface = match MapSurfaceType::from_i32(ds.surface_type) {
                Some(MapSurfaceType::Patch) => {
                    num_meshes += 1;
                    self.parse_mesh(ds, &verts)?
                }
                Some(MapSurfaceType::TriangleSoup) => {
                    num_tri_surfs += 1;
                    self.parse_tri_surf(ds, &verts, &indexes)?
                }
                Some(MapSurfaceType::Planar) => {
                    num_faces += 1;
                    self.parse_face(ds, &verts, &indexes)?
                }
                Some(MapSurfaceType::Flare) => {
                    num_flares += 1;
                    self.parse_flare(ds)?
                }
                Some(MapSurfaceType::Bad) | None => {
                    return Err(BspError::BadSurfaceType {
                        name: self.world.name.clone(),
                        surface: i,
                        surface_type: ds.surface_type,
                    });
                }
            };
            surfaces.push(surface);
        }

        info!(
            "...loaded {} faces, {} meshes, {} trisurfs, {} flares",
            num_faces, num_meshes, num_tri_surfs, num_flares
        );

        if self.config.world.stitch_curves {
            stitch_all_patches(&mut surfaces);
        }
        fix_shared_vertex_lod_error(&mut surfaces);

        self.world.surfaces = surfaces;
        Ok(())
    }

    // ============================================================
    // Tree
    // ============================================================

    fn load_mark_surfaces(&mut self, file: &BspFile) -> Result<(), BspError> {
        info!("...loading mark surfaces");
        let marks: Vec<i32> = file.records(LUMP_LEAFSURFACES)?;
        let count = self.world.surfaces.len();
        self.world.mark_surfaces = marks
            .iter()
            .map(|&j| {
                if j < 0 || j as usize >= count {
                    Err(self.bad_index("mark surface", j as i64, count))
                } else {
                    Ok(SurfaceId(j as usize))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn load_nodes_and_leafs(&mut self, file: &BspFile) -> Result<(), BspError> {
        info!("...loading nodes and leaves");

        let in_nodes: Vec<DNode> = file.records(LUMP_NODES)?;
        let in_leafs: Vec<DLeaf> = file.records(LUMP_LEAFS)?;
        let num_nodes = in_nodes.len();
        let num_leafs = in_leafs.len();

        let to_vec3 = |v: [i32; 3]| -> Vec3 { [v[0] as f32, v[1] as f32, v[2] as f32] };

        let mut nodes = Vec::with_capacity(num_nodes + num_leafs);
        for n in &in_nodes {
            self.plane(n.plane_num)?;

            let mut children = [NodeId(0); 2];
            for (child, &p) in children.iter_mut().zip(&n.children) {
                *child = if p >= 0 {
                    if p as usize >= num_nodes {
                        return Err(self.bad_index("node child", p as i64, num_nodes));
                    }
                    NodeId(p as usize)
                } else {
                    let leaf = (-1 - p as i64) as usize;
                    if leaf >= num_leafs {
                        return Err(self.bad_index("leaf child", leaf as i64, num_leafs));
                    }
                    NodeId(num_nodes + leaf)
                };
            }

            nodes.push(MNode {
                mins: to_vec3(n.mins),
                maxs: to_vec3(n.maxs),
                parent: None,
                kind: NodeKind::Decision {
                    plane: n.plane_num as usize,
                    children,
                },
            });
        }

        for l in &in_leafs {
            self.range("leaf surface", &self.world.mark_surfaces, l.first_leaf_surface, l.num_leaf_surfaces)?;

            if l.cluster >= 0 && l.cluster as usize >= self.world.num_clusters {
                self.world.num_clusters = l.cluster as usize + 1;
            }

            nodes.push(MNode {
                mins: to_vec3(l.mins),
                maxs: to_vec3(l.maxs),
                parent: None,
                kind: NodeKind::Leaf(MLeaf {
                    cluster: l.cluster,
                    area: l.area,
                    first_mark_surface: l.first_leaf_surface as usize,
                    num_mark_surfaces: l.num_leaf_surfaces as usize,
                }),
            });
        }

        self.set_parents(&mut nodes)?;

        self.world.nodes = nodes;
        self.world.num_decision_nodes = num_nodes;
        Ok(())
    }

    /// Chains every node to its parent. A node reachable twice means the
    /// file doesn't describe a tree.
    fn set_parents(&self, nodes: &mut [MNode]) -> Result<(), BspError> {
        if nodes.is_empty() {
            return Ok(());
        }

        let mut seen = vec![false; nodes.len()];
        let mut stack = vec![(NodeId(0), None)];
        while let Some((id, parent)) = stack.pop() {
            if seen[id.0] {
                return Err(self.bad_index("node child", id.0 as i64, nodes.len()));
            }
            seen[id.0] = true;
            nodes[id.0].parent = parent;
            if let NodeKind::Decision { children, .. } = nodes[id.0].kind {
                stack.push((children[1], Some(id)));
                stack.push((children[0], Some(id)));
            }
        }
        Ok(())
    }

    fn load_submodels(&mut self, file: &BspFile) -> Result<(), BspError> {
        info!("...loading submodels");
        let models: Vec<DModel> = file.records(LUMP_MODELS)?;
        let count = self.world.surfaces.len();

        self.world.bmodels = models
            .iter()
            .map(|m| {
                let end = m.first_surface as i64 + m.num_surfaces as i64;
                if m.first_surface < 0 || m.num_surfaces < 0 || end > count as i64 {
                    return Err(self.bad_index("model surface", end, count));
                }
                Ok(BModel {
                    bounds: [m.mins, m.maxs],
                    first_surface: m.first_surface as usize,
                    num_surfaces: m.num_surfaces as usize,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    // ============================================================
    // Visibility and light grid
    // ============================================================

    fn load_visibility(&mut self, file: &BspFile) {
        info!("...loading visibility");

        let len = (self.world.num_clusters + 63) & !63;
        self.world.novis = vec![0xff; len];
        self.world.vis = None;

        let bytes = file.lump_bytes(LUMP_VISIBILITY);
        if bytes.is_empty() {
            return;
        }
        if bytes.len() < 8 {
            warn!("visibility lump too short ({} bytes), everything is visible", bytes.len());
            return;
        }

        let r = RecordReader::new(&bytes[..8], file.order());
        let (num_clusters, cluster_bytes) = (r.long(0), r.long(4));
        if num_clusters < 0 || cluster_bytes < 0 {
            warn!("bad visibility header ({} clusters, {} bytes each)", num_clusters, cluster_bytes);
            return;
        }

        let (num_clusters, cluster_bytes) = (num_clusters as usize, cluster_bytes as usize);
        let data = &bytes[8..];
        let needed = num_clusters * cluster_bytes;
        if data.len() < needed {
            warn!("visibility data truncated ({} < {} bytes), everything is visible", data.len(), needed);
            return;
        }

        self.world.num_clusters = num_clusters;
        self.world.cluster_bytes = cluster_bytes;
        if self.world.novis.len() < cluster_bytes {
            self.world.novis.resize(cluster_bytes, 0xff);
        }
        self.world.vis = Some(data.to_vec());
    }

    fn load_light_grid(&mut self, file: &BspFile) {
        info!("...loading light grid");
        self.world.light_grid = None;

        let Some(model) = self.world.bmodels.first() else {
            warn!("no world model, light grid not loaded");
            return;
        };
        let size = self.world.light_grid_size;
        if size.iter().any(|&s| s <= 0.0) {
            warn!("bad light grid size {:?}", size);
            return;
        }

        let mut origin = [0.0f32; 3];
        let mut inverse_size = [0.0f32; 3];
        let mut bounds = [0i32; 3];
        for i in 0..3 {
            origin[i] = size[i] * (model.bounds[0][i] / size[i]).ceil();
            let maxs = size[i] * (model.bounds[1][i] / size[i]).floor();
            bounds[i] = (((maxs - origin[i]) / size[i]) as i32).saturating_add(1);
            inverse_size[i] = 1.0 / size[i];
        }

        let expected = bounds
            .iter()
            .try_fold(1usize, |acc, &b| acc.checked_mul(b.max(0) as usize))
            .and_then(|points| points.checked_mul(LIGHTGRID_POINT_SIZE));
        let Some(expected) = expected else {
            warn!("light grid of {:?} points is too large", bounds);
            return;
        };
        let bytes = file.lump_bytes(LUMP_LIGHTGRID);
        if bytes.len() != expected {
            warn!(
                "light grid mismatch ({} bytes, expected {} for {:?} points)",
                bytes.len(),
                expected,
                bounds
            );
            return;
        }

        let shift = self.config.world.color_shift();
        let mut data = bytes.to_vec();
        for point in data.chunks_exact_mut(LIGHTGRID_POINT_SIZE) {
            // ambient then directed color
            for ofs in [0, 3] {
                let c = color_shift_lighting_bytes(shift, [point[ofs], point[ofs + 1], point[ofs + 2], 0]);
                point[ofs..ofs + 3].copy_from_slice(&c[..3]);
            }
        }

        self.world.light_grid = Some(LightGrid {
            size,
            inverse_size,
            origin,
            bounds,
            data,
        });
    }
}

// ============================================================
// Queries on a loaded world
// ============================================================

impl World {
    /// Leaf containing `p`, walking from the root.
    pub fn point_in_leaf(&self, p: &Vec3) -> Option<NodeId> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut id = NodeId(0);
        loop {
            match self.node(id).kind {
                NodeKind::Leaf(_) => return Some(id),
                NodeKind::Decision { plane, children } => {
                    let d = self.planes[plane].distance_to(p);
                    id = if d > 0.0 { children[0] } else { children[1] };
                }
            }
        }
    }

    /// Visibility row of a cluster; everything is visible for clusters
    /// outside the vis data.
    pub fn cluster_pvs(&self, cluster: i32) -> &[u8] {
        match &self.vis {
            Some(vis) if cluster >= 0 && (cluster as usize) < self.num_clusters => {
                let start = cluster as usize * self.cluster_bytes;
                &vis[start..start + self.cluster_bytes]
            }
            _ => &self.novis,
        }
    }

    /// Centre of a light grid cell's lower corner, for debugging output.
    pub fn light_grid_point(&self, x: i32, y: i32, z: i32) -> Option<Vec3> {
        let grid = self.light_grid.as_ref()?;
        let ofs = [x, y, z];
        if (0..3).any(|i| ofs[i] < 0 || ofs[i] >= grid.bounds[i]) {
            return None;
        }
        let mut p = grid.origin;
        for i in 0..3 {
            p[i] += ofs[i] as f32 * grid.size[i];
        }
        Some(p)
    }
}

// ============================================================
// Published world
// ============================================================

/// Holds the current world. Readers get a shared handle; a load only
/// becomes visible once it has fully succeeded.
#[derive(Default)]
pub struct WorldSlot {
    current: RwLock<Option<Arc<World>>>,
}

impl WorldSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world(&self) -> Option<Arc<World>> {
        self.current.read().clone()
    }

    pub fn load(
        &self,
        name: &str,
        data: &[u8],
        config: &EngineConfig,
        shaders: &mut dyn ShaderLookup,
    ) -> Result<Arc<World>, BspError> {
        if let Some(world) = self.current.read().as_ref() {
            return Err(BspError::AlreadyLoaded(world.name.clone()));
        }

        let world = Arc::new(WorldLoader::new(config, shaders).load(name, data)?);

        let mut current = self.current.write();
        if let Some(existing) = current.as_ref() {
            return Err(BspError::AlreadyLoaded(existing.name.clone()));
        }
        *current = Some(Arc::clone(&world));
        Ok(world)
    }

    pub fn load_file(
        &self,
        path: &Path,
        config: &EngineConfig,
        shaders: &mut dyn ShaderLookup,
    ) -> Result<Arc<World>, BspError> {
        let name = path.display().to_string();
        let data = std::fs::read(path).map_err(|source| BspError::Io {
            name: name.clone(),
            source,
        })?;
        self.load(&name, &data, config, shaders)
    }

    /// Drops the current world; outstanding handles keep it alive until
    /// released.
    pub fn unload(&self) -> Option<Arc<World>> {
        self.current.write().take()
    }
}
