// curve.rs — Patch subdivision, grid construction and triangle helpers
//
// A patch is a grid of quadratic bezier control points. It is subdivided
// until every column and row stays within the configured error of the true
// curve, collinear lines are dropped, and the result becomes a SurfaceGrid
// with its own triangle list.

use std::collections::HashMap;

use xrq_common::q_shared::*;
use xrq_common::qfiles::MAX_GRID_SIZE;

use crate::model_types::{SrfTriangle, SrfVert, SurfaceGrid};

/// Error value marking a column or row that lies on a straight line.
pub const COLLAPSED_LOD_ERROR: f32 = 999.0;

/// Control point scratch grid, indexed [row][column].
#[derive(Clone)]
struct CtrlGrid {
    v: Vec<SrfVert>,
}

impl CtrlGrid {
    fn new() -> Self {
        Self {
            v: vec![SrfVert::default(); MAX_GRID_SIZE * MAX_GRID_SIZE],
        }
    }

    #[inline]
    fn get(&self, row: usize, column: usize) -> &SrfVert {
        &self.v[row * MAX_GRID_SIZE + column]
    }

    #[inline]
    fn get_mut(&mut self, row: usize, column: usize) -> &mut SrfVert {
        &mut self.v[row * MAX_GRID_SIZE + column]
    }

    #[inline]
    fn set(&mut self, row: usize, column: usize, vert: SrfVert) {
        self.v[row * MAX_GRID_SIZE + column] = vert;
    }

    fn transpose(&mut self, width: usize, height: usize) {
        let size = width.max(height);
        for i in 0..size {
            for j in i + 1..size {
                self.v.swap(i * MAX_GRID_SIZE + j, j * MAX_GRID_SIZE + i);
            }
        }
    }

    /// Mirrors every row left to right.
    fn invert(&mut self, width: usize, height: usize) {
        for i in 0..height {
            for j in 0..width / 2 {
                self.v.swap(i * MAX_GRID_SIZE + j, i * MAX_GRID_SIZE + width - 1 - j);
            }
        }
    }
}

type ErrorTable = [[f32; MAX_GRID_SIZE]; 2];

/// Midpoint of two verts, every attribute averaged.
pub fn lerp_vert(a: &SrfVert, b: &SrfVert) -> SrfVert {
    let mut out = SrfVert::default();
    for k in 0..3 {
        out.xyz[k] = 0.5 * (a.xyz[k] + b.xyz[k]);
        out.normal[k] = 0.5 * (a.normal[k] + b.normal[k]);
    }
    for k in 0..2 {
        out.st[k] = 0.5 * (a.st[k] + b.st[k]);
        out.lightmap[k] = 0.5 * (a.lightmap[k] + b.lightmap[k]);
    }
    for k in 0..4 {
        out.color[k] = ((a.color[k] as u16 + b.color[k] as u16) >> 1) as u8;
    }
    out
}

fn invert_error_table(table: &mut ErrorTable, width: usize, height: usize) {
    let copy = *table;
    table[1][..width].copy_from_slice(&copy[0][..width]);
    for i in 0..height {
        table[0][i] = copy[1][height - 1 - i];
    }
}

/// Moves the approximating midpoints onto the curve itself.
fn put_points_on_curve(ctrl: &mut CtrlGrid, width: usize, height: usize) {
    for i in 0..width {
        let mut j = 1;
        while j < height {
            let prev = lerp_vert(ctrl.get(j, i), ctrl.get(j + 1, i));
            let next = lerp_vert(ctrl.get(j, i), ctrl.get(j - 1, i));
            ctrl.set(j, i, lerp_vert(&prev, &next));
            j += 2;
        }
    }
    for j in 0..height {
        let mut i = 1;
        while i < width {
            let prev = lerp_vert(ctrl.get(j, i), ctrl.get(j, i + 1));
            let next = lerp_vert(ctrl.get(j, i), ctrl.get(j, i - 1));
            ctrl.set(j, i, lerp_vert(&prev, &next));
            i += 2;
        }
    }
}

const NEIGHBORS: [[isize; 2]; 8] = [[0, 1], [1, 1], [1, 0], [1, -1], [0, -1], [-1, -1], [-1, 0], [-1, 1]];

/// Smooth normals from the ring of up to eight neighbours around each point.
fn make_mesh_normals(ctrl: &mut CtrlGrid, width: usize, height: usize) {
    for i in 0..width {
        for j in 0..height {
            let base = ctrl.get(j, i).xyz;
            let mut around = [[0.0f32; 3]; 8];
            let mut good = [false; 8];

            for (k, offset) in NEIGHBORS.iter().enumerate() {
                for dist in 1..=3isize {
                    let x = i as isize + offset[0] * dist;
                    let y = j as isize + offset[1] * dist;
                    if x < 0 || x >= width as isize || y < 0 || y >= height as isize {
                        break;
                    }
                    let temp = vector_subtract(&ctrl.get(y as usize, x as usize).xyz, &base);
                    let (dir, len) = vector_normalize2(&temp);
                    if len == 0.0 {
                        // degenerate edge, get more dist
                        continue;
                    }
                    good[k] = true;
                    around[k] = dir;
                    break;
                }
            }

            let mut sum = [0.0f32; 3];
            for k in 0..8 {
                let k1 = (k + 1) & 7;
                if !good[k] || !good[k1] {
                    continue;
                }
                let (normal, len) = vector_normalize2(&cross_product(&around[k1], &around[k]));
                if len == 0.0 {
                    continue;
                }
                sum = vector_add(&sum, &normal);
            }
            vector_normalize(&mut sum);
            ctrl.get_mut(j, i).normal = sum;
        }
    }
}

fn grid_from_ctrl(ctrl: &CtrlGrid, width: usize, height: usize, error_table: &ErrorTable) -> SurfaceGrid {
    let mut verts = Vec::with_capacity(width * height);
    for j in 0..height {
        for i in 0..width {
            verts.push(*ctrl.get(j, i));
        }
    }
    create_surface_grid_mesh(
        width,
        height,
        verts,
        error_table[0][..width].to_vec(),
        error_table[1][..height].to_vec(),
    )
}

/// Builds a grid surface from a row-major vertex array: bounds, triangles,
/// neighbours, planes and tangent vectors. Normals are taken as given.
pub fn create_surface_grid_mesh(
    width: usize,
    height: usize,
    verts: Vec<SrfVert>,
    width_lod_error: Vec<f32>,
    height_lod_error: Vec<f32>,
) -> SurfaceGrid {
    let mesh_bounds = mesh_bounds(&verts);
    let local_origin = vector_scale(&vector_add(&mesh_bounds[0], &mesh_bounds[1]), 0.5);
    let mesh_radius = vector_length(&vector_subtract(&mesh_bounds[0], &local_origin));

    let mut triangles = Vec::with_capacity(2 * width.saturating_sub(1) * height.saturating_sub(1));
    for i in 0..height.saturating_sub(1) {
        for j in 0..width.saturating_sub(1) {
            let v1 = (i * width + j + 1) as u32;
            let v2 = v1 - 1;
            let v3 = v2 + width as u32;
            let v4 = v3 + 1;

            triangles.push(SrfTriangle::new([v2, v3, v1]));
            triangles.push(SrfTriangle::new([v1, v3, v4]));
        }
    }

    let mut grid = SurfaceGrid {
        width,
        height,
        verts,
        triangles,
        width_lod_error,
        height_lod_error,
        lod_origin: local_origin,
        lod_radius: mesh_radius,
        mesh_bounds,
        local_origin,
        mesh_radius,
        lod_fixed: 0,
        lod_stitched: false,
    };

    calc_surface_triangle_neighbors(&mut grid.triangles);
    calc_surface_triangle_planes(&mut grid.triangles, &grid.verts);
    calc_tangent_spaces(&mut grid.verts, &grid.triangles, false);
    grid
}

/// Tessellates a `width` x `height` patch of control points.
///
/// Both dimensions must be odd and at least 3, and `points` must hold
/// `width * height` verts; the loader checks this before calling.
pub fn subdivide_patch_to_grid(width: usize, height: usize, points: &[SrfVert], subdivisions: f32) -> SurfaceGrid {
    let mut ctrl = CtrlGrid::new();
    let mut error_table: ErrorTable = [[0.0; MAX_GRID_SIZE]; 2];
    let (mut width, mut height) = (width, height);

    for i in 0..width {
        for j in 0..height {
            ctrl.set(j, i, points[j * width + i]);
        }
    }

    for dir in 0..2 {
        error_table[dir] = [0.0; MAX_GRID_SIZE];

        // horizontal subdivisions
        let mut j = 0;
        while j + 2 < width {
            // check subdivided midpoints against control points
            let mut max_len = 0.0f32;
            for i in 0..height {
                let a = ctrl.get(i, j).xyz;
                let b = ctrl.get(i, j + 1).xyz;
                let c = ctrl.get(i, j + 2).xyz;

                // the point on the curve
                let mut mid = [0.0f32; 3];
                for l in 0..3 {
                    mid[l] = (a[l] + b[l] * 2.0 + c[l]) * 0.25;
                }

                // how far off the line it is
                let mid = vector_subtract(&mid, &a);
                let (line, _) = vector_normalize2(&vector_subtract(&c, &a));
                let d = dot_product(&mid, &line);
                let off = vector_subtract(&mid, &vector_scale(&line, d));
                let len = vector_length_squared(&off);
                if len > max_len {
                    max_len = len;
                }
            }
            let max_len = max_len.sqrt();

            // all the points are on the lines, remove the entire column
            if max_len < 0.1 {
                error_table[dir][j + 1] = COLLAPSED_LOD_ERROR;
                j += 2;
                continue;
            }

            // can't subdivide any more, or didn't need to
            if width + 2 > MAX_GRID_SIZE || max_len <= subdivisions {
                error_table[dir][j + 1] = 1.0 / max_len;
                j += 2;
                continue;
            }

            error_table[dir][j + 2] = 1.0 / max_len;

            // insert two columns and replace the peak
            width += 2;
            for i in 0..height {
                let prev = lerp_vert(ctrl.get(i, j), ctrl.get(i, j + 1));
                let next = lerp_vert(ctrl.get(i, j + 1), ctrl.get(i, j + 2));
                let mid = lerp_vert(&prev, &next);

                let mut k = width - 1;
                while k > j + 3 {
                    let moved = *ctrl.get(i, k - 2);
                    ctrl.set(i, k, moved);
                    k -= 1;
                }
                ctrl.set(i, j + 1, prev);
                ctrl.set(i, j + 2, mid);
                ctrl.set(i, j + 3, next);
            }
            // recheck this set again, it may need more subdivision
        }

        ctrl.transpose(width, height);
        std::mem::swap(&mut width, &mut height);
    }

    put_points_on_curve(&mut ctrl, width, height);

    // cull out any rows or columns that are colinear
    let mut i = 1;
    while i + 1 < width {
        if error_table[0][i] == COLLAPSED_LOD_ERROR {
            for j in i + 1..width {
                for k in 0..height {
                    let moved = *ctrl.get(k, j);
                    ctrl.set(k, j - 1, moved);
                }
                error_table[0][j - 1] = error_table[0][j];
            }
            width -= 1;
        }
        i += 1;
    }
    let mut i = 1;
    while i + 1 < height {
        if error_table[1][i] == COLLAPSED_LOD_ERROR {
            for j in i + 1..height {
                for k in 0..width {
                    let moved = *ctrl.get(j, k);
                    ctrl.set(j - 1, k, moved);
                }
                error_table[1][j - 1] = error_table[1][j];
            }
            height -= 1;
        }
        i += 1;
    }

    // flip for longest tristrips
    if height > width {
        ctrl.transpose(width, height);
        invert_error_table(&mut error_table, width, height);
        std::mem::swap(&mut width, &mut height);
        ctrl.invert(width, height);
    }

    make_mesh_normals(&mut ctrl, width, height);
    grid_from_ctrl(&ctrl, width, height, &error_table)
}

/// Returns a copy of `grid` with a column inserted before `column`. The new
/// column is interpolated from its neighbours except on `row`, which gets
/// `point`. None when the grid is already at its maximum width.
pub fn grid_insert_column(grid: &SurfaceGrid, column: usize, row: usize, point: &Vec3, lod_error: f32) -> Option<SurfaceGrid> {
    let width = grid.width + 1;
    let height = grid.height;
    if width > MAX_GRID_SIZE || column == 0 || column >= width - 1 {
        return None;
    }

    let mut ctrl = CtrlGrid::new();
    let mut error_table: ErrorTable = [[0.0; MAX_GRID_SIZE]; 2];

    let mut old = 0;
    for i in 0..width {
        if i == column {
            for j in 0..height {
                let mut v = lerp_vert(grid.vert(j, i - 1), grid.vert(j, i));
                if j == row {
                    v.xyz = *point;
                }
                ctrl.set(j, i, v);
            }
            error_table[0][i] = lod_error;
            continue;
        }
        error_table[0][i] = grid.width_lod_error[old];
        for j in 0..height {
            ctrl.set(j, i, *grid.vert(j, old));
        }
        old += 1;
    }
    error_table[1][..height].copy_from_slice(&grid.height_lod_error[..height]);

    make_mesh_normals(&mut ctrl, width, height);

    let mut out = grid_from_ctrl(&ctrl, width, height, &error_table);
    out.lod_origin = grid.lod_origin;
    out.lod_radius = grid.lod_radius;
    out.lod_fixed = grid.lod_fixed;
    Some(out)
}

/// Row counterpart of [`grid_insert_column`].
pub fn grid_insert_row(grid: &SurfaceGrid, row: usize, column: usize, point: &Vec3, lod_error: f32) -> Option<SurfaceGrid> {
    let width = grid.width;
    let height = grid.height + 1;
    if height > MAX_GRID_SIZE || row == 0 || row >= height - 1 {
        return None;
    }

    let mut ctrl = CtrlGrid::new();
    let mut error_table: ErrorTable = [[0.0; MAX_GRID_SIZE]; 2];

    let mut old = 0;
    for i in 0..height {
        if i == row {
            for j in 0..width {
                let mut v = lerp_vert(grid.vert(i - 1, j), grid.vert(i, j));
                if j == column {
                    v.xyz = *point;
                }
                ctrl.set(i, j, v);
            }
            error_table[1][i] = lod_error;
            continue;
        }
        error_table[1][i] = grid.height_lod_error[old];
        for j in 0..width {
            ctrl.set(i, j, *grid.vert(old, j));
        }
        old += 1;
    }
    error_table[0][..width].copy_from_slice(&grid.width_lod_error[..width]);

    make_mesh_normals(&mut ctrl, width, height);

    let mut out = grid_from_ctrl(&ctrl, width, height, &error_table);
    out.lod_origin = grid.lod_origin;
    out.lod_radius = grid.lod_radius;
    out.lod_fixed = grid.lod_fixed;
    Some(out)
}

// ============================================================
// Triangle helpers shared by every mesh surface
// ============================================================

pub fn mesh_bounds(verts: &[SrfVert]) -> [Vec3; 2] {
    let mut bounds = [[0.0f32; 3]; 2];
    let [mins, maxs] = &mut bounds;
    clear_bounds(mins, maxs);
    for v in verts {
        add_point_to_bounds(&v.xyz, mins, maxs);
    }
    bounds
}

/// Links each triangle edge to the triangle sharing it in reverse order.
pub fn calc_surface_triangle_neighbors(triangles: &mut [SrfTriangle]) {
    let mut edges: HashMap<(u32, u32), usize> = HashMap::with_capacity(triangles.len() * 3);
    for (i, tri) in triangles.iter().enumerate() {
        for k in 0..3 {
            edges.entry((tri.indexes[k], tri.indexes[(k + 1) % 3])).or_insert(i);
        }
    }

    for (i, tri) in triangles.iter_mut().enumerate() {
        for k in 0..3 {
            let reversed = (tri.indexes[(k + 1) % 3], tri.indexes[k]);
            tri.neighbors[k] = edges.get(&reversed).copied().filter(|&j| j != i);
        }
    }
}

pub fn calc_surface_triangle_planes(triangles: &mut [SrfTriangle], verts: &[SrfVert]) {
    for tri in triangles.iter_mut() {
        let [a, b, c] = tri.indexes.map(|i| verts[i as usize].xyz);
        match plane_from_points(&a, &b, &c) {
            Some(plane) => {
                tri.plane = plane.as_vec4();
                tri.degenerate = false;
            }
            None => {
                tri.plane = [0.0; 4];
                tri.degenerate = true;
            }
        }
    }
}

/// Tangent, binormal and face normal of one textured triangle.
pub fn calc_tangent_space(
    v0: &Vec3,
    v1: &Vec3,
    v2: &Vec3,
    t0: &Vec2,
    t1: &Vec2,
    t2: &Vec2,
) -> (Vec3, Vec3, Vec3) {
    let mut tangent = [0.0f32; 3];
    let mut binormal = [0.0f32; 3];

    for axis in 0..3 {
        let u = [v1[axis] - v0[axis], t1[0] - t0[0], t1[1] - t0[1]];
        let v = [v2[axis] - v0[axis], t2[0] - t0[0], t2[1] - t0[1]];
        let cp = cross_product(&u, &v);
        if cp[0].abs() > 10e-6 {
            tangent[axis] = -cp[1] / cp[0];
            binormal[axis] = -cp[2] / cp[0];
        }
    }
    vector_normalize(&mut tangent);
    vector_normalize(&mut binormal);

    let mut normal = cross_product(&vector_subtract(v2, v0), &vector_subtract(v1, v0));
    vector_normalize(&mut normal);

    (tangent, binormal, normal)
}

/// Accumulates per-triangle tangent spaces into the verts and renormalizes.
/// When `replace_normals` is false the existing normals are kept.
pub fn calc_tangent_spaces(verts: &mut [SrfVert], triangles: &[SrfTriangle], replace_normals: bool) {
    for v in verts.iter_mut() {
        v.tangent = [0.0; 3];
        v.binormal = [0.0; 3];
        if replace_normals {
            v.normal = [0.0; 3];
        }
    }

    for tri in triangles {
        let [i0, i1, i2] = tri.indexes.map(|i| i as usize);
        let (tangent, binormal, normal) = calc_tangent_space(
            &verts[i0].xyz,
            &verts[i1].xyz,
            &verts[i2].xyz,
            &verts[i0].st,
            &verts[i1].st,
            &verts[i2].st,
        );
        for i in [i0, i1, i2] {
            let v = &mut verts[i];
            v.tangent = vector_add(&v.tangent, &tangent);
            v.binormal = vector_add(&v.binormal, &binormal);
            if replace_normals {
                v.normal = vector_add(&v.normal, &normal);
            }
        }
    }

    for v in verts.iter_mut() {
        vector_normalize(&mut v.tangent);
        vector_normalize(&mut v.binormal);
        if replace_normals {
            vector_normalize(&mut v.normal);
        }
    }
}

/// Averages the normals of verts sharing a position so soups don't shade flat.
pub fn smooth_shared_normals(verts: &mut [SrfVert]) {
    let normals: Vec<Vec3> = verts.iter().map(|v| v.normal).collect();
    for i in 0..verts.len() {
        let mut sum = normals[i];
        for j in 0..verts.len() {
            if i != j && vector_compare(&verts[i].xyz, &verts[j].xyz) {
                sum = vector_add(&sum, &normals[j]);
            }
        }
        vector_normalize(&mut sum);
        verts[i].normal = sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn vert(x: f32, y: f32, z: f32) -> SrfVert {
        SrfVert {
            xyz: [x, y, z],
            st: [x / 64.0, y / 64.0],
            normal: [0.0, 0.0, 1.0],
            color: [255, 255, 255, 255],
            ..Default::default()
        }
    }

    /// Control points for a patch laid out on a regular xy lattice.
    fn patch(width: usize, height: usize, z: impl Fn(usize, usize) -> f32) -> Vec<SrfVert> {
        let mut points = Vec::new();
        for j in 0..height {
            for i in 0..width {
                points.push(vert(i as f32 * 8.0, j as f32 * 8.0, z(i, j)));
            }
        }
        points
    }

    #[test]
    fn test_lerp_vert() {
        let a = vert(0.0, 0.0, 0.0);
        let mut b = vert(10.0, 20.0, 30.0);
        b.color = [1, 3, 255, 0];
        let m = lerp_vert(&a, &b);
        assert_eq!(m.xyz, [5.0, 10.0, 15.0]);
        assert_eq!(m.color, [128, 129, 255, 127]);
    }

    #[test]
    fn test_flat_patch_collapses() {
        let points = patch(3, 3, |_, _| 0.0);
        let grid = subdivide_patch_to_grid(3, 3, &points, 4.0);
        assert_eq!((grid.width, grid.height), (2, 2));
        assert_eq!(grid.verts.len(), 4);
        assert_eq!(grid.triangles.len(), 2);
        assert_eq!(grid.vert(0, 0).xyz, [0.0, 0.0, 0.0]);
        assert_eq!(grid.vert(1, 1).xyz, [16.0, 16.0, 0.0]);
        assert_eq!(grid.mesh_bounds, [[0.0, 0.0, 0.0], [16.0, 16.0, 0.0]]);
        for v in &grid.verts {
            assert_abs_diff_eq!(v.normal[2].abs(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_curved_patch_subdivides() {
        // bulge in the middle column only
        let points = patch(3, 3, |i, _| if i == 1 { 32.0 } else { 0.0 });
        let grid = subdivide_patch_to_grid(3, 3, &points, 4.0);
        assert!(grid.width > 3);
        // straight along the other direction
        assert_eq!(grid.height, 2);
        assert_eq!(grid.verts.len(), grid.width * grid.height);
        assert_eq!(grid.triangles.len(), 2 * (grid.width - 1) * (grid.height - 1));
        // the curve apex is at a quarter of the control height
        let apex = grid.verts.iter().map(|v| v.xyz[2]).fold(0.0f32, f32::max);
        assert_abs_diff_eq!(apex, 16.0, epsilon = 1e-3);
        assert!(grid.width <= MAX_GRID_SIZE);
    }

    #[test]
    fn test_tall_patch_is_flipped() {
        let points = patch(3, 3, |_, j| if j == 1 { 32.0 } else { 0.0 });
        let grid = subdivide_patch_to_grid(3, 3, &points, 4.0);
        assert!(grid.width >= grid.height);
        assert_eq!(grid.width_lod_error.len(), grid.width);
        assert_eq!(grid.height_lod_error.len(), grid.height);
    }

    #[test]
    fn test_grid_triangles_are_linked() {
        let points = patch(3, 3, |_, _| 0.0);
        let grid = subdivide_patch_to_grid(3, 3, &points, 4.0);
        let t0 = &grid.triangles[0];
        let t1 = &grid.triangles[1];
        assert_eq!(t0.indexes, [0, 2, 1]);
        assert_eq!(t1.indexes, [1, 2, 3]);
        // the diagonal is shared
        assert_eq!(t0.neighbors, [None, Some(1), None]);
        assert_eq!(t1.neighbors, [Some(0), None, None]);
        assert!(!t0.degenerate);
    }

    #[test]
    fn test_insert_column() {
        let verts = vec![
            vert(0.0, 0.0, 0.0),
            vert(16.0, 0.0, 0.0),
            vert(0.0, 8.0, 0.0),
            vert(16.0, 8.0, 0.0),
        ];
        let mut grid = create_surface_grid_mesh(2, 2, verts, vec![0.5, 0.5], vec![0.25, 0.25]);
        grid.lod_radius = 42.0;

        let out = grid_insert_column(&grid, 1, 0, &[8.0, 1.0, 0.0], 0.75).unwrap();
        assert_eq!((out.width, out.height), (3, 2));
        assert_eq!(out.vert(0, 1).xyz, [8.0, 1.0, 0.0]);
        assert_eq!(out.vert(1, 1).xyz, [8.0, 8.0, 0.0]);
        assert_eq!(out.width_lod_error, vec![0.5, 0.75, 0.5]);
        assert_eq!(out.height_lod_error, vec![0.25, 0.25]);
        assert_eq!(out.lod_radius, 42.0);
        assert_eq!(out.triangles.len(), 4);

        assert!(grid_insert_column(&grid, 0, 0, &[0.0; 3], 0.0).is_none());
    }

    #[test]
    fn test_insert_row() {
        let verts = vec![
            vert(0.0, 0.0, 0.0),
            vert(16.0, 0.0, 0.0),
            vert(0.0, 8.0, 0.0),
            vert(16.0, 8.0, 0.0),
        ];
        let grid = create_surface_grid_mesh(2, 2, verts, vec![0.5, 0.5], vec![0.25, 0.25]);
        let out = grid_insert_row(&grid, 1, 1, &[16.0, 4.0, 2.0], 0.125).unwrap();
        assert_eq!((out.width, out.height), (2, 3));
        assert_eq!(out.vert(1, 0).xyz, [0.0, 4.0, 0.0]);
        assert_eq!(out.vert(1, 1).xyz, [16.0, 4.0, 2.0]);
        assert_eq!(out.height_lod_error, vec![0.25, 0.125, 0.25]);
    }

    #[test]
    fn test_neighbors_of_a_quad() {
        let mut tris = vec![SrfTriangle::new([0, 1, 2]), SrfTriangle::new([0, 2, 3])];
        calc_surface_triangle_neighbors(&mut tris);
        assert_eq!(tris[0].neighbors, [None, None, Some(1)]);
        assert_eq!(tris[1].neighbors, [Some(0), None, None]);
    }

    #[test]
    fn test_degenerate_triangle_plane() {
        let verts = vec![vert(0.0, 0.0, 0.0), vert(1.0, 0.0, 0.0), vert(2.0, 0.0, 0.0)];
        let mut tris = vec![SrfTriangle::new([0, 1, 2])];
        calc_surface_triangle_planes(&mut tris, &verts);
        assert!(tris[0].degenerate);
    }

    #[test]
    fn test_tangent_space_of_planar_triangle() {
        let (t, b, n) = calc_tangent_space(
            &[0.0, 0.0, 0.0],
            &[64.0, 0.0, 0.0],
            &[0.0, 64.0, 0.0],
            &[0.0, 0.0],
            &[1.0, 0.0],
            &[0.0, 1.0],
        );
        assert_abs_diff_eq!(t[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(b[1], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(n[2].abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_smooth_shared_normals() {
        let mut verts = vec![vert(0.0, 0.0, 0.0), vert(0.0, 0.0, 0.0), vert(5.0, 0.0, 0.0)];
        verts[0].normal = [1.0, 0.0, 0.0];
        verts[1].normal = [0.0, 1.0, 0.0];
        smooth_shared_normals(&mut verts);
        let s = std::f32::consts::FRAC_1_SQRT_2;
        assert_abs_diff_eq!(verts[0].normal[0], s, epsilon = 1e-5);
        assert_abs_diff_eq!(verts[1].normal[1], s, epsilon = 1e-5);
        assert_eq!(verts[2].normal, [0.0, 0.0, 1.0]);
    }
}
