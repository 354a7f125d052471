// stitch.rs — LOD crack repair between neighbouring patches
//
// Patches of one LOD group (same lod origin and radius) are tessellated
// independently, so a shared border can end up with a vertex on one side
// and none on the other. Stitching inserts the missing column or row into
// the coarser grid until no more cracks are found. Afterwards the LOD
// errors of shared border verts are made equal so both sides collapse
// together at lower detail.

use tracing::info;
use xrq_common::q_shared::Vec3;
use xrq_common::qfiles::MAX_GRID_SIZE;

use crate::curve::{grid_insert_column, grid_insert_row};
use crate::model_types::{MSurface, SurfaceGrid};

/// One of the four border lines of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Row(usize),
    Column(usize),
}

impl Edge {
    fn rows(grid: &SurfaceGrid) -> [Edge; 2] {
        [Edge::Row(0), Edge::Row(grid.height - 1)]
    }

    fn columns(grid: &SurfaceGrid) -> [Edge; 2] {
        [Edge::Column(0), Edge::Column(grid.width - 1)]
    }

    fn len(self, grid: &SurfaceGrid) -> usize {
        match self {
            Edge::Row(_) => grid.width,
            Edge::Column(_) => grid.height,
        }
    }

    fn point(self, grid: &SurfaceGrid, k: usize) -> &Vec3 {
        match self {
            Edge::Row(r) => &grid.vert(r, k).xyz,
            Edge::Column(c) => &grid.vert(k, c).xyz,
        }
    }

    fn lod_error(self, grid: &SurfaceGrid, k: usize) -> f32 {
        match self {
            Edge::Row(_) => grid.width_lod_error[k],
            Edge::Column(_) => grid.height_lod_error[k],
        }
    }

    fn set_lod_error(self, grid: &mut SurfaceGrid, k: usize, error: f32) {
        match self {
            Edge::Row(_) => grid.width_lod_error[k] = error,
            Edge::Column(_) => grid.height_lod_error[k] = error,
        }
    }

    /// True if two inner points of this edge were merged together.
    fn has_merged_points(self, grid: &SurfaceGrid) -> bool {
        let len = self.len(grid);
        for i in 1..len.saturating_sub(1) {
            for j in i + 1..len - 1 {
                if points_match(self.point(grid, i), self.point(grid, j)) {
                    return true;
                }
            }
        }
        false
    }
}

#[inline]
fn points_match(a: &Vec3, b: &Vec3) -> bool {
    (0..3).all(|i| (a[i] - b[i]).abs() <= 0.1)
}

#[inline]
fn points_coincide(a: &Vec3, b: &Vec3) -> bool {
    (0..3).all(|i| (a[i] - b[i]).abs() < 0.01)
}

/// Edges of `grid` in the order they are scanned: both rows, then both columns.
fn all_edges(grid: &SurfaceGrid) -> [Edge; 4] {
    let [r0, r1] = Edge::rows(grid);
    let [c0, c1] = Edge::columns(grid);
    [r0, r1, c0, c1]
}

/// Looks for one spot where a border of `grid1` has a vertex that the
/// matching border of `grid2` lacks and returns `grid2` with that vertex
/// inserted.
pub fn stitch_patches(grid1: &SurfaceGrid, grid2: &SurfaceGrid) -> Option<SurfaceGrid> {
    for backward in [false, true] {
        for edge1 in all_edges(grid1) {
            if edge1.has_merged_points(grid1) {
                continue;
            }
            let len1 = edge1.len(grid1);

            let ks: Vec<usize> = if backward {
                (2..len1).rev().step_by(2).collect()
            } else {
                (0..len1.saturating_sub(2)).step_by(2).collect()
            };

            for k in ks {
                let (far, mid, error) = if backward {
                    (k - 2, k - 1, edge1.lod_error(grid1, k - 1))
                } else {
                    (k + 2, k + 1, edge1.lod_error(grid1, k + 1))
                };

                for edge2 in all_edges(grid2) {
                    let full = match edge2 {
                        Edge::Row(_) => grid2.width >= MAX_GRID_SIZE,
                        Edge::Column(_) => grid2.height >= MAX_GRID_SIZE,
                    };
                    if full {
                        continue;
                    }

                    for l in 0..edge2.len(grid2) - 1 {
                        if !points_match(edge1.point(grid1, k), edge2.point(grid2, l)) {
                            continue;
                        }
                        if !points_match(edge1.point(grid1, far), edge2.point(grid2, l + 1)) {
                            continue;
                        }
                        if points_coincide(edge2.point(grid2, l), edge2.point(grid2, l + 1)) {
                            continue;
                        }

                        let point = *edge1.point(grid1, mid);
                        let stitched = match edge2 {
                            Edge::Row(row) => grid_insert_column(grid2, l + 1, row, &point, error),
                            Edge::Column(column) => grid_insert_row(grid2, l + 1, column, &point, error),
                        };
                        if let Some(mut grid) = stitched {
                            grid.lod_stitched = false;
                            return Some(grid);
                        }
                    }
                }
            }
        }
    }
    None
}

/// Borrows two distinct grid surfaces, the first shared and the second mutable.
fn grid_pair(surfaces: &mut [MSurface], a: usize, b: usize) -> Option<(&SurfaceGrid, &mut SurfaceGrid)> {
    if a == b || a >= surfaces.len() || b >= surfaces.len() {
        return None;
    }
    let (first, second) = if a < b {
        let (lo, hi) = surfaces.split_at_mut(b);
        (&lo[a], &mut hi[0])
    } else {
        let (lo, hi) = surfaces.split_at_mut(a);
        (&hi[0], &mut lo[b])
    };
    Some((first.data.as_grid()?, second.data.as_grid_mut()?))
}

/// Stitches every grid of `grid1`'s LOD group against it. Returns the
/// number of vertices inserted.
pub fn try_stitching_patch(surfaces: &mut [MSurface], grid1: usize) -> usize {
    let mut stitches = 0;
    for j in 0..surfaces.len() {
        loop {
            let Some((g1, g2)) = grid_pair(surfaces, grid1, j) else {
                break;
            };
            if !g1.same_lod_group(g2) {
                break;
            }
            match stitch_patches(g1, g2) {
                Some(stitched) => {
                    *g2 = stitched;
                    stitches += 1;
                }
                None => break,
            }
        }
    }
    stitches
}

/// Repeats stitching until every grid has been checked since its last change.
pub fn stitch_all_patches(surfaces: &mut [MSurface]) -> usize {
    info!("...stitching LoD cracks");

    let mut stitches = 0;
    loop {
        let mut stitched = false;
        for i in 0..surfaces.len() {
            match surfaces[i].data.as_grid_mut() {
                Some(grid) if !grid.lod_stitched => grid.lod_stitched = true,
                _ => continue,
            }
            stitched = true;
            stitches += try_stitching_patch(surfaces, i);
        }
        if !stitched {
            break;
        }
    }

    info!("stitched {} LoD cracks", stitches);
    stitches
}

fn fix_shared_vertex_lod_error_r(surfaces: &mut [MSurface], start: usize, grid1: usize) {
    for j in start..surfaces.len() {
        let touch = {
            let Some((g1, g2)) = grid_pair(surfaces, grid1, j) else {
                continue;
            };
            // already fixed
            if g2.lod_fixed == 2 {
                continue;
            }
            if !g1.same_lod_group(g2) {
                continue;
            }

            let mut touch = false;
            for edge1 in all_edges(g1) {
                if edge1.has_merged_points(g1) {
                    continue;
                }
                for k in 1..edge1.len(g1).saturating_sub(1) {
                    for edge2 in all_edges(g2) {
                        if edge2.has_merged_points(g2) {
                            continue;
                        }
                        for l in 1..edge2.len(g2).saturating_sub(1) {
                            if !points_match(edge1.point(g1, k), edge2.point(g2, l)) {
                                continue;
                            }
                            // the points are equal and should have the same lod error
                            edge2.set_lod_error(g2, l, edge1.lod_error(g1, k));
                            touch = true;
                        }
                    }
                }
            }
            if touch {
                g2.lod_fixed = 2;
            }
            touch
        };

        if touch {
            fix_shared_vertex_lod_error_r(surfaces, start, j);
        }
    }
}

/// Shares LOD errors across the border verts of each LOD group. Assumes
/// the group was stitched for the highest detail first.
pub fn fix_shared_vertex_lod_error(surfaces: &mut [MSurface]) {
    for i in 0..surfaces.len() {
        match surfaces[i].data.as_grid_mut() {
            Some(grid) if grid.lod_fixed == 0 => grid.lod_fixed = 2,
            _ => continue,
        }
        fix_shared_vertex_lod_error_r(surfaces, i + 1, i);
    }
}
