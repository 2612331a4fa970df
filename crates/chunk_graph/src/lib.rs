//! chunk_graph: chunk adjacency across division planes.
//!
//! Scope
//! - `DivisionPlaneRect`: a finite rectangle on a slicing plane separating
//!   two chunks, plus `build_division_planes_from_grid` to derive one per
//!   internal grid face.
//! - `boundary_triangles_on_plane` / `nodes_connected_by_plane`: project
//!   chunk boundary triangles into the plane's UV frame and decide whether
//!   two chunks still touch through 2D triangle intersection.
//! - `ChunkCellNode` / `ChunkCellCache`: the graph data model the host
//!   rebuilds as meshes change.
//!
//! All geometric predicates are epsilon-tolerant via `GraphTolerances`.

#![forbid(unsafe_code)]

mod intersect;

use cell_grid::Aabb;
use glam::{UVec3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

pub use intersect::{point_in_triangle, segments_intersect, triangles_intersect};

/// Tolerances for plane membership and rectangle overlap. `plane` bounds the
/// distance a vertex may sit off the slicing plane; `rect` pads the rect
/// overlap test and feeds the 2D intersection epsilon.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphTolerances {
    pub plane: f32,
    pub rect: f32,
}

impl Default for GraphTolerances {
    fn default() -> Self {
        Self {
            plane: 0.1,
            rect: 0.1,
        }
    }
}

/// A finite rectangle on a chunk-slicing plane. `axis_u`/`axis_v` span the
/// rect in-plane; `chunk_a`/`chunk_b` are the chunks on either side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DivisionPlaneRect {
    pub plane_origin: Vec3,
    pub plane_normal: Vec3,
    pub rect_center: Vec3,
    pub axis_u: Vec3,
    pub axis_v: Vec3,
    pub half_extents: Vec2,
    pub chunk_a: u32,
    pub chunk_b: u32,
}

/// 2D axis-aligned rectangle in a plane's UV frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect2 {
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (&first, rest) = points.split_first()?;
        let mut r = Rect2 {
            min: first,
            max: first,
        };
        for &p in rest {
            r.min = r.min.min(p);
            r.max = r.max.max(p);
        }
        Some(r)
    }

    pub fn merge(&self, other: &Rect2) -> Rect2 {
        Rect2 {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn overlaps(&self, other: &Rect2) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// A chunk boundary triangle projected into a plane's UV frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryTriangle2D {
    pub points: [Vec2; 3],
    pub bounds: Rect2,
}

/// Non-owning handle into the host's triangle storage.
pub trait TriangleSource {
    /// World- or chunk-local positions of the triangle's three vertices, or
    /// `None` for a stale/removed id.
    fn triangle(&self, id: u32) -> Option<[Vec3; 3]>;
}

impl TriangleSource for [[Vec3; 3]] {
    fn triangle(&self, id: u32) -> Option<[Vec3; 3]> {
        self.get(id as usize).copied()
    }
}

/// One division-plane rect per internal grid face whose two sides are both
/// assigned to a chunk. Degenerate bounds or slice counts yield an empty
/// list. Face order is X boundaries first, then Y, then Z, each scanning the
/// remaining axes ascending.
pub fn build_division_planes_from_grid(
    bounds: Aabb,
    slice_count: UVec3,
    chunk_by_index: &[Option<u32>],
) -> Vec<DivisionPlaneRect> {
    let (cx, cy, cz) = (slice_count.x, slice_count.y, slice_count.z);
    let total = (cx * cy * cz) as usize;
    if cx == 0 || cy == 0 || cz == 0 || chunk_by_index.len() < total {
        return Vec::new();
    }
    let size = bounds.max - bounds.min;
    if size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
        return Vec::new();
    }
    let cell = Vec3::new(size.x / cx as f32, size.y / cy as f32, size.z / cz as f32);
    let index = |x: u32, y: u32, z: u32| (x + y * cx + z * cx * cy) as usize;
    let mut planes = Vec::new();

    for x in 1..cx {
        let plane_x = bounds.min.x + cell.x * x as f32;
        for y in 0..cy {
            let center_y = bounds.min.y + cell.y * (y as f32 + 0.5);
            for z in 0..cz {
                let center_z = bounds.min.z + cell.z * (z as f32 + 0.5);
                let (Some(a), Some(b)) = (
                    chunk_by_index[index(x - 1, y, z)],
                    chunk_by_index[index(x, y, z)],
                ) else {
                    continue;
                };
                let origin = Vec3::new(plane_x, center_y, center_z);
                planes.push(DivisionPlaneRect {
                    plane_origin: origin,
                    plane_normal: Vec3::X,
                    rect_center: origin,
                    axis_u: Vec3::Y,
                    axis_v: Vec3::Z,
                    half_extents: Vec2::new(cell.y * 0.5, cell.z * 0.5),
                    chunk_a: a,
                    chunk_b: b,
                });
            }
        }
    }

    for y in 1..cy {
        let plane_y = bounds.min.y + cell.y * y as f32;
        for x in 0..cx {
            let center_x = bounds.min.x + cell.x * (x as f32 + 0.5);
            for z in 0..cz {
                let center_z = bounds.min.z + cell.z * (z as f32 + 0.5);
                let (Some(a), Some(b)) = (
                    chunk_by_index[index(x, y - 1, z)],
                    chunk_by_index[index(x, y, z)],
                ) else {
                    continue;
                };
                let origin = Vec3::new(center_x, plane_y, center_z);
                planes.push(DivisionPlaneRect {
                    plane_origin: origin,
                    plane_normal: Vec3::Y,
                    rect_center: origin,
                    axis_u: Vec3::X,
                    axis_v: Vec3::Z,
                    half_extents: Vec2::new(cell.x * 0.5, cell.z * 0.5),
                    chunk_a: a,
                    chunk_b: b,
                });
            }
        }
    }

    for z in 1..cz {
        let plane_z = bounds.min.z + cell.z * z as f32;
        for x in 0..cx {
            let center_x = bounds.min.x + cell.x * (x as f32 + 0.5);
            for y in 0..cy {
                let center_y = bounds.min.y + cell.y * (y as f32 + 0.5);
                let (Some(a), Some(b)) = (
                    chunk_by_index[index(x, y, z - 1)],
                    chunk_by_index[index(x, y, z)],
                ) else {
                    continue;
                };
                let origin = Vec3::new(center_x, center_y, plane_z);
                planes.push(DivisionPlaneRect {
                    plane_origin: origin,
                    plane_normal: Vec3::Z,
                    rect_center: origin,
                    axis_u: Vec3::X,
                    axis_v: Vec3::Y,
                    half_extents: Vec2::new(cell.x * 0.5, cell.y * 0.5),
                    chunk_a: a,
                    chunk_b: b,
                });
            }
        }
    }

    planes
}

const MIN_AXIS_LEN_SQ: f32 = 1e-12;

/// Triangles from `tri_ids` that lie entirely within the plane tolerance,
/// projected to the rect's UV frame, filtered to those whose 2D bounds
/// overlap the tolerance-extended rect. Also returns the merged bounds of
/// the kept triangles. `None` when nothing qualifies or the plane frame is
/// degenerate.
pub fn boundary_triangles_on_plane<M: TriangleSource + ?Sized>(
    mesh: &M,
    tri_ids: &[u32],
    plane: &DivisionPlaneRect,
    tol: GraphTolerances,
) -> Option<(Vec<BoundaryTriangle2D>, Rect2)> {
    if tri_ids.is_empty() {
        return None;
    }
    if plane.plane_normal.length_squared() < MIN_AXIS_LEN_SQ
        || plane.axis_u.length_squared() < MIN_AXIS_LEN_SQ
        || plane.axis_v.length_squared() < MIN_AXIS_LEN_SQ
    {
        return None;
    }
    let normal = plane.plane_normal.normalize();
    let axis_u = plane.axis_u.normalize();
    let axis_v = plane.axis_v.normalize();

    let plane_tol = tol.plane.abs();
    let rect_tol = tol.rect.abs();
    let max_u = plane.half_extents.x.abs() + rect_tol;
    let max_v = plane.half_extents.y.abs() + rect_tol;

    let mut kept: Vec<BoundaryTriangle2D> = Vec::new();
    let mut merged: Option<Rect2> = None;

    for &id in tri_ids {
        let Some(verts) = mesh.triangle(id) else {
            continue;
        };
        let mut uvs = [Vec2::ZERO; 3];
        let mut on_plane = true;
        for (uv, &pos) in uvs.iter_mut().zip(verts.iter()) {
            let dist = normal.dot(pos - plane.plane_origin);
            if dist.abs() > plane_tol {
                on_plane = false;
                break;
            }
            let local = pos - plane.rect_center;
            *uv = Vec2::new(local.dot(axis_u), local.dot(axis_v));
        }
        if !on_plane {
            continue;
        }

        let bounds = Rect2::from_points(&uvs).expect("three points");
        let overlaps_rect = bounds.min.x <= max_u
            && bounds.max.x >= -max_u
            && bounds.min.y <= max_v
            && bounds.max.y >= -max_v;
        if !overlaps_rect {
            continue;
        }

        merged = Some(match merged {
            Some(m) => m.merge(&bounds),
            None => bounds,
        });
        kept.push(BoundaryTriangle2D { points: uvs, bounds });
    }

    merged.map(|bounds| (kept, bounds))
}

/// Whether two chunks still touch across a division plane: both must have
/// boundary triangles on the plane, the merged bounds must overlap, and at
/// least one triangle pair must intersect in 2D.
pub fn nodes_connected_by_plane<A, B>(
    mesh_a: &A,
    tri_ids_a: &[u32],
    mesh_b: &B,
    tri_ids_b: &[u32],
    plane: &DivisionPlaneRect,
    tol: GraphTolerances,
) -> bool
where
    A: TriangleSource + ?Sized,
    B: TriangleSource + ?Sized,
{
    let Some((tris_a, bounds_a)) = boundary_triangles_on_plane(mesh_a, tri_ids_a, plane, tol)
    else {
        return false;
    };
    let Some((tris_b, bounds_b)) = boundary_triangles_on_plane(mesh_b, tri_ids_b, plane, tol)
    else {
        return false;
    };
    if !bounds_a.overlaps(&bounds_b) {
        return false;
    }

    let eps = tol.rect.max(1e-4);
    for ta in &tris_a {
        for tb in &tris_b {
            if ta.bounds.overlaps(&tb.bounds)
                && triangles_intersect(ta.points, tb.points, eps)
            {
                return true;
            }
        }
    }
    false
}

/// Edge of the chunk/cell graph: the node on the far side and the plane that
/// established the link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkCellNeighbor {
    pub chunk_id: u32,
    pub cell_id: u32,
    pub division_plane_index: Option<usize>,
}

/// Node of the chunk/cell graph. `cell_id` is unique within its chunk only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkCellNode {
    pub chunk_id: u32,
    pub cell_id: u32,
    pub neighbors: Vec<ChunkCellNeighbor>,
    pub is_anchor: bool,
}

/// Per-chunk cell inventory the host refreshes when a chunk's mesh changes.
#[derive(Clone, Debug, Default)]
pub struct ChunkCellCache {
    pub chunk_id: u32,
    pub cell_ids: Vec<u32>,
    pub cell_triangles: Vec<Vec<u32>>,
    pub cell_bounds: Vec<Aabb>,
    pub has_geometry: bool,
    pub mesh_revision: u32,
}
