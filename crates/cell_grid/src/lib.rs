//! cell_grid: build-once spatial index for destructible cell grids.
//!
//! Scope
//! - `GridMeta`: grid dimensions, cell size, and local origin.
//! - `GridCellCache`: existence/anchor bitfields plus sparse per-cell side
//!   tables (triangles, neighbor lists) with coordinate/world queries.
//! - `GridCellCacheBuilder`: the only construction path; derives 6-neighbor
//!   adjacency among existing cells in a fixed axis order.
//!
//! The cache is immutable after build except for the anchor bits, which the
//! owning system may toggle. Out-of-range ids answer with neutral values
//! (zero vectors, `false`, empty slices) rather than panicking.

#![forbid(unsafe_code)]

use glam::{IVec3, Mat4, UVec3, Vec3};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Axis-aligned box (local or world space depending on context).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut it = points.into_iter();
        let first = it.next()?;
        let mut b = Aabb {
            min: first,
            max: first,
        };
        for p in it {
            b.min = b.min.min(p);
            b.max = b.max.max(p);
        }
        Some(b)
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let mut out = [Vec3::ZERO; 8];
        for (i, c) in out.iter_mut().enumerate() {
            *c = Vec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            );
        }
        out
    }
}

/// Local-to-world transform pair for the host mesh. The inverse is computed
/// once so per-cell queries do not re-invert.
#[derive(Clone, Copy, Debug)]
pub struct MeshTransform {
    pub world_from_local: Mat4,
    pub local_from_world: Mat4,
}

impl MeshTransform {
    pub const IDENTITY: Self = Self {
        world_from_local: Mat4::IDENTITY,
        local_from_world: Mat4::IDENTITY,
    };

    pub fn new(world_from_local: Mat4) -> Self {
        Self {
            world_from_local,
            local_from_world: world_from_local.inverse(),
        }
    }

    #[inline]
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.world_from_local.transform_point3(local)
    }

    #[inline]
    pub fn to_local(&self, world: Vec3) -> Vec3 {
        self.local_from_world.transform_point3(world)
    }
}

/// Grid extent metadata. Cells are `cell_size`-sized boxes laid out row-major
/// (`id = x + y*W + z*W*H`) from `origin` in host-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridMeta {
    pub grid_size: UVec3,
    pub cell_size: Vec3,
    pub origin: Vec3,
}

impl GridMeta {
    pub fn total_cell_count(&self) -> u32 {
        self.grid_size.x * self.grid_size.y * self.grid_size.z
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridCacheError {
    #[error("grid dimensions must be positive, got {0}x{1}x{2}")]
    DegenerateGrid(u32, u32, u32),
    #[error("cell size must be positive on every axis")]
    DegenerateCellSize,
    #[error("cell id {0} out of range (total {1})")]
    CellOutOfRange(u32, u32),
    #[error("cell id {0} added twice")]
    DuplicateCell(u32),
}

/// Seeds a `GridCellCache`. Cells are keyed by id so construction order does
/// not affect the result.
pub struct GridCellCacheBuilder {
    meta: GridMeta,
    cells: BTreeMap<u32, CellSeed>,
}

struct CellSeed {
    anchor: bool,
    triangles: Vec<u32>,
}

impl GridCellCacheBuilder {
    pub fn new(meta: GridMeta) -> Result<Self, GridCacheError> {
        let d = meta.grid_size;
        if d.x == 0 || d.y == 0 || d.z == 0 {
            return Err(GridCacheError::DegenerateGrid(d.x, d.y, d.z));
        }
        if meta.cell_size.min_element() <= 0.0 {
            return Err(GridCacheError::DegenerateCellSize);
        }
        Ok(Self {
            meta,
            cells: BTreeMap::new(),
        })
    }

    /// Register an existing cell. `triangles` are host-mesh triangle ids
    /// associated with the cell for debris aggregation.
    pub fn add_cell(
        &mut self,
        id: u32,
        anchor: bool,
        triangles: Vec<u32>,
    ) -> Result<&mut Self, GridCacheError> {
        let total = self.meta.total_cell_count();
        if id >= total {
            return Err(GridCacheError::CellOutOfRange(id, total));
        }
        if self.cells.contains_key(&id) {
            return Err(GridCacheError::DuplicateCell(id));
        }
        self.cells.insert(id, CellSeed { anchor, triangles });
        Ok(self)
    }

    pub fn add_cell_at(
        &mut self,
        coord: UVec3,
        anchor: bool,
        triangles: Vec<u32>,
    ) -> Result<&mut Self, GridCacheError> {
        let d = self.meta.grid_size;
        if coord.x >= d.x || coord.y >= d.y || coord.z >= d.z {
            return Err(GridCacheError::CellOutOfRange(
                coord.x + coord.y * d.x + coord.z * d.x * d.y,
                self.meta.total_cell_count(),
            ));
        }
        self.add_cell(coord.x + coord.y * d.x + coord.z * d.x * d.y, anchor, triangles)
    }

    /// Finalize: pack bitfields and derive neighbor lists from 6-adjacency
    /// among existing cells, in fixed -X,+X,-Y,+Y,-Z,+Z order.
    pub fn build(self) -> GridCellCache {
        let meta = self.meta;
        let total = meta.total_cell_count() as usize;
        let words = total.div_ceil(32);
        let mut exists_bits = vec![0u32; words];
        let mut anchor_bits = vec![0u32; words];
        let mut sparse_to_cell = Vec::with_capacity(self.cells.len());
        let mut cell_to_sparse = HashMap::with_capacity(self.cells.len());
        let mut triangles = Vec::with_capacity(self.cells.len());

        for (&id, seed) in &self.cells {
            exists_bits[(id >> 5) as usize] |= 1 << (id & 31);
            if seed.anchor {
                anchor_bits[(id >> 5) as usize] |= 1 << (id & 31);
            }
            cell_to_sparse.insert(id, sparse_to_cell.len() as u32);
            sparse_to_cell.push(id);
            triangles.push(seed.triangles.clone());
        }

        let mut cache = GridCellCache {
            meta,
            exists_bits,
            anchor_bits,
            sparse_to_cell,
            cell_to_sparse,
            triangles,
            neighbors: Vec::new(),
        };

        let mut neighbors = Vec::with_capacity(cache.sparse_to_cell.len());
        for &id in &cache.sparse_to_cell {
            let coord = cache.id_to_coord(id).as_ivec3();
            let mut list: SmallVec<[u32; 6]> = SmallVec::new();
            for off in NEIGHBOR_OFFSETS {
                let nc = coord + off;
                if let Some(nid) = cache.try_coord_to_id(nc) {
                    if cache.cell_exists(nid) {
                        list.push(nid);
                    }
                }
            }
            neighbors.push(list);
        }
        cache.neighbors = neighbors;
        cache
    }
}

/// The six axis-aligned neighbor directions, in the canonical traversal
/// order used by every connectivity pass.
pub const NEIGHBOR_OFFSETS: [IVec3; 6] = [
    IVec3::new(-1, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, -1, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(0, 0, -1),
    IVec3::new(0, 0, 1),
];

/// Immutable-once-built spatial index over a destructible cell grid.
pub struct GridCellCache {
    meta: GridMeta,
    exists_bits: Vec<u32>,
    anchor_bits: Vec<u32>,
    sparse_to_cell: Vec<u32>,
    cell_to_sparse: HashMap<u32, u32>,
    triangles: Vec<Vec<u32>>,
    neighbors: Vec<SmallVec<[u32; 6]>>,
}

/// Empty placeholder until the host builds a real cache. Fails `is_valid`,
/// so every destruction entry point treats it as having no cells.
impl Default for GridCellCache {
    fn default() -> Self {
        Self {
            meta: GridMeta {
                grid_size: UVec3::ZERO,
                cell_size: Vec3::ZERO,
                origin: Vec3::ZERO,
            },
            exists_bits: Vec::new(),
            anchor_bits: Vec::new(),
            sparse_to_cell: Vec::new(),
            cell_to_sparse: HashMap::new(),
            triangles: Vec::new(),
            neighbors: Vec::new(),
        }
    }
}

impl GridCellCache {
    pub fn meta(&self) -> &GridMeta {
        &self.meta
    }

    pub fn total_cell_count(&self) -> u32 {
        self.meta.total_cell_count()
    }

    /// Number of existing (sparse) cells.
    pub fn valid_cell_count(&self) -> u32 {
        self.sparse_to_cell.len() as u32
    }

    /// Existing cell ids in ascending order.
    pub fn cell_ids(&self) -> &[u32] {
        &self.sparse_to_cell
    }

    #[inline]
    pub fn coord_to_id(&self, coord: UVec3) -> u32 {
        let d = self.meta.grid_size;
        coord.x + coord.y * d.x + coord.z * d.x * d.y
    }

    #[inline]
    pub fn id_to_coord(&self, id: u32) -> UVec3 {
        let d = self.meta.grid_size;
        UVec3::new(id % d.x, (id / d.x) % d.y, id / (d.x * d.y))
    }

    #[inline]
    pub fn is_valid_coord(&self, coord: IVec3) -> bool {
        let d = self.meta.grid_size;
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && (coord.x as u32) < d.x
            && (coord.y as u32) < d.y
            && (coord.z as u32) < d.z
    }

    #[inline]
    pub fn try_coord_to_id(&self, coord: IVec3) -> Option<u32> {
        if self.is_valid_coord(coord) {
            Some(self.coord_to_id(coord.as_uvec3()))
        } else {
            None
        }
    }

    #[inline]
    fn bit(&self, bits: &[u32], id: u32) -> bool {
        if id >= self.total_cell_count() {
            return false;
        }
        bits[(id >> 5) as usize] & (1 << (id & 31)) != 0
    }

    #[inline]
    pub fn cell_exists(&self, id: u32) -> bool {
        self.bit(&self.exists_bits, id)
    }

    #[inline]
    pub fn is_anchor(&self, id: u32) -> bool {
        self.bit(&self.anchor_bits, id)
    }

    /// Toggle the anchor flag. The only mutation permitted after build; the
    /// flag is ignored for ids that do not exist.
    pub fn set_anchor(&mut self, id: u32, anchor: bool) {
        if !self.cell_exists(id) {
            return;
        }
        let word = (id >> 5) as usize;
        let mask = 1u32 << (id & 31);
        if anchor {
            self.anchor_bits[word] |= mask;
        } else {
            self.anchor_bits[word] &= !mask;
        }
    }

    pub fn anchor_count(&self) -> u32 {
        self.sparse_to_cell
            .iter()
            .filter(|&&id| self.is_anchor(id))
            .count() as u32
    }

    /// Neighbor ids of an existing cell, in stored (deterministic) order.
    pub fn neighbors(&self, id: u32) -> &[u32] {
        match self.cell_to_sparse.get(&id) {
            Some(&s) => &self.neighbors[s as usize],
            None => &[],
        }
    }

    /// Host-mesh triangle ids associated with a cell.
    pub fn cell_triangles(&self, id: u32) -> &[u32] {
        match self.cell_to_sparse.get(&id) {
            Some(&s) => &self.triangles[s as usize],
            None => &[],
        }
    }

    /// World position -> cell id: inverse-transform, floor-divide, bounds
    /// check. `None` when the point falls outside the grid extent.
    pub fn world_pos_to_id(&self, world: Vec3, transform: &MeshTransform) -> Option<u32> {
        let local = transform.to_local(world);
        let rel = (local - self.meta.origin) / self.meta.cell_size;
        let coord = IVec3::new(
            rel.x.floor() as i32,
            rel.y.floor() as i32,
            rel.z.floor() as i32,
        );
        self.try_coord_to_id(coord)
    }

    pub fn id_to_local_min(&self, id: u32) -> Vec3 {
        if id >= self.total_cell_count() {
            return Vec3::ZERO;
        }
        let c = self.id_to_coord(id).as_vec3();
        self.meta.origin + c * self.meta.cell_size
    }

    pub fn id_to_local_center(&self, id: u32) -> Vec3 {
        if id >= self.total_cell_count() {
            return Vec3::ZERO;
        }
        let c = self.id_to_coord(id).as_vec3();
        self.meta.origin + (c + Vec3::splat(0.5)) * self.meta.cell_size
    }

    pub fn id_to_world_center(&self, id: u32, transform: &MeshTransform) -> Vec3 {
        transform.to_world(self.id_to_local_center(id))
    }

    /// The 8 local-space corners of a cell, bit-pattern ordered (bit 0 = +X,
    /// bit 1 = +Y, bit 2 = +Z offset).
    pub fn cell_vertices(&self, id: u32) -> [Vec3; 8] {
        let min = self.id_to_local_min(id);
        let s = self.meta.cell_size;
        let mut out = [Vec3::ZERO; 8];
        for (i, v) in out.iter_mut().enumerate() {
            *v = Vec3::new(
                min.x + if i & 1 != 0 { s.x } else { 0.0 },
                min.y + if i & 2 != 0 { s.y } else { 0.0 },
                min.z + if i & 4 != 0 { s.z } else { 0.0 },
            );
        }
        out
    }

    /// Existing cells whose grid slots intersect a world-space AABB. The box
    /// is transformed corner-wise into local space and re-enclosed, so a
    /// rotated host transform yields a conservative local range.
    pub fn cells_in_aabb(&self, world_aabb: Aabb, transform: &MeshTransform) -> Vec<u32> {
        if !self.is_valid() {
            return Vec::new();
        }
        let local = match Aabb::from_points(
            world_aabb.corners().iter().map(|&c| transform.to_local(c)),
        ) {
            Some(b) => b,
            None => return Vec::new(),
        };

        let d = self.meta.grid_size;
        let lo = (local.min - self.meta.origin) / self.meta.cell_size;
        let hi = (local.max - self.meta.origin) / self.meta.cell_size;
        let min_c = IVec3::new(
            (lo.x.floor() as i32).max(0),
            (lo.y.floor() as i32).max(0),
            (lo.z.floor() as i32).max(0),
        );
        let max_c = IVec3::new(
            (hi.x.floor() as i32).min(d.x as i32 - 1),
            (hi.y.floor() as i32).min(d.y as i32 - 1),
            (hi.z.floor() as i32).min(d.z as i32 - 1),
        );

        let mut out = Vec::new();
        for z in min_c.z..=max_c.z {
            for y in min_c.y..=max_c.y {
                for x in min_c.x..=max_c.x {
                    let id = self.coord_to_id(UVec3::new(x as u32, y as u32, z as u32));
                    if self.cell_exists(id) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }

    /// Cardinality invariants: positive dims, bitfield word counts matching
    /// `ceil(total/32)`, and sparse tables of equal length. A mismatch means
    /// a corrupt cache and every destruction entry point treats it as empty.
    pub fn is_valid(&self) -> bool {
        let d = self.meta.grid_size;
        if d.x == 0 || d.y == 0 || d.z == 0 {
            return false;
        }
        let words = (self.total_cell_count() as usize).div_ceil(32);
        if self.exists_bits.len() != words || self.anchor_bits.len() != words {
            return false;
        }
        let n = self.sparse_to_cell.len();
        self.triangles.len() == n && self.neighbors.len() == n && self.cell_to_sparse.len() == n
    }
}
