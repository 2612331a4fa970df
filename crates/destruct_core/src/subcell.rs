//! Sub-cell geometry tables.
//!
//! Each cell divides into 2x2x2 sub-cells, id = `x + y*2 + z*4`. The six
//! face directions share the canonical order of `cell_grid::NEIGHBOR_OFFSETS`
//! (-X, +X, -Y, +Y, -Z, +Z); crossing a face pairs the 4 boundary sub-cells
//! on one side with the 4 facing sub-cells of the neighbor.

use cell_grid::{GridCellCache, NEIGHBOR_OFFSETS};
use glam::{IVec3, UVec3, Vec3};

pub const SUBCELL_DIVISION: u32 = 2;
pub const SUBCELL_COUNT: u8 = 8;

#[inline]
pub fn subcell_coord_to_id(c: UVec3) -> u8 {
    (c.x + c.y * SUBCELL_DIVISION + c.z * SUBCELL_DIVISION * SUBCELL_DIVISION) as u8
}

#[inline]
pub fn subcell_id_to_coord(id: u8) -> UVec3 {
    let id = u32::from(id);
    UVec3::new(
        id % SUBCELL_DIVISION,
        (id / SUBCELL_DIVISION) % SUBCELL_DIVISION,
        id / (SUBCELL_DIVISION * SUBCELL_DIVISION),
    )
}

/// Direction index (0..6) from one cell coordinate to an adjacent one, or
/// `None` when the coordinates are not face-adjacent.
pub fn neighbor_direction(from: IVec3, to: IVec3) -> Option<usize> {
    let diff = to - from;
    NEIGHBOR_OFFSETS.iter().position(|&o| o == diff)
}

/// Whether a sub-cell lies on the face crossed when moving in `dir`.
pub fn is_on_boundary(sub: u8, dir: usize) -> bool {
    let c = subcell_id_to_coord(sub);
    let hi = SUBCELL_DIVISION - 1;
    match dir {
        0 => c.x == 0,
        1 => c.x == hi,
        2 => c.y == 0,
        3 => c.y == hi,
        4 => c.z == 0,
        5 => c.z == hi,
        _ => false,
    }
}

/// The neighbor-side sub-cell that shares the face with `sub` when moving in
/// `dir`. Only meaningful when `is_on_boundary(sub, dir)` holds.
pub fn corresponding_boundary_subcell(sub: u8, dir: usize) -> u8 {
    let c = subcell_id_to_coord(sub);
    let hi = SUBCELL_DIVISION - 1;
    let n = match dir {
        0 => UVec3::new(hi, c.y, c.z),
        1 => UVec3::new(0, c.y, c.z),
        2 => UVec3::new(c.x, hi, c.z),
        3 => UVec3::new(c.x, 0, c.z),
        4 => UVec3::new(c.x, c.y, hi),
        5 => UVec3::new(c.x, c.y, 0),
        _ => c,
    };
    subcell_coord_to_id(n)
}

/// The 4 `(own_sub, neighbor_sub)` pairs across the face in `dir`, own side
/// ascending.
pub fn boundary_pairs(dir: usize) -> [(u8, u8); 4] {
    let mut out = [(0u8, 0u8); 4];
    let mut n = 0;
    for sub in 0..SUBCELL_COUNT {
        if is_on_boundary(sub, dir) {
            out[n] = (sub, corresponding_boundary_subcell(sub, dir));
            n += 1;
        }
    }
    debug_assert_eq!(n, 4);
    out
}

/// Local-space center of a sub-cell.
pub fn subcell_local_center(cache: &GridCellCache, cell: u32, sub: u8) -> Vec3 {
    let min = cache.id_to_local_min(cell);
    let half = cache.meta().cell_size / SUBCELL_DIVISION as f32;
    let c = subcell_id_to_coord(sub).as_vec3();
    min + (c + Vec3::splat(0.5)) * half
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_coord_round_trip() {
        for id in 0..SUBCELL_COUNT {
            assert_eq!(subcell_coord_to_id(subcell_id_to_coord(id)), id);
        }
    }

    #[test]
    fn each_direction_has_four_mutually_inverse_pairs() {
        for dir in 0..6 {
            let pairs = boundary_pairs(dir);
            let back = dir ^ 1;
            for (own, neighbor) in pairs {
                assert!(is_on_boundary(own, dir));
                assert!(is_on_boundary(neighbor, back));
                assert_eq!(corresponding_boundary_subcell(neighbor, back), own);
            }
        }
    }

    #[test]
    fn neighbor_direction_matches_offset_table() {
        let from = IVec3::new(2, 2, 2);
        for (dir, off) in NEIGHBOR_OFFSETS.iter().enumerate() {
            assert_eq!(neighbor_direction(from, from + *off), Some(dir));
        }
        assert_eq!(neighbor_direction(from, from), None);
        assert_eq!(neighbor_direction(from, from + IVec3::new(1, 1, 0)), None);
    }
}
