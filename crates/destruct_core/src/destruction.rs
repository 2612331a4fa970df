//! Stateless destruction and connectivity algorithms.
//!
//! Every function takes the grid cache plus explicit state and returns a
//! value; nothing here mutates caller state except through the carver entry
//! point, which owns the only write path. Determinism contract: scans ascend
//! by cell id, BFS seeds are sorted, neighbor lists are walked in stored
//! order, and all returned collections are sorted.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use cell_grid::{GridCellCache, MeshTransform};
use glam::Vec3;
use shape_model::QuantizedShape;

use crate::events::DestructionResult;
use crate::state::CellState;
use crate::subcell::{
    corresponding_boundary_subcell, is_on_boundary, neighbor_direction, subcell_id_to_coord,
    subcell_local_center, SUBCELL_COUNT, SUBCELL_DIVISION,
};

/// Two-phase hit test: the world-space center first, then the 8 world-space
/// corners with a >= 4 early-out. The asymmetric threshold under-destroys on
/// boundary contact, which keeps edge cells standing until a later impact
/// clearly covers them.
pub fn is_cell_destroyed(
    cache: &GridCellCache,
    cell: u32,
    shape: &QuantizedShape,
    transform: &MeshTransform,
) -> bool {
    let world_center = cache.id_to_world_center(cell, transform);
    if shape.contains_point(world_center) {
        return true;
    }

    let mut hits = 0;
    for v in cache.cell_vertices(cell) {
        if shape.contains_point(transform.to_world(v)) {
            hits += 1;
            if hits >= 4 {
                return true;
            }
        }
    }
    false
}

/// Ascending-id scan over existing, not-yet-destroyed cells. Returns the new
/// ids only; the caller decides when to fold them into its state.
pub fn calculate_destroyed_cells(
    cache: &GridCellCache,
    shape: &QuantizedShape,
    transform: &MeshTransform,
    destroyed: &HashSet<u32>,
) -> Vec<u32> {
    if !cache.is_valid() {
        return Vec::new();
    }
    let mut newly = Vec::new();
    for &cell in cache.cell_ids() {
        if destroyed.contains(&cell) {
            continue;
        }
        if is_cell_destroyed(cache, cell, shape, transform) {
            newly.push(cell);
        }
    }
    newly
}

/// Multi-source BFS from every non-destroyed anchor (seeded in ascending id
/// order). Returns the sorted ids of live cells the search never reached.
/// Invalid cache yields an empty result.
pub fn find_disconnected_cells(cache: &GridCellCache, destroyed: &HashSet<u32>) -> Vec<u32> {
    if !cache.is_valid() {
        return Vec::new();
    }
    let mut connected: HashSet<u32> = HashSet::new();
    let mut queue: VecDeque<u32> = VecDeque::new();

    for &cell in cache.cell_ids() {
        if cache.is_anchor(cell) && !destroyed.contains(&cell) {
            connected.insert(cell);
            queue.push_back(cell);
        }
    }

    while let Some(current) = queue.pop_front() {
        for &neighbor in cache.neighbors(current) {
            if !destroyed.contains(&neighbor) && connected.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    cache
        .cell_ids()
        .iter()
        .copied()
        .filter(|id| !destroyed.contains(id) && !connected.contains(id))
        .collect()
}

/// Partition disconnected cells into connected components, following edges
/// inside the disconnected subgraph only. Components come back in
/// ascending-start-id order with each member list sorted. Invalid cache
/// yields an empty result.
pub fn group_detached_cells(cache: &GridCellCache, disconnected: &[u32]) -> Vec<Vec<u32>> {
    if !cache.is_valid() {
        return Vec::new();
    }
    let member: HashSet<u32> = disconnected.iter().copied().collect();
    let mut starts: Vec<u32> = disconnected.to_vec();
    starts.sort_unstable();

    let mut visited: HashSet<u32> = HashSet::new();
    let mut groups = Vec::new();

    for start in starts {
        if !visited.insert(start) {
            continue;
        }
        let mut group = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for &neighbor in cache.neighbors(current) {
                if member.contains(&neighbor) && visited.insert(neighbor) {
                    group.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }
        group.sort_unstable();
        groups.push(group);
    }
    groups
}

/// First live sub-cell of a cell, or `None` when the cell is destroyed or
/// fully carved out.
fn first_alive_subcell(state: &CellState, cell: u32) -> Option<u8> {
    if state.destroyed.contains(&cell) {
        return None;
    }
    (0..SUBCELL_COUNT).find(|&sub| state.is_sub_cell_alive(cell, sub))
}

/// Composite visited key for sub-cell BFS. Widened to u64 so cell ids are
/// not capped at 65536.
#[inline]
fn subcell_key(cell: u32, sub: u8) -> u64 {
    (u64::from(cell) << 3) | u64::from(sub)
}

/// Sub-cell BFS from one cell. Moves intra-cell through live sub-cells and
/// inter-cell only across live paired boundary sub-cells. Reaching an anchor
/// or an already-confirmed cell proves connectivity for every cell visited.
fn subcell_bfs(
    cache: &GridCellCache,
    state: &CellState,
    start_cell: u32,
    confirmed_connected: &HashSet<u32>,
    visited_cells: &mut BTreeSet<u32>,
) -> bool {
    visited_cells.clear();
    let Some(start_sub) = first_alive_subcell(state, start_cell) else {
        return false;
    };

    let mut queue: VecDeque<(u32, u8)> = VecDeque::new();
    let mut visited_subs: HashSet<u64> = HashSet::new();
    queue.push_back((start_cell, start_sub));
    visited_subs.insert(subcell_key(start_cell, start_sub));
    visited_cells.insert(start_cell);

    while let Some((cell, sub)) = queue.pop_front() {
        if cache.is_anchor(cell) || confirmed_connected.contains(&cell) {
            return true;
        }

        let sub_coord = subcell_id_to_coord(sub).as_ivec3();
        for (dir, off) in cell_grid::NEIGHBOR_OFFSETS.iter().enumerate() {
            let next = sub_coord + *off;
            let div = SUBCELL_DIVISION as i32;
            let inside = next.x >= 0
                && next.x < div
                && next.y >= 0
                && next.y < div
                && next.z >= 0
                && next.z < div;

            if inside {
                let next_sub = crate::subcell::subcell_coord_to_id(next.as_uvec3());
                let key = subcell_key(cell, next_sub);
                if !visited_subs.contains(&key) && state.is_sub_cell_alive(cell, next_sub) {
                    visited_subs.insert(key);
                    queue.push_back((cell, next_sub));
                }
            } else {
                if !is_on_boundary(sub, dir) {
                    continue;
                }
                let cell_coord = cache.id_to_coord(cell).as_ivec3();
                let Some(neighbor) = cache.try_coord_to_id(cell_coord + *off) else {
                    continue;
                };
                if !cache.cell_exists(neighbor) || state.destroyed.contains(&neighbor) {
                    continue;
                }
                let neighbor_sub = corresponding_boundary_subcell(sub, dir);
                let key = subcell_key(neighbor, neighbor_sub);
                if !visited_subs.contains(&key)
                    && state.is_sub_cell_alive(neighbor, neighbor_sub)
                {
                    visited_subs.insert(key);
                    queue.push_back((neighbor, neighbor_sub));
                    visited_cells.insert(neighbor);
                }
            }
        }
    }
    false
}

/// Sub-cell-accurate disconnection check. Candidates are the affected live
/// cells plus their live neighbors; each unprocessed candidate runs one
/// sub-cell BFS and the verdict applies to every cell that pass visited.
/// Returns sorted disconnected cell ids.
pub fn find_disconnected_cells_with_subcells(
    cache: &GridCellCache,
    state: &CellState,
    affected: &[u32],
) -> Vec<u32> {
    let mut candidates: BTreeSet<u32> = BTreeSet::new();
    for &cell in affected {
        if state.destroyed.contains(&cell) {
            continue;
        }
        candidates.insert(cell);
        for &neighbor in cache.neighbors(cell) {
            if !state.destroyed.contains(&neighbor) {
                candidates.insert(neighbor);
            }
        }
    }

    let mut disconnected: BTreeSet<u32> = BTreeSet::new();
    let mut confirmed: HashSet<u32> = HashSet::new();
    let mut processed: HashSet<u32> = HashSet::new();
    let mut visited: BTreeSet<u32> = BTreeSet::new();

    for &candidate in &candidates {
        if processed.contains(&candidate) {
            continue;
        }
        let reached_anchor = subcell_bfs(cache, state, candidate, &confirmed, &mut visited);
        for &cell in &visited {
            processed.insert(cell);
            if reached_anchor {
                confirmed.insert(cell);
            } else {
                disconnected.insert(cell);
            }
        }
    }

    disconnected.into_iter().collect()
}

/// For each detached group, flood-fill the sub-cell grid of every adjacent
/// still-connected cell from the live boundary sub-cells facing the group,
/// stopping at dead sub-cells. The result maps connected cell id to the
/// sorted sub-cells that the detachment reveals.
pub fn group_detached_cells_with_subcells(
    cache: &GridCellCache,
    state: &CellState,
    groups: &[Vec<u32>],
) -> BTreeMap<u32, Vec<u8>> {
    let mut revealed: BTreeMap<u32, BTreeSet<u8>> = BTreeMap::new();

    for group in groups {
        let members: HashSet<u32> = group.iter().copied().collect();
        for &member in group {
            let member_coord = cache.id_to_coord(member).as_ivec3();
            for &neighbor in cache.neighbors(member) {
                if members.contains(&neighbor) || state.destroyed.contains(&neighbor) {
                    continue;
                }
                let neighbor_coord = cache.id_to_coord(neighbor).as_ivec3();
                let Some(dir) = neighbor_direction(neighbor_coord, member_coord) else {
                    continue;
                };

                // Flood from the neighbor's face toward the group.
                let mut queue: VecDeque<u8> = VecDeque::new();
                let mut seen = [false; SUBCELL_COUNT as usize];
                for sub in 0..SUBCELL_COUNT {
                    if is_on_boundary(sub, dir) && state.is_sub_cell_alive(neighbor, sub) {
                        seen[sub as usize] = true;
                        queue.push_back(sub);
                    }
                }
                let entry = revealed.entry(neighbor).or_default();
                while let Some(sub) = queue.pop_front() {
                    entry.insert(sub);
                    let c = subcell_id_to_coord(sub).as_ivec3();
                    for off in cell_grid::NEIGHBOR_OFFSETS {
                        let n = c + off;
                        let div = SUBCELL_DIVISION as i32;
                        if n.x < 0 || n.x >= div || n.y < 0 || n.y >= div || n.z < 0 || n.z >= div
                        {
                            continue;
                        }
                        let next = crate::subcell::subcell_coord_to_id(n.as_uvec3());
                        if !seen[next as usize] && state.is_sub_cell_alive(neighbor, next) {
                            seen[next as usize] = true;
                            queue.push_back(next);
                        }
                    }
                }
                if entry.is_empty() {
                    revealed.remove(&neighbor);
                }
            }
        }
    }

    revealed
        .into_iter()
        .map(|(cell, subs)| (cell, subs.into_iter().collect()))
        .collect()
}

/// Output of one carving pass: which cells were touched and which sub-cells
/// newly died in each.
#[derive(Clone, Debug, Default)]
pub struct CarveOutput {
    pub affected_cells: Vec<u32>,
    pub newly_dead: BTreeMap<u32, Vec<u8>>,
}

/// Collaborator that applies an impact shape to sub-cell state. The host
/// supplies a mesh-aware implementation; `GeometricCarver` is the default
/// containment-based one.
pub trait SubCellCarver {
    fn carve(
        &mut self,
        shape: &QuantizedShape,
        transform: &MeshTransform,
        cache: &GridCellCache,
        state: &mut CellState,
    ) -> CarveOutput;
}

/// Kills every live sub-cell whose world-space center the shape contains.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeometricCarver;

impl SubCellCarver for GeometricCarver {
    fn carve(
        &mut self,
        shape: &QuantizedShape,
        transform: &MeshTransform,
        cache: &GridCellCache,
        state: &mut CellState,
    ) -> CarveOutput {
        let mut out = CarveOutput::default();
        for &cell in cache.cell_ids() {
            if state.destroyed.contains(&cell) {
                continue;
            }
            let mut dead_here: Vec<u8> = Vec::new();
            for sub in 0..SUBCELL_COUNT {
                if !state.is_sub_cell_alive(cell, sub) {
                    continue;
                }
                let center = transform.to_world(subcell_local_center(cache, cell, sub));
                if shape.contains_point(center) && state.kill_sub_cell(cell, sub) {
                    dead_here.push(sub);
                }
            }
            if !dead_here.is_empty() {
                out.affected_cells.push(cell);
                out.newly_dead.insert(cell, dead_here);
            }
        }
        out
    }
}

/// Apply one impact at sub-cell granularity via the carver, then derive
/// which affected cells became fully destroyed. Invalid cache yields an
/// empty result.
pub fn process_cell_destruction_with_subcells(
    cache: &GridCellCache,
    shape: &QuantizedShape,
    transform: &MeshTransform,
    state: &mut CellState,
    carver: &mut dyn SubCellCarver,
) -> DestructionResult {
    let mut result = DestructionResult::default();
    if !cache.is_valid() {
        return result;
    }

    let carved = carver.carve(shape, transform, cache, state);
    result.affected_cells = carved.affected_cells;
    result.dead_sub_cell_count = carved
        .newly_dead
        .values()
        .map(|subs| subs.len() as u32)
        .sum();
    result.newly_dead_sub_cells = carved.newly_dead;
    result.newly_destroyed_cells = result
        .affected_cells
        .iter()
        .copied()
        .filter(|cell| state.destroyed.contains(cell))
        .collect();
    result
}

/// Mean of the cells' world centers; empty input yields zero.
pub fn group_center(cache: &GridCellCache, cells: &[u32], transform: &MeshTransform) -> Vec3 {
    if cells.is_empty() {
        return Vec3::ZERO;
    }
    let sum: Vec3 = cells
        .iter()
        .map(|&id| cache.id_to_world_center(id, transform))
        .sum();
    sum / cells.len() as f32
}

/// Debris launch velocity: away from the nearest impact center (first input
/// wins squared-distance ties) at `base_speed`. Empty inputs or a debris
/// center on top of the impact yield zero.
pub fn debris_velocity(debris_center: Vec3, inputs: &[QuantizedShape], base_speed: f32) -> Vec3 {
    let mut best: Option<(f32, Vec3)> = None;
    for input in inputs {
        let center = input.center();
        let dist_sq = debris_center.distance_squared(center);
        match best {
            Some((d, _)) if dist_sq >= d => {}
            _ => best = Some((dist_sq, center)),
        }
    }
    match best {
        Some((_, closest)) => (debris_center - closest).normalize_or_zero() * base_speed,
        None => Vec3::ZERO,
    }
}

/// A live cell adjacent to at least one destroyed cell.
pub fn is_boundary_cell(cache: &GridCellCache, cell: u32, destroyed: &HashSet<u32>) -> bool {
    cache
        .neighbors(cell)
        .iter()
        .any(|id| destroyed.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cell_grid::{GridCellCacheBuilder, GridMeta};
    use glam::{uvec3, vec3, Vec3};
    use shape_model::DestructShape;

    fn line_cache(len: u32, anchors: &[u32]) -> GridCellCache {
        let mut b = GridCellCacheBuilder::new(GridMeta {
            grid_size: uvec3(len, 1, 1),
            cell_size: Vec3::ONE,
            origin: Vec3::ZERO,
        })
        .expect("meta");
        for id in 0..len {
            b.add_cell(id, anchors.contains(&id), Vec::new()).expect("add");
        }
        b.build()
    }

    fn sphere(center: Vec3, radius: f32) -> QuantizedShape {
        QuantizedShape::from_shape(&DestructShape::Sphere { center, radius })
    }

    #[test]
    fn center_hit_destroys_cell() {
        let cache = line_cache(3, &[0]);
        let shape = sphere(vec3(1.5, 0.5, 0.5), 0.2);
        assert!(is_cell_destroyed(&cache, 1, &shape, &MeshTransform::IDENTITY));
        assert!(!is_cell_destroyed(&cache, 0, &shape, &MeshTransform::IDENTITY));
    }

    #[test]
    fn four_corners_meet_the_majority() {
        let cache = line_cache(1, &[]);
        // Corners of the x=0 face sit 0.866 away, the cell center 1.0 away.
        let shape = sphere(vec3(-0.5, 0.5, 0.5), 0.9);
        assert!(is_cell_destroyed(&cache, 0, &shape, &MeshTransform::IDENTITY));
        // Misses every corner and the center.
        let graze = sphere(vec3(-0.5, 0.5, 0.5), 0.8);
        assert!(!is_cell_destroyed(&cache, 0, &graze, &MeshTransform::IDENTITY));
    }

    #[test]
    fn disconnection_after_cutting_the_line() {
        let cache = line_cache(3, &[0]);
        let destroyed: HashSet<u32> = [1].into_iter().collect();
        let disconnected = find_disconnected_cells(&cache, &destroyed);
        assert_eq!(disconnected, vec![2]);
        let groups = group_detached_cells(&cache, &disconnected);
        assert_eq!(groups, vec![vec![2]]);
    }

    #[test]
    fn bfs_is_deterministic() {
        let cache = line_cache(7, &[3]);
        let destroyed: HashSet<u32> = [1, 5].into_iter().collect();
        let a = find_disconnected_cells(&cache, &destroyed);
        let b = find_disconnected_cells(&cache, &destroyed);
        assert_eq!(a, b);
        assert_eq!(a, vec![0, 6]);
        let ga = group_detached_cells(&cache, &a);
        assert_eq!(ga, vec![vec![0], vec![6]]);
    }

    #[test]
    fn subcell_bfs_sees_through_live_boundary() {
        // 0 anchored, 1 intact, 2 under test.
        let cache = line_cache(3, &[0]);
        let state = CellState::new();
        let disconnected = find_disconnected_cells_with_subcells(&cache, &state, &[2]);
        assert!(disconnected.is_empty());
    }

    #[test]
    fn dead_boundary_face_disconnects_at_subcell_level() {
        let cache = line_cache(3, &[0]);
        let mut state = CellState::new();
        // Kill cell 1's -X face so nothing can cross from cell 0 side.
        for (own, _) in crate::subcell::boundary_pairs(0) {
            state.kill_sub_cell(1, own);
        }
        // Coarse BFS still sees cell 1 and 2 as connected.
        assert!(find_disconnected_cells(&cache, &state.destroyed).is_empty());
        // Sub-cell BFS does not.
        let disconnected = find_disconnected_cells_with_subcells(&cache, &state, &[1]);
        assert_eq!(disconnected, vec![1, 2]);
    }

    #[test]
    fn detachment_reveals_facing_subcells() {
        let cache = line_cache(2, &[0]);
        let state = CellState::new();
        let revealed = group_detached_cells_with_subcells(&cache, &state, &[vec![1]]);
        // Cell 0 faces the group in +X; its whole sub grid is live so the
        // flood reaches all 8 sub-cells.
        assert_eq!(revealed.get(&0).map(Vec::len), Some(8));
    }

    #[test]
    fn geometric_carver_folds_into_result() {
        let cache = line_cache(2, &[0]);
        let mut state = CellState::new();
        let shape = sphere(vec3(1.5, 0.5, 0.5), 2.0);
        let result = process_cell_destruction_with_subcells(
            &cache,
            &shape,
            &MeshTransform::IDENTITY,
            &mut state,
            &mut GeometricCarver,
        );
        assert_eq!(result.affected_cells, vec![0, 1]);
        assert_eq!(result.dead_sub_cell_count, 16);
        assert_eq!(result.newly_destroyed_cells, vec![0, 1]);
        assert!(state.destroyed.contains(&0) && state.destroyed.contains(&1));
    }

    #[test]
    fn debris_velocity_points_away_from_nearest_impact() {
        let inputs = [
            sphere(vec3(0.0, 0.0, 0.0), 1.0),
            sphere(vec3(10.0, 0.0, 0.0), 1.0),
        ];
        let v = debris_velocity(vec3(9.0, 0.0, 0.0), &inputs, 500.0);
        assert!((v - vec3(-500.0, 0.0, 0.0)).length() < 1e-3);
        assert_eq!(debris_velocity(Vec3::ZERO, &[], 500.0), Vec3::ZERO);
        // Debris sitting on the impact center gets no direction.
        assert_eq!(
            debris_velocity(Vec3::ZERO, &[sphere(Vec3::ZERO, 1.0)], 500.0),
            Vec3::ZERO
        );
    }

    #[test]
    fn boundary_cell_detection() {
        let cache = line_cache(3, &[0]);
        let destroyed: HashSet<u32> = [1].into_iter().collect();
        assert!(is_boundary_cell(&cache, 0, &destroyed));
        assert!(is_boundary_cell(&cache, 2, &destroyed));
        let none: HashSet<u32> = HashSet::new();
        assert!(!is_boundary_cell(&cache, 0, &none));
    }

    #[test]
    fn group_center_averages_world_centers() {
        let cache = line_cache(2, &[]);
        let c = group_center(&cache, &[0, 1], &MeshTransform::IDENTITY);
        assert!((c - vec3(1.0, 0.5, 0.5)).length() < 1e-6);
        assert_eq!(group_center(&cache, &[], &MeshTransform::IDENTITY), Vec3::ZERO);
    }

    #[test]
    fn invalid_cache_answers_empty_everywhere() {
        let cache = GridCellCache::default();
        let destroyed: HashSet<u32> = HashSet::new();
        let shape = sphere(vec3(0.5, 0.5, 0.5), 10.0);
        assert!(
            calculate_destroyed_cells(&cache, &shape, &MeshTransform::IDENTITY, &destroyed)
                .is_empty()
        );
        assert!(find_disconnected_cells(&cache, &destroyed).is_empty());
        assert!(group_detached_cells(&cache, &[1, 2]).is_empty());
    }

    #[test]
    fn idempotent_over_already_destroyed() {
        let cache = line_cache(3, &[0]);
        let shape = sphere(vec3(1.5, 0.5, 0.5), 0.4);
        let destroyed: HashSet<u32> = [1].into_iter().collect();
        assert!(calculate_destroyed_cells(&cache, &shape, &MeshTransform::IDENTITY, &destroyed)
            .is_empty());
    }
}
