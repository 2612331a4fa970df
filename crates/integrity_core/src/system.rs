//! The RwLock-guarded integrity service.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec3;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::settings::StructuralIntegritySettings;

/// Structural classification of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellStructuralState {
    Normal,
    Detached,
    Destroyed,
}

/// Flat per-cell tables handed to `initialize`. Index is the cell id; all
/// three tables must agree on length.
#[derive(Clone, Debug, Default)]
pub struct IntegrityInitData {
    pub cell_neighbors: Vec<Vec<u32>>,
    pub cell_positions: Vec<Vec3>,
    pub cell_triangles: Vec<Vec<u32>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrityInitError {
    #[error("init data has no cells")]
    Empty,
    #[error("table lengths disagree: neighbors {neighbors}, positions {positions}, triangles {triangles}")]
    MismatchedTables {
        neighbors: usize,
        positions: usize,
        triangles: usize,
    },
}

impl IntegrityInitData {
    pub fn cell_count(&self) -> usize {
        self.cell_neighbors.len()
    }

    pub fn validate(&self) -> Result<(), IntegrityInitError> {
        let n = self.cell_neighbors.len();
        if n == 0 {
            return Err(IntegrityInitError::Empty);
        }
        if self.cell_positions.len() != n || self.cell_triangles.len() != n {
            return Err(IntegrityInitError::MismatchedTables {
                neighbors: n,
                positions: self.cell_positions.len(),
                triangles: self.cell_triangles.len(),
            });
        }
        Ok(())
    }
}

/// One detached connected component: sorted members, centroid, unit-per-cell
/// mass, and the deduplicated triangle ids its cells referenced.
#[derive(Clone, Debug, PartialEq)]
pub struct DetachedCellGroup {
    pub group_id: u32,
    pub cell_ids: Vec<u32>,
    pub center_of_mass: Vec3,
    pub approximate_mass: f32,
    pub triangle_ids: Vec<u32>,
}

/// Outcome of a destroy call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntegrityResult {
    pub newly_destroyed: Vec<u32>,
    pub detached_groups: Vec<DetachedCellGroup>,
    pub structure_collapsed: bool,
    pub total_destroyed: u32,
}

#[derive(Default)]
struct IntegrityData {
    initialized: bool,
    settings: StructuralIntegritySettings,
    neighbors: Vec<Vec<u32>>,
    positions: Vec<Vec3>,
    triangles: Vec<Vec<u32>>,
    states: Vec<CellStructuralState>,
    destroyed: HashSet<u32>,
    anchors: BTreeSet<u32>,
    connected_cache: HashSet<u32>,
    cache_valid: bool,
    next_group_id: u32,
}

impl Default for StructuralIntegritySystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe structural integrity service. One lock guards the whole
/// snapshot; writers recompute connectivity, readers only consult the cache.
pub struct StructuralIntegritySystem {
    data: RwLock<IntegrityData>,
}

impl StructuralIntegritySystem {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(IntegrityData::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IntegrityData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IntegrityData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the per-cell tables and reset all destruction state. With floor
    /// auto-detection enabled, cells within the height threshold of the
    /// lowest cell become anchors.
    pub fn initialize(
        &self,
        init: IntegrityInitData,
        settings: StructuralIntegritySettings,
    ) -> Result<(), IntegrityInitError> {
        init.validate()?;
        let cell_count = init.cell_count();

        let mut d = self.write();
        d.neighbors = init.cell_neighbors;
        d.positions = init.cell_positions;
        d.triangles = init.cell_triangles;
        d.settings = settings;
        d.states = vec![CellStructuralState::Normal; cell_count];
        d.destroyed = HashSet::new();
        d.anchors = BTreeSet::new();
        d.connected_cache = HashSet::new();
        d.cache_valid = false;
        d.next_group_id = 0;
        d.initialized = true;

        if d.settings.auto_detect_floor_anchors {
            let threshold = d.settings.floor_height_threshold;
            detect_floor_anchors(&mut d, threshold);
        }
        Ok(())
    }

    pub fn reset(&self) {
        let mut d = self.write();
        *d = IntegrityData::default();
    }

    pub fn cell_count(&self) -> u32 {
        self.read().states.len() as u32
    }

    pub fn set_anchor(&self, cell: u32, is_anchor: bool) {
        let mut d = self.write();
        if !d.is_valid_cell(cell) {
            return;
        }
        if is_anchor {
            d.anchors.insert(cell);
        } else {
            d.anchors.remove(&cell);
        }
        d.cache_valid = false;
    }

    pub fn set_anchors(&self, cells: &[u32], is_anchor: bool) {
        let mut d = self.write();
        for &cell in cells {
            if d.is_valid_cell(cell) {
                if is_anchor {
                    d.anchors.insert(cell);
                } else {
                    d.anchors.remove(&cell);
                }
            }
        }
        d.cache_valid = false;
    }

    /// Replace all anchors with the cells within `height_threshold` of the
    /// lowest cell position.
    pub fn auto_detect_floor_anchors(&self, height_threshold: f32) {
        let mut d = self.write();
        if d.states.is_empty() || d.positions.len() != d.states.len() {
            return;
        }
        d.anchors.clear();
        detect_floor_anchors(&mut d, height_threshold);
    }

    pub fn anchor_cell_ids(&self) -> Vec<u32> {
        self.read().anchors.iter().copied().collect()
    }

    pub fn is_anchor(&self, cell: u32) -> bool {
        self.read().anchors.contains(&cell)
    }

    pub fn anchor_count(&self) -> u32 {
        self.read().anchors.len() as u32
    }

    /// Destroy cells and, if any newly died, recompute connectivity, detach
    /// unreachable cells, and check for total collapse.
    pub fn destroy_cells(&self, cells: &[u32]) -> IntegrityResult {
        let mut result = IntegrityResult::default();
        let mut d = self.write();
        if !d.initialized {
            return result;
        }

        for &cell in cells {
            if d.destroy_cell_internal(cell) {
                result.newly_destroyed.push(cell);
            }
        }
        if result.newly_destroyed.is_empty() {
            return result;
        }

        result.detached_groups = d.update_connectivity_and_find_detached();

        let all_anchors_destroyed = d.anchors.iter().all(|id| d.destroyed.contains(id));
        result.structure_collapsed = all_anchors_destroyed && !d.anchors.is_empty();
        result.total_destroyed = d.destroyed.len() as u32;
        if result.structure_collapsed {
            info!(destroyed = result.total_destroyed, "structure collapsed");
        }
        result
    }

    pub fn destroy_cell(&self, cell: u32) -> IntegrityResult {
        self.destroy_cells(&[cell])
    }

    /// Bulk-inject destroyed state (replication catch-up) and return the
    /// detached groups that result.
    pub fn force_set_destroyed_cells(&self, cells: &[u32]) -> Vec<DetachedCellGroup> {
        let mut d = self.write();
        for &cell in cells {
            if d.is_valid_cell(cell) {
                d.states[cell as usize] = CellStructuralState::Destroyed;
                d.destroyed.insert(cell);
            }
        }
        d.cache_valid = false;
        d.update_connectivity_and_find_detached()
    }

    /// Invalid ids read as `Destroyed`.
    pub fn cell_state(&self, cell: u32) -> CellStructuralState {
        let d = self.read();
        if !d.is_valid_cell(cell) {
            return CellStructuralState::Destroyed;
        }
        d.states[cell as usize]
    }

    /// Reads never recompute: a stale cache answers conservatively
    /// (connected) and the next write path refreshes it.
    pub fn is_cell_connected_to_anchor(&self, cell: u32) -> bool {
        let d = self.read();
        if !d.is_valid_cell(cell) || d.destroyed.contains(&cell) {
            return false;
        }
        if d.cache_valid {
            return d.connected_cache.contains(&cell);
        }
        true
    }

    pub fn destroyed_cell_count(&self) -> u32 {
        self.read().destroyed.len() as u32
    }

    pub fn destroyed_cell_ids(&self) -> Vec<u32> {
        let d = self.read();
        let mut ids: Vec<u32> = d.destroyed.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Invalid ids read as the zero vector.
    pub fn cell_world_position(&self, cell: u32) -> Vec3 {
        let d = self.read();
        if !d.is_valid_cell(cell) || cell as usize >= d.positions.len() {
            return Vec3::ZERO;
        }
        d.positions[cell as usize]
    }

    pub fn set_settings(&self, settings: StructuralIntegritySettings) {
        self.write().settings = settings;
    }
}

/// Anchor every cell within `threshold` above the lowest cell. The min-Z
/// scan runs data-parallel in a pool sized by the configured thread budget;
/// `min` is order-independent so the result matches the serial scan.
fn detect_floor_anchors(d: &mut IntegrityData, threshold: f32) {
    let system = std::thread::available_parallelism().map_or(1, |n| n.get() as u32);
    let threads = d.settings.thread_budget.effective(system) as usize;
    let positions = &d.positions;
    let scan = || {
        positions
            .par_iter()
            .map(|p| p.z)
            .reduce(|| f32::INFINITY, f32::min)
    };
    let min_z = match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(scan),
        // Pool construction failure falls back to the global pool.
        Err(_) => scan(),
    };

    for (cell, p) in d.positions.iter().enumerate() {
        if p.z - min_z <= threshold {
            d.anchors.insert(cell as u32);
        }
    }
    d.cache_valid = false;
}

impl IntegrityData {
    fn is_valid_cell(&self, cell: u32) -> bool {
        (cell as usize) < self.states.len()
    }

    fn destroy_cell_internal(&mut self, cell: u32) -> bool {
        if !self.is_valid_cell(cell) || self.destroyed.contains(&cell) {
            return false;
        }
        self.states[cell as usize] = CellStructuralState::Destroyed;
        self.destroyed.insert(cell);
        self.cache_valid = false;
        true
    }

    fn update_connectivity_and_find_detached(&mut self) -> Vec<DetachedCellGroup> {
        if self.neighbors.is_empty() {
            return Vec::new();
        }

        let connected = self.find_all_connected_to_anchors();
        debug!(connected = connected.len(), "recomputed anchor reachability");
        self.connected_cache = connected;
        self.cache_valid = true;

        let mut detached = Vec::new();
        for cell in 0..self.states.len() as u32 {
            if !self.destroyed.contains(&cell) && !self.connected_cache.contains(&cell) {
                self.states[cell as usize] = CellStructuralState::Detached;
                detached.push(cell);
            }
        }
        if detached.is_empty() {
            return Vec::new();
        }
        self.build_detached_groups(&detached)
    }

    /// BFS from the sorted non-destroyed anchors over the stored neighbor
    /// lists.
    fn find_all_connected_to_anchors(&self) -> HashSet<u32> {
        let mut connected = HashSet::new();
        if self.neighbors.is_empty() || self.anchors.is_empty() {
            return connected;
        }

        let mut queue: VecDeque<u32> = VecDeque::new();
        for &anchor in &self.anchors {
            if !self.destroyed.contains(&anchor) {
                connected.insert(anchor);
                queue.push_back(anchor);
            }
        }

        while let Some(current) = queue.pop_front() {
            let Some(neighbors) = self.neighbors.get(current as usize) else {
                continue;
            };
            for &neighbor in neighbors {
                if !self.destroyed.contains(&neighbor) && connected.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        connected
    }

    fn build_detached_groups(&mut self, detached: &[u32]) -> Vec<DetachedCellGroup> {
        let mut groups = Vec::new();
        let member: HashSet<u32> = detached.iter().copied().collect();
        let mut starts = detached.to_vec();
        starts.sort_unstable();

        let mut visited: HashSet<u32> = HashSet::new();
        for start in starts {
            if !visited.insert(start) {
                continue;
            }
            let mut cell_ids = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                let Some(neighbors) = self.neighbors.get(current as usize) else {
                    continue;
                };
                for &neighbor in neighbors {
                    if member.contains(&neighbor) && visited.insert(neighbor) {
                        cell_ids.push(neighbor);
                        queue.push_back(neighbor);
                    }
                }
            }
            cell_ids.sort_unstable();

            let group_id = self.next_group_id;
            self.next_group_id += 1;
            let center_of_mass = self.center_of_mass(&cell_ids);
            let approximate_mass = cell_ids.len() as f32;
            let triangle_ids = self.collect_triangle_ids(&cell_ids);
            groups.push(DetachedCellGroup {
                group_id,
                cell_ids,
                center_of_mass,
                approximate_mass,
                triangle_ids,
            });
        }
        groups
    }

    fn center_of_mass(&self, cells: &[u32]) -> Vec3 {
        if cells.is_empty() || self.positions.is_empty() {
            return Vec3::ZERO;
        }
        let sum: Vec3 = cells
            .iter()
            .filter_map(|&id| self.positions.get(id as usize))
            .copied()
            .sum();
        sum / cells.len() as f32
    }

    fn collect_triangle_ids(&self, cells: &[u32]) -> Vec<u32> {
        let mut ids: Vec<u32> = cells
            .iter()
            .filter_map(|&id| self.triangles.get(id as usize))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    /// Vertical stack of `n` cells, one unit apart, chain-linked.
    fn tower_init(n: u32) -> IntegrityInitData {
        let mut init = IntegrityInitData::default();
        for i in 0..n {
            let mut neighbors = Vec::new();
            if i > 0 {
                neighbors.push(i - 1);
            }
            if i + 1 < n {
                neighbors.push(i + 1);
            }
            init.cell_neighbors.push(neighbors);
            init.cell_positions.push(vec3(0.0, 0.0, i as f32));
            init.cell_triangles.push(vec![i * 2, i * 2 + 1]);
        }
        init
    }

    fn manual_settings() -> StructuralIntegritySettings {
        StructuralIntegritySettings {
            auto_detect_floor_anchors: false,
            ..StructuralIntegritySettings::default()
        }
    }

    #[test]
    fn initialize_rejects_mismatched_tables() {
        let sys = StructuralIntegritySystem::new();
        let mut init = tower_init(3);
        init.cell_positions.pop();
        assert!(matches!(
            sys.initialize(init, manual_settings()),
            Err(IntegrityInitError::MismatchedTables { .. })
        ));
        assert_eq!(sys.cell_count(), 0);
        assert!(matches!(
            sys.initialize(IntegrityInitData::default(), manual_settings()),
            Err(IntegrityInitError::Empty)
        ));
    }

    #[test]
    fn floor_detection_anchors_the_lowest_layer() {
        let sys = StructuralIntegritySystem::new();
        let settings = StructuralIntegritySettings {
            auto_detect_floor_anchors: true,
            floor_height_threshold: 0.5,
            ..StructuralIntegritySettings::default()
        };
        sys.initialize(tower_init(4), settings).expect("init");
        assert_eq!(sys.anchor_cell_ids(), vec![0]);
        sys.auto_detect_floor_anchors(1.5);
        assert_eq!(sys.anchor_cell_ids(), vec![0, 1]);
    }

    #[test]
    fn floor_detection_honors_the_thread_budget() {
        use crate::settings::ThreadBudget;
        for budget in [
            ThreadBudget::Absolute { max_threads: 1 },
            ThreadBudget::Percentage { percent: 50 },
        ] {
            let sys = StructuralIntegritySystem::new();
            let settings = StructuralIntegritySettings {
                auto_detect_floor_anchors: true,
                floor_height_threshold: 0.5,
                thread_budget: budget,
            };
            sys.initialize(tower_init(4), settings).expect("init");
            assert_eq!(sys.anchor_cell_ids(), vec![0]);
        }
    }

    #[test]
    fn destroying_the_middle_detaches_the_top() {
        let sys = StructuralIntegritySystem::new();
        sys.initialize(tower_init(4), manual_settings()).expect("init");
        sys.set_anchor(0, true);

        let result = sys.destroy_cell(1);
        assert_eq!(result.newly_destroyed, vec![1]);
        assert_eq!(result.detached_groups.len(), 1);
        let group = &result.detached_groups[0];
        assert_eq!(group.group_id, 0);
        assert_eq!(group.cell_ids, vec![2, 3]);
        assert_eq!(group.approximate_mass, 2.0);
        assert_eq!(group.triangle_ids, vec![4, 5, 6, 7]);
        assert!((group.center_of_mass - vec3(0.0, 0.0, 2.5)).length() < 1e-6);
        assert!(!result.structure_collapsed);

        assert_eq!(sys.cell_state(1), CellStructuralState::Destroyed);
        assert_eq!(sys.cell_state(2), CellStructuralState::Detached);
        assert_eq!(sys.cell_state(0), CellStructuralState::Normal);
        assert!(!sys.is_cell_connected_to_anchor(2));
        assert!(sys.is_cell_connected_to_anchor(0));
    }

    #[test]
    fn destroying_twice_is_idempotent() {
        let sys = StructuralIntegritySystem::new();
        sys.initialize(tower_init(3), manual_settings()).expect("init");
        sys.set_anchor(0, true);
        let first = sys.destroy_cell(2);
        assert_eq!(first.newly_destroyed, vec![2]);
        let second = sys.destroy_cell(2);
        assert!(second.newly_destroyed.is_empty());
        assert!(second.detached_groups.is_empty());
        assert_eq!(sys.destroyed_cell_count(), 1);
    }

    #[test]
    fn collapse_requires_anchors() {
        let sys = StructuralIntegritySystem::new();
        sys.initialize(tower_init(2), manual_settings()).expect("init");
        // No anchors: destroying everything is not a collapse.
        let result = sys.destroy_cells(&[0, 1]);
        assert!(!result.structure_collapsed);

        sys.initialize(tower_init(2), manual_settings()).expect("init");
        sys.set_anchor(0, true);
        let result = sys.destroy_cell(0);
        assert!(result.structure_collapsed);
    }

    #[test]
    fn stale_cache_reads_conservatively_connected() {
        let sys = StructuralIntegritySystem::new();
        sys.initialize(tower_init(3), manual_settings()).expect("init");
        sys.set_anchor(0, true);
        // Anchor change invalidated the cache and nothing recomputed yet.
        assert!(sys.is_cell_connected_to_anchor(2));
        sys.destroy_cell(1);
        assert!(!sys.is_cell_connected_to_anchor(2));
    }

    #[test]
    fn invalid_ids_read_as_neutral() {
        let sys = StructuralIntegritySystem::new();
        sys.initialize(tower_init(2), manual_settings()).expect("init");
        assert_eq!(sys.cell_state(99), CellStructuralState::Destroyed);
        assert_eq!(sys.cell_world_position(99), Vec3::ZERO);
        assert!(!sys.is_cell_connected_to_anchor(99));
        assert!(sys.destroy_cell(99).newly_destroyed.is_empty());
    }

    #[test]
    fn force_set_returns_detached_groups() {
        let sys = StructuralIntegritySystem::new();
        sys.initialize(tower_init(5), manual_settings()).expect("init");
        sys.set_anchor(0, true);
        let groups = sys.force_set_destroyed_cells(&[2]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].cell_ids, vec![3, 4]);
        assert_eq!(sys.destroyed_cell_ids(), vec![2]);
    }
}
