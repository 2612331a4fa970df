//! Readers query connectivity while a writer destroys cells; reads must
//! stay consistent (conservative when stale) and the final state exact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use glam::vec3;
use integrity_core::{
    CellStructuralState, IntegrityInitData, StructuralIntegritySettings, StructuralIntegritySystem,
};

fn chain_init(n: u32) -> IntegrityInitData {
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
        init.cell_positions.push(vec3(i as f32, 0.0, 0.0));
        init.cell_triangles.push(vec![i]);
    }
    init
}

#[test]
fn readers_run_alongside_a_writer() {
    let sys = Arc::new(StructuralIntegritySystem::new());
    sys.initialize(
        chain_init(64),
        StructuralIntegritySettings {
            auto_detect_floor_anchors: false,
            ..StructuralIntegritySettings::default()
        },
    )
    .expect("init");
    sys.set_anchor(0, true);

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let sys = Arc::clone(&sys);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                for cell in 0..64 {
                    // Destruction is monotonic: a cell seen destroyed can
                    // never be reported connected afterwards.
                    if sys.cell_state(cell) == CellStructuralState::Destroyed {
                        assert!(!sys.is_cell_connected_to_anchor(cell));
                    }
                }
            }
        }));
    }

    // Cut the chain progressively from the middle outward.
    for cell in 32..48 {
        let result = sys.destroy_cell(cell);
        if cell == 32 {
            // First cut detaches everything past it.
            assert_eq!(result.detached_groups.len(), 1);
            assert_eq!(result.detached_groups[0].cell_ids.len(), 31);
        }
    }
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        r.join().expect("reader");
    }

    assert_eq!(sys.destroyed_cell_count(), 16);
    assert!(sys.is_cell_connected_to_anchor(10));
    assert!(!sys.is_cell_connected_to_anchor(60));
    assert_eq!(sys.cell_state(60), CellStructuralState::Detached);
}
