//! End-to-end batch scenario: breaching a wall column detaches the far side
//! as one debris group, deterministically.

use cell_grid::{GridCellCache, GridCellCacheBuilder, GridMeta, MeshTransform};
use destruct_core::{
    BatchContext, BatchedDestructionEvent, CellState, DestructConfig, DestructionBatchProcessor,
};
use glam::{uvec3, vec3, Vec3};
use shape_model::DestructShape;

/// 5 wide, 3 tall, 1 deep wall; only the bottom-left cell is anchored.
fn wall() -> GridCellCache {
    let mut b = GridCellCacheBuilder::new(GridMeta {
        grid_size: uvec3(5, 1, 3),
        cell_size: Vec3::ONE,
        origin: Vec3::ZERO,
    })
    .expect("meta");
    for id in 0..15 {
        b.add_cell(id, id == 0, Vec::new()).expect("add");
    }
    b.build()
}

fn breach_column() -> DestructShape {
    // Covers the centers of the x=2 column without touching neighbor corners.
    DestructShape::Box {
        center: vec3(2.5, 0.5, 1.5),
        half_extent: vec3(0.4, 0.5, 1.5),
        rotation_deg: Vec3::ZERO,
    }
}

fn run_breach() -> (BatchedDestructionEvent, CellState) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let cache = wall();
    let mut state = CellState::new();
    let mut p = DestructionBatchProcessor::new(DestructConfig::default());
    p.queue_destruction(&breach_column());
    p.flush(Some(BatchContext {
        cache: &cache,
        state: &mut state,
        mesh_transform: MeshTransform::IDENTITY,
    }));
    (p.last_batch().clone(), state)
}

#[test]
fn breach_detaches_the_far_side_as_one_group() {
    let (event, state) = run_breach();

    // Column x=2 dies to the impact; columns x=3,4 detach.
    assert_eq!(
        event.destroyed_cell_ids,
        vec![2, 7, 12, 3, 4, 8, 9, 13, 14]
    );
    assert_eq!(event.debris.len(), 1);
    let debris = &event.debris[0];
    assert_eq!(debris.cell_ids, vec![3, 4, 8, 9, 13, 14]);
    assert!((debris.location - vec3(4.0, 0.5, 1.5)).length() < 1e-4);
    // Launched away from the impact along +X.
    assert!(debris.velocity.x > 400.0);
    assert!(debris.velocity.y.abs() < 1e-3 && debris.velocity.z.abs() < 1e-3);

    // The anchored side still stands.
    for id in [0u32, 1, 5, 6, 10, 11] {
        assert!(!state.destroyed.contains(&id));
    }
    assert_eq!(state.destroyed.len(), 9);
}

#[test]
fn repeated_runs_are_identical() {
    let (a, _) = run_breach();
    let (b, _) = run_breach();
    assert_eq!(a, b);
}

#[test]
fn event_survives_the_wire() {
    let (event, _) = run_breach();
    let mut buf = Vec::new();
    event.encode(&mut buf);
    let mut slice: &[u8] = &buf;
    let back = BatchedDestructionEvent::decode(&mut slice).expect("decode");
    assert_eq!(event, back);
}
