//! Fixed-interval impact batching.
//!
//! Impacts queue as quantized shapes and a whole batch resolves in one pass:
//! one damage scan per input, then exactly one connectivity BFS regardless
//! of how many impacts landed that frame.

use std::collections::BTreeSet;

use cell_grid::{GridCellCache, MeshTransform};
use shape_model::{DestructShape, QuantizedShape};
use tracing::{info, warn};

use crate::config::DestructConfig;
use crate::destruction;
use crate::events::{BatchedDestructionEvent, DetachedDebris};
use crate::state::CellState;

/// Seconds between batch passes at the default 60 Hz cadence.
pub const BATCH_INTERVAL: f32 = 1.0 / 60.0;

/// Borrowed world context for one processing call. The processor holds no
/// references between calls; the caller lends what a batch needs.
pub struct BatchContext<'a> {
    pub cache: &'a GridCellCache,
    pub state: &'a mut CellState,
    pub mesh_transform: MeshTransform,
}

/// Accumulates impacts and resolves them in fixed-interval batches.
#[derive(Default)]
pub struct DestructionBatchProcessor {
    config: DestructConfig,
    pending: Vec<QuantizedShape>,
    accumulated: f32,
    last_batch: BatchedDestructionEvent,
    debris_counter: u32,
}

impl DestructionBatchProcessor {
    pub fn new(config: DestructConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Quantize and enqueue an impact for the next batch.
    pub fn queue_destruction(&mut self, shape: &DestructShape) {
        self.pending.push(QuantizedShape::from_shape(shape));
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Result of the most recent processed batch.
    pub fn last_batch(&self) -> &BatchedDestructionEvent {
        &self.last_batch
    }

    /// Advance time; once a full interval has elapsed with impacts pending,
    /// reset the timer and run exactly one batch. Returns whether a batch
    /// ran this call.
    pub fn tick(&mut self, dt: f32, ctx: Option<BatchContext<'_>>) -> bool {
        self.accumulated += dt;
        if self.accumulated >= self.config.batch_interval && !self.pending.is_empty() {
            self.accumulated = 0.0;
            self.process_batch(ctx);
            return true;
        }
        false
    }

    /// Process any pending impacts immediately and reset the timer.
    pub fn flush(&mut self, ctx: Option<BatchContext<'_>>) {
        if !self.pending.is_empty() {
            self.process_batch(ctx);
            self.accumulated = 0.0;
        }
    }

    fn process_batch(&mut self, ctx: Option<BatchContext<'_>>) {
        let Some(ctx) = ctx else {
            warn!(
                pending = self.pending.len(),
                "destruction batch due without context; dropping queue"
            );
            self.pending.clear();
            return;
        };

        self.last_batch = BatchedDestructionEvent {
            inputs: self.pending.clone(),
            ..BatchedDestructionEvent::default()
        };

        // Damage scan per input, unioned before any state change.
        let mut newly_destroyed: BTreeSet<u32> = BTreeSet::new();
        for input in &self.pending {
            for cell in destruction::calculate_destroyed_cells(
                ctx.cache,
                input,
                &ctx.mesh_transform,
                &ctx.state.destroyed,
            ) {
                newly_destroyed.insert(cell);
            }
        }
        if newly_destroyed.is_empty() {
            self.pending.clear();
            return;
        }

        for &cell in &newly_destroyed {
            ctx.state.mark_destroyed(cell);
        }

        // One connectivity pass for the whole batch.
        let disconnected = destruction::find_disconnected_cells(ctx.cache, &ctx.state.destroyed);
        let groups = destruction::group_detached_cells(ctx.cache, &disconnected);

        for group in &groups {
            for &cell in group {
                ctx.state.mark_destroyed(cell);
            }
        }

        self.last_batch.destroyed_cell_ids = newly_destroyed.iter().copied().collect();
        for group in &groups {
            self.debris_counter += 1;
            self.last_batch.destroyed_cell_ids.extend_from_slice(group);
            let location = destruction::group_center(ctx.cache, group, &ctx.mesh_transform);
            let velocity = destruction::debris_velocity(
                location,
                &self.last_batch.inputs,
                self.config.base_debris_speed,
            );
            self.last_batch.debris.push(DetachedDebris {
                debris_id: self.debris_counter,
                cell_ids: group.clone(),
                location,
                velocity,
            });
        }

        self.pending.clear();
        info!(
            destroyed = self.last_batch.destroyed_cell_ids.len(),
            debris = self.last_batch.debris.len(),
            "processed destruction batch"
        );
    }
}
