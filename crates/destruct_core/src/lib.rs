//! destruct_core: cell destruction algorithms and batching.
//!
//! Scope
//! - `CellState` / `SubCellMask`: per-object destruction state (whole-cell
//!   set plus optional 2x2x2 sub-cell bitmasks).
//! - `destruction`: stateless algorithms over a `GridCellCache`: shape-based
//!   damage classification, anchor-reachability BFS at cell and sub-cell
//!   granularity, detached-group formation, debris utilities.
//! - `DestructionBatchProcessor`: fixed-interval impact batching that runs
//!   one connectivity pass per batch and emits a replication-ready event.
//!
//! Everything here is deterministic for identical inputs: scans ascend by
//! cell id, BFS seeds are sorted, and neighbor lists are walked in their
//! stored order.

#![forbid(unsafe_code)]

pub mod batch;
pub mod config;
pub mod destruction;
pub mod events;
pub mod state;
pub mod subcell;

pub use batch::{BatchContext, DestructionBatchProcessor, BATCH_INTERVAL};
pub use config::DestructConfig;
pub use events::{BatchedDestructionEvent, DestructionResult, DetachedDebris};
pub use state::{cell_damage_level, CellDamageLevel, CellState, SubCellMask};
