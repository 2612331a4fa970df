//! integrity_core: thread-safe structural integrity facade.
//!
//! Scope
//! - `StructuralIntegritySystem`: a single `RwLock` over flat per-cell
//!   tables plus destruction/anchor/connectivity state. Writers destroy
//!   cells and recompute anchor reachability; readers answer queries from
//!   the cached result without ever recomputing.
//! - `StructuralIntegritySettings` / `ThreadBudget`: tuning, including the
//!   worker-count policy for the parallel initializer scan.
//!
//! The connectivity cache invalidates on every mutation. A reader that
//! finds the cache stale answers conservatively (connected) rather than
//! taking the write path.

#![forbid(unsafe_code)]

mod settings;
mod system;

pub use settings::{StructuralIntegritySettings, ThreadBudget};
pub use system::{
    CellStructuralState, DetachedCellGroup, IntegrityInitData, IntegrityInitError,
    IntegrityResult, StructuralIntegritySystem,
};
