//! Per-object destruction state.

use std::collections::{HashMap, HashSet};

use crate::subcell::SUBCELL_COUNT;

/// 2x2x2 sub-cell occupancy for one cell. Bit i set means sub-cell i is
/// dead. A cell with no stored mask is fully intact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubCellMask(pub u8);

impl SubCellMask {
    pub const FULLY_DESTROYED: Self = Self(0xff);

    #[inline]
    pub fn is_alive(self, sub: u8) -> bool {
        sub < SUBCELL_COUNT && self.0 & (1 << sub) == 0
    }

    #[inline]
    pub fn kill(&mut self, sub: u8) {
        if sub < SUBCELL_COUNT {
            self.0 |= 1 << sub;
        }
    }

    #[inline]
    pub fn is_fully_destroyed(self) -> bool {
        self.0 == 0xff
    }

    #[inline]
    pub fn live_count(self) -> u32 {
        u32::from(SUBCELL_COUNT) - u32::from(self.0.count_ones() as u8)
    }
}

/// Mutable destruction state for one destructible object. Invariant: every
/// cell in `destroyed` has no live sub-cells, and a cell absent from
/// `sub_cells` has all 8 sub-cells alive.
#[derive(Clone, Debug, Default)]
pub struct CellState {
    pub destroyed: HashSet<u32>,
    pub sub_cells: HashMap<u32, SubCellMask>,
}

impl CellState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sub_cell_alive(&self, cell: u32, sub: u8) -> bool {
        if self.destroyed.contains(&cell) {
            return false;
        }
        match self.sub_cells.get(&cell) {
            Some(mask) => mask.is_alive(sub),
            None => sub < SUBCELL_COUNT,
        }
    }

    /// Mark a whole cell destroyed, keeping the sub-cell mask consistent.
    pub fn mark_destroyed(&mut self, cell: u32) {
        self.destroyed.insert(cell);
        self.sub_cells.insert(cell, SubCellMask::FULLY_DESTROYED);
    }

    /// Kill one sub-cell. Returns `true` when the sub-cell was alive before
    /// the call. Promotes the cell into `destroyed` once the mask fills.
    pub fn kill_sub_cell(&mut self, cell: u32, sub: u8) -> bool {
        if sub >= SUBCELL_COUNT || self.destroyed.contains(&cell) {
            return false;
        }
        let mask = self.sub_cells.entry(cell).or_default();
        if !mask.is_alive(sub) {
            return false;
        }
        mask.kill(sub);
        if mask.is_fully_destroyed() {
            self.destroyed.insert(cell);
        }
        true
    }

    pub fn reset(&mut self) {
        self.destroyed.clear();
        self.sub_cells.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellDamageLevel {
    Intact,
    Damaged,
    Destroyed,
}

pub fn cell_damage_level(state: &CellState, cell: u32) -> CellDamageLevel {
    if state.destroyed.contains(&cell) {
        return CellDamageLevel::Destroyed;
    }
    match state.sub_cells.get(&cell) {
        None => CellDamageLevel::Intact,
        Some(mask) if mask.is_fully_destroyed() => CellDamageLevel::Destroyed,
        Some(mask) if mask.0 == 0 => CellDamageLevel::Intact,
        Some(_) => CellDamageLevel::Damaged,
    }
}
