//! Integrity tuning and worker-count policy.

use serde::{Deserialize, Serialize};

/// Worker-count policy for parallel scans. `Absolute` caps at a fixed count,
/// `Percentage` takes a share of the system's logical cores; both clamp into
/// `1..=system`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThreadBudget {
    Absolute { max_threads: u32 },
    Percentage { percent: u32 },
}

impl ThreadBudget {
    pub fn effective(&self, system_threads: u32) -> u32 {
        let system = system_threads.max(1);
        match *self {
            ThreadBudget::Absolute { max_threads } => max_threads.clamp(1, system),
            ThreadBudget::Percentage { percent } => {
                let calculated = (system as f32 * percent as f32 / 100.0).ceil() as u32;
                calculated.clamp(1, system)
            }
        }
    }
}

impl Default for ThreadBudget {
    fn default() -> Self {
        ThreadBudget::Absolute { max_threads: 8 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralIntegritySettings {
    /// Anchor the lowest layer of cells automatically during initialize.
    pub auto_detect_floor_anchors: bool,
    /// Cells within this height above the lowest cell become anchors.
    pub floor_height_threshold: f32,
    pub thread_budget: ThreadBudget,
}

impl Default for StructuralIntegritySettings {
    fn default() -> Self {
        Self {
            auto_detect_floor_anchors: true,
            floor_height_threshold: 50.0,
            thread_budget: ThreadBudget::default(),
        }
    }
}
