//! Tunables for destruction processing.

use serde::{Deserialize, Serialize};

/// Host-facing configuration. Defaults match the shipped behavior: 60 Hz
/// batching and a 500 unit/s debris launch speed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DestructConfig {
    /// Seconds between batch processing passes.
    pub batch_interval: f32,
    /// Debris launch speed in world units per second.
    pub base_debris_speed: f32,
}

impl Default for DestructConfig {
    fn default() -> Self {
        Self {
            batch_interval: crate::batch::BATCH_INTERVAL,
            base_debris_speed: 500.0,
        }
    }
}
