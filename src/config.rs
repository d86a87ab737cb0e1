//! Simulation configuration.

use crate::error::{SimError, SimResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Global simulation settings.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimConfig {
    /// Seed from which every random draw in the simulation is derived.
    pub seed: u64,
    /// The duration of one tick in s.
    pub tick_duration: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            tick_duration: 0.1,
        }
    }
}

impl SimConfig {
    /// Creates a config with the given seed and tick duration.
    pub fn new(seed: u64, tick_duration: f64) -> Self {
        Self {
            seed,
            tick_duration,
        }
    }

    /// Checks that the config is usable.
    pub fn validate(&self) -> SimResult<()> {
        if self.tick_duration.is_finite() && self.tick_duration > 0.0 {
            Ok(())
        } else {
            Err(SimError::InvalidConfig(format!(
                "tick duration must be positive, got {}",
                self.tick_duration
            )))
        }
    }
}
