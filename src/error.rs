//! Error types.

use crate::{LaneId, VehicleId};
use thiserror::Error;

/// An error raised by the simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// A vehicle attribute was outside its permitted range.
    #[error("invalid attribute `{field}` = {value}: {reason}")]
    InvalidAttribute {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// The simulation configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The road network is malformed; the simulation cannot proceed.
    #[error("perception inconsistency: {0}")]
    PerceptionInconsistency(String),

    #[error("lane {0:?} does not exist")]
    UnknownLane(LaneId),

    #[error("vehicle {0:?} does not exist")]
    UnknownVehicle(VehicleId),

    /// A controller could not produce a decision for one vehicle.
    /// The vehicle falls back to an emergency stop for the tick.
    #[error("controller failure for vehicle {vehicle:?}: {reason}")]
    Controller {
        vehicle: VehicleId,
        reason: String,
    },
}

impl SimError {
    /// Whether the error must abort the simulation, rather than being
    /// isolated to a single vehicle.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SimError::Controller { .. })
    }
}

/// Shorthand result type.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_controller_errors_are_isolated() {
        let err = SimError::Controller {
            vehicle: VehicleId::default(),
            reason: "leader vanished".into(),
        };
        assert!(!err.is_fatal());
        assert!(SimError::PerceptionInconsistency("no adjacency".into()).is_fatal());
        assert!(SimError::UnknownLane(LaneId::default()).is_fatal());
    }
}
