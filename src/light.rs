#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A traffic signal following a fixed, repeating phase timeline.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The phases, in order.
    phases: Vec<Phase>,
    /// The total duration of one cycle in s.
    cycle: f64,
    /// The time into the cycle at simulation time zero, in s.
    offset: f64,
}

/// A single phase of a signal timeline.
#[derive(Clone, Copy, Debug)]
pub struct Phase {
    /// The state displayed during the phase.
    pub state: LightState,
    /// The duration of the phase in s.
    pub duration: f64,
}

/// The state of a traffic signal.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LightState {
    Red,
    Yellow,
    Green,
}

impl TrafficLight {
    /// Creates a traffic light from a phase timeline.
    /// Phases with a non-positive duration are ignored.
    /// Returns `None` if no phase remains.
    pub fn new(phases: &[Phase], offset: f64) -> Option<Self> {
        let phases = phases
            .iter()
            .copied()
            .filter(|p| p.duration.is_finite() && p.duration > 0.0)
            .collect::<Vec<_>>();
        let cycle = phases.iter().map(|p| p.duration).sum::<f64>();
        if phases.is_empty() || !offset.is_finite() {
            return None;
        }
        Some(Self {
            phases,
            cycle,
            offset: offset.rem_euclid(cycle),
        })
    }

    /// Creates a conventional green-yellow-red signal.
    pub fn fixed_time(green: f64, yellow: f64, red: f64, offset: f64) -> Option<Self> {
        use LightState::*;
        Self::new(
            &[
                Phase { state: Green, duration: green },
                Phase { state: Yellow, duration: yellow },
                Phase { state: Red, duration: red },
            ],
            offset,
        )
    }

    /// Gets the state of the light at the given simulation time,
    /// and the time remaining in that state in s.
    pub fn state_at(&self, time: f64) -> (LightState, f64) {
        let mut t = (time + self.offset).rem_euclid(self.cycle);
        for phase in &self.phases {
            if t < phase.duration {
                return (phase.state, phase.duration - t);
            }
            t -= phase.duration;
        }
        // Only reachable through rounding at the very end of the cycle.
        let first = self.phases[0];
        (first.state, first.duration)
    }

    /// The length of one full cycle in s.
    pub fn cycle(&self) -> f64 {
        self.cycle
    }
}
