//! Driver and vehicle tuning attributes.

use crate::error::{SimError, SimResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Metres in a mile, used to convert `lane_change_frequency`.
pub const METRES_PER_MILE: f64 = 1609.344;

/// The tunable attributes of a simulated vehicle and its driver,
/// as supplied by an external collaborator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct CarAttributes {
    /// Cosmetic only; passed through untouched.
    pub color: String,
    /// The initial velocity in m/s.
    pub velocity: f64,
    /// The preferred maximum speed in m/s.
    pub max_speed: f64,
    /// How quickly the vehicle speeds up, in m/s<sup>2</sup>.
    pub acceleration: f64,
    /// How hard the vehicle can brake, a positive number in m/s<sup>2</sup>.
    pub deceleration: f64,
    /// 0-1 scale.
    pub aggression_level: f64,
    /// Time to respond to changes, in s.
    pub reaction_time: f64,
    /// 0-1 scale, willingness to take chances.
    pub risk_tolerance: f64,
    /// 0-1 scale, smoothness of control.
    pub experience_level: f64,
    /// 0-1 scale, reduces attention.
    pub distraction_level: f64,
    /// Minimum following distance in m.
    pub tailgate_distance: f64,
    /// Preferred following distance in s.
    pub following_distance: f64,
    /// Lane changes considered per mile travelled.
    pub lane_change_frequency: f64,
    /// 0-1 scale, how forcefully the driver merges.
    pub merge_aggression: f64,
    /// 0-1 scale, reliability of signalling.
    pub turn_signal_usage: f64,
    /// Patience at intersections, in s.
    pub wait_time: f64,
    /// 0-1 scale, 0 = always stop, 1 = always go.
    pub yellow_light_behavior: f64,
    /// 0-1 scale, how completely the driver stops.
    pub stop_sign_compliance: f64,
}

impl Default for CarAttributes {
    fn default() -> Self {
        Self {
            color: String::from("#808080"),
            velocity: 0.0,
            max_speed: 27.0,
            acceleration: 2.5,
            deceleration: 6.0,
            aggression_level: 0.3,
            reaction_time: 0.8,
            risk_tolerance: 0.3,
            experience_level: 0.6,
            distraction_level: 0.1,
            tailgate_distance: 2.0,
            following_distance: 1.8,
            lane_change_frequency: 4.0,
            merge_aggression: 0.4,
            turn_signal_usage: 0.9,
            wait_time: 5.0,
            yellow_light_behavior: 0.3,
            stop_sign_compliance: 0.95,
        }
    }
}

/// A validated, immutable snapshot of one vehicle's [CarAttributes].
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeProfile {
    attrs: CarAttributes,
}

impl AttributeProfile {
    /// Validates the attributes. Out-of-range values are rejected rather than clamped.
    pub fn new(attrs: CarAttributes) -> SimResult<Self> {
        let a = &attrs;
        unit("aggression_level", a.aggression_level)?;
        unit("risk_tolerance", a.risk_tolerance)?;
        unit("experience_level", a.experience_level)?;
        unit("distraction_level", a.distraction_level)?;
        unit("merge_aggression", a.merge_aggression)?;
        unit("turn_signal_usage", a.turn_signal_usage)?;
        unit("yellow_light_behavior", a.yellow_light_behavior)?;
        unit("stop_sign_compliance", a.stop_sign_compliance)?;
        non_negative("velocity", a.velocity)?;
        positive("max_speed", a.max_speed)?;
        positive("acceleration", a.acceleration)?;
        positive("deceleration", a.deceleration)?;
        non_negative("reaction_time", a.reaction_time)?;
        non_negative("following_distance", a.following_distance)?;
        non_negative("tailgate_distance", a.tailgate_distance)?;
        non_negative("lane_change_frequency", a.lane_change_frequency)?;
        non_negative("wait_time", a.wait_time)?;
        Ok(Self { attrs })
    }

    /// The underlying attribute record.
    pub fn attributes(&self) -> &CarAttributes {
        &self.attrs
    }

    pub fn color(&self) -> &str {
        &self.attrs.color
    }

    pub fn initial_velocity(&self) -> f64 {
        self.attrs.velocity
    }

    pub fn max_speed(&self) -> f64 {
        self.attrs.max_speed
    }

    pub fn acceleration(&self) -> f64 {
        self.attrs.acceleration
    }

    pub fn deceleration(&self) -> f64 {
        self.attrs.deceleration
    }

    pub fn aggression(&self) -> f64 {
        self.attrs.aggression_level
    }

    pub fn reaction_time(&self) -> f64 {
        self.attrs.reaction_time
    }

    pub fn risk_tolerance(&self) -> f64 {
        self.attrs.risk_tolerance
    }

    pub fn experience(&self) -> f64 {
        self.attrs.experience_level
    }

    pub fn distraction(&self) -> f64 {
        self.attrs.distraction_level
    }

    pub fn tailgate_distance(&self) -> f64 {
        self.attrs.tailgate_distance
    }

    pub fn following_distance(&self) -> f64 {
        self.attrs.following_distance
    }

    pub fn merge_aggression(&self) -> f64 {
        self.attrs.merge_aggression
    }

    pub fn turn_signal_usage(&self) -> f64 {
        self.attrs.turn_signal_usage
    }

    pub fn wait_time(&self) -> f64 {
        self.attrs.wait_time
    }

    pub fn yellow_light_behavior(&self) -> f64 {
        self.attrs.yellow_light_behavior
    }

    pub fn stop_sign_compliance(&self) -> f64 {
        self.attrs.stop_sign_compliance
    }

    /// The distance in m which must be travelled between two lane change intents,
    /// or `None` if the driver never changes lanes.
    pub fn lane_change_interval(&self) -> Option<f64> {
        let freq = self.attrs.lane_change_frequency;
        (freq > 0.0).then(|| METRES_PER_MILE / freq)
    }

    /// How far the driver is willing to shrink their following gap, 0-1.
    pub(crate) fn gap_relaxation(&self) -> f64 {
        0.5 * self.attrs.aggression_level + 0.5 * self.attrs.risk_tolerance
    }

    /// How small a gap the driver will accept when merging, 0-1.
    pub(crate) fn merge_acceptance(&self) -> f64 {
        0.7 * self.attrs.merge_aggression + 0.3 * self.attrs.risk_tolerance
    }
}

impl TryFrom<CarAttributes> for AttributeProfile {
    type Error = SimError;

    fn try_from(attrs: CarAttributes) -> SimResult<Self> {
        Self::new(attrs)
    }
}

fn finite(field: &'static str, value: f64) -> SimResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimError::InvalidAttribute {
            field,
            value,
            reason: "must be finite",
        })
    }
}

fn unit(field: &'static str, value: f64) -> SimResult<()> {
    finite(field, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimError::InvalidAttribute {
            field,
            value,
            reason: "must lie in [0, 1]",
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> SimResult<()> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidAttribute {
            field,
            value,
            reason: "must not be negative",
        })
    }
}

fn positive(field: &'static str, value: f64) -> SimResult<()> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidAttribute {
            field,
            value,
            reason: "must be positive",
        })
    }
}
