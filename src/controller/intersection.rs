use super::longitudinal::stopping_distance;
use crate::light::LightState;
use crate::network::ControlKind;
use crate::perception::ControlAhead;
use crate::rng::VehicleRng;
use crate::vehicle::Vehicle;
use crate::ControlId;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A vehicle halted within this distance of a stop sign has stopped at it, in m.
/// This band is what counts as "at the line".
pub const STOP_ZONE: f64 = 3.0; // m

/// The highest speed at which a rolling stop still counts as stopping, in m/s.
pub const ROLLING_STOP_SPEED: f64 = 2.0; // m/s

/// The speed non-compliant drivers slow to at a stop sign, in m/s.
const ROLLING_CRAWL_SPEED: f64 = 1.0; // m/s

/// Where a vehicle is in its passage through a controlled point.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntersectionPhase {
    Approaching,
    /// Halted at a stop sign, having arrived at the given time in s.
    Stopped { arrived: f64 },
    /// Waiting at a stop sign for right of way.
    Waiting { arrived: f64 },
    /// Deciding whether to stop for a signal.
    Evaluating,
    /// Stopping for a signal, flat out if `emergency`.
    Stopping { emergency: bool },
    /// Committed to crossing the line.
    Proceeding,
}

/// The intersection model's state for one control point.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntersectionState {
    pub control: ControlId,
    pub phase: IntersectionPhase,
    /// Whether the driver makes a rolling stop at this stop sign.
    pub rolling: bool,
}

/// What the intersection model asks of the longitudinal model.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntersectionAction {
    /// There is no control point ahead.
    None,
    /// Stop before the line, or slow to `crawl_speed` as it is reached.
    StopAt { distance: f64, crawl_speed: f64 },
    Proceed,
    EmergencyStop,
}

/// Runs the intersection model of a vehicle for one tick.
///
/// The model is re-instantiated whenever the next control point changes;
/// `rng` is only drawn from then, deciding whether the driver complies with
/// a stop sign.
pub(crate) fn step(
    vehicle: &Vehicle,
    control: Option<&ControlAhead>,
    rng: &mut VehicleRng,
    time: f64,
) -> (Option<IntersectionState>, IntersectionAction) {
    let Some(control) = control else {
        return (None, IntersectionAction::None);
    };

    let mut state = match vehicle.intersection() {
        Some(state) if state.control == control.id => *state,
        _ => {
            let compliance = vehicle.profile().stop_sign_compliance();
            let rolling = match control.kind {
                ControlKind::StopSign { .. } => rng.gen_bool(1.0 - compliance),
                ControlKind::Signal { .. } => false,
            };
            IntersectionState {
                control: control.id,
                phase: IntersectionPhase::Approaching,
                rolling,
            }
        }
    };

    let action = match control.signal {
        None => stop_sign(vehicle, control, &mut state, time),
        Some((light, remaining)) => signal(vehicle, control, &mut state, light, remaining),
    };
    (Some(state), action)
}

fn stop_sign(
    vehicle: &Vehicle,
    control: &ControlAhead,
    state: &mut IntersectionState,
    time: f64,
) -> IntersectionAction {
    use IntersectionPhase::*;

    let distance = control.distance;
    let hold = IntersectionAction::StopAt {
        distance,
        crawl_speed: 0.0,
    };
    match state.phase {
        Approaching => {
            let halted = vehicle.has_stopped()
                || (state.rolling && vehicle.vel() <= ROLLING_STOP_SPEED);
            if distance <= STOP_ZONE && halted {
                state.phase = Stopped { arrived: time };
                return hold;
            }
            let crawl_speed = if state.rolling {
                ROLLING_CRAWL_SPEED
            } else {
                0.0
            };
            IntersectionAction::StopAt {
                distance,
                crawl_speed,
            }
        }
        Stopped { arrived } => {
            state.phase = Waiting { arrived };
            hold
        }
        Waiting { .. } => hold,
        _ => IntersectionAction::Proceed,
    }
}

fn signal(
    vehicle: &Vehicle,
    control: &ControlAhead,
    state: &mut IntersectionState,
    light: LightState,
    remaining: f64,
) -> IntersectionAction {
    use IntersectionPhase::*;

    let distance = control.distance;
    let vel = vehicle.vel();
    let max_dec = vehicle.profile().deceleration();
    let stop = IntersectionAction::StopAt {
        distance,
        crawl_speed: 0.0,
    };

    match state.phase {
        Proceeding => return IntersectionAction::Proceed,
        Stopping { .. } if light == LightState::Green => {
            // Free to go, but not committed until the line is reached
            state.phase = Approaching;
            return IntersectionAction::Proceed;
        }
        Stopping { emergency: true } if vel > 0.0 => return IntersectionAction::EmergencyStop,
        Stopping { .. } => {
            state.phase = Stopping { emergency: false };
            return stop;
        }
        Approaching if light == LightState::Green => return IntersectionAction::Proceed,
        _ => {}
    }

    state.phase = Evaluating;
    if distance <= 0.0 {
        // Already over the line
        state.phase = Proceeding;
        return IntersectionAction::Proceed;
    }

    let can_stop = stopping_distance(vel, max_dec) <= distance;
    let can_go = light == LightState::Yellow && vel > 0.0 && distance / vel <= remaining;
    let go = match (can_stop, can_go) {
        (true, true) => {
            // The harder the stop, the more drivers will go for it
            let required = vel.powi(2) / (2.0 * distance);
            vehicle.profile().yellow_light_behavior() > 1.0 - required / max_dec
        }
        (false, true) => true,
        (true, false) => false,
        (false, false) => {
            state.phase = Stopping { emergency: true };
            return IntersectionAction::EmergencyStop;
        }
    };

    if go {
        state.phase = Proceeding;
        IntersectionAction::Proceed
    } else {
        state.phase = Stopping { emergency: false };
        stop
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attributes::{AttributeProfile, CarAttributes};
    use crate::rng::Stream;
    use crate::{JunctionId, LaneId, TrafficLightId, VehicleId};

    fn vehicle(vel: f64, attrs: CarAttributes) -> Vehicle {
        let profile = AttributeProfile::new(CarAttributes {
            velocity: vel,
            ..attrs
        })
        .unwrap();
        Vehicle::new(VehicleId::default(), profile, LaneId::default(), 0.0)
    }

    fn signal_ahead(distance: f64, light: LightState, remaining: f64) -> ControlAhead {
        ControlAhead {
            id: ControlId::default(),
            distance,
            kind: ControlKind::Signal {
                light: TrafficLightId::default(),
            },
            signal: Some((light, remaining)),
        }
    }

    fn stop_sign_ahead(distance: f64) -> ControlAhead {
        ControlAhead {
            id: ControlId::default(),
            distance,
            kind: ControlKind::StopSign {
                junction: JunctionId::default(),
            },
            signal: None,
        }
    }

    fn run(vehicle: &Vehicle, control: &ControlAhead) -> (IntersectionState, IntersectionAction) {
        let mut rng = VehicleRng::new(0, vehicle.id(), 0, Stream::Intersection);
        let (state, action) = step(vehicle, Some(control), &mut rng, 0.0);
        (state.unwrap(), action)
    }

    #[test]
    fn no_control_no_action() {
        let veh = vehicle(10.0, CarAttributes::default());
        let mut rng = VehicleRng::new(0, veh.id(), 0, Stream::Intersection);
        assert_eq!(step(&veh, None, &mut rng, 0.0), (None, IntersectionAction::None));
    }

    #[test]
    fn green_light_proceeds_without_committing() {
        let veh = vehicle(15.0, CarAttributes::default());
        let (state, action) = run(&veh, &signal_ahead(50.0, LightState::Green, 10.0));
        assert_eq!(action, IntersectionAction::Proceed);
        assert_eq!(state.phase, IntersectionPhase::Approaching);
    }

    #[test]
    fn red_light_stops_or_brakes_hard() {
        let veh = vehicle(15.0, CarAttributes::default());
        let (state, action) = run(&veh, &signal_ahead(50.0, LightState::Red, 10.0));
        assert!(matches!(action, IntersectionAction::StopAt { .. }));
        assert_eq!(state.phase, IntersectionPhase::Stopping { emergency: false });

        // 15 m/s needs 18.75 m to stop at 6 m/s^2
        let (state, action) = run(&veh, &signal_ahead(10.0, LightState::Red, 10.0));
        assert_eq!(action, IntersectionAction::EmergencyStop);
        assert_eq!(state.phase, IntersectionPhase::Stopping { emergency: true });
    }

    #[test]
    fn green_while_stopping_far_back_does_not_commit() {
        let mut veh = vehicle(3.0, CarAttributes::default());
        let (state, _) = run(&veh, &signal_ahead(80.0, LightState::Red, 40.0));
        assert_eq!(state.phase, IntersectionPhase::Stopping { emergency: false });
        veh.set_intersection(Some(state));

        let (state, action) = run(&veh, &signal_ahead(75.0, LightState::Green, 2.0));
        assert_eq!(action, IntersectionAction::Proceed);
        assert_eq!(state.phase, IntersectionPhase::Approaching);
        veh.set_intersection(Some(state));

        // Still far from the line when the light turns red again
        let (state, action) = run(&veh, &signal_ahead(70.0, LightState::Red, 40.0));
        assert!(matches!(action, IntersectionAction::StopAt { .. }));
        assert_eq!(state.phase, IntersectionPhase::Stopping { emergency: false });
    }

    #[test]
    fn yellow_light_choice_follows_behaviour() {
        // Both options feasible: stopping needs 15^2 / (2 * 30) = 3.75 m/s^2 of 6
        let cautious = vehicle(
            15.0,
            CarAttributes {
                yellow_light_behavior: 0.2,
                ..Default::default()
            },
        );
        let bold = vehicle(
            15.0,
            CarAttributes {
                yellow_light_behavior: 0.5,
                ..Default::default()
            },
        );
        let ahead = signal_ahead(30.0, LightState::Yellow, 3.0);
        assert!(matches!(run(&cautious, &ahead).1, IntersectionAction::StopAt { .. }));
        assert_eq!(run(&bold, &ahead).1, IntersectionAction::Proceed);

        // Only stopping is feasible
        let ahead = signal_ahead(60.0, LightState::Yellow, 2.0);
        assert!(matches!(run(&bold, &ahead).1, IntersectionAction::StopAt { .. }));

        // Only going is feasible
        let ahead = signal_ahead(10.0, LightState::Yellow, 2.0);
        assert_eq!(run(&cautious, &ahead).1, IntersectionAction::Proceed);

        // Neither is feasible
        let ahead = signal_ahead(12.0, LightState::Yellow, 0.5);
        assert_eq!(run(&bold, &ahead).1, IntersectionAction::EmergencyStop);
    }

    #[test]
    fn compliant_driver_stops_fully_at_stop_sign() {
        let attrs = CarAttributes {
            stop_sign_compliance: 1.0,
            ..Default::default()
        };
        let moving = vehicle(1.5, attrs.clone());
        let (state, action) = run(&moving, &stop_sign_ahead(1.0));
        assert!(!state.rolling);
        assert_eq!(state.phase, IntersectionPhase::Approaching);
        assert_eq!(
            action,
            IntersectionAction::StopAt {
                distance: 1.0,
                crawl_speed: 0.0
            }
        );

        let mut halted = vehicle(0.0, attrs);
        let (state, _) = run(&halted, &stop_sign_ahead(1.0));
        assert_eq!(state.phase, IntersectionPhase::Stopped { arrived: 0.0 });

        halted.set_intersection(Some(state));
        let (state, action) = run(&halted, &stop_sign_ahead(1.0));
        assert_eq!(state.phase, IntersectionPhase::Waiting { arrived: 0.0 });
        assert!(matches!(action, IntersectionAction::StopAt { .. }));
    }

    #[test]
    fn non_compliant_driver_rolls_through_slowly() {
        let moving = vehicle(
            1.5,
            CarAttributes {
                stop_sign_compliance: 0.0,
                ..Default::default()
            },
        );
        let (state, _) = run(&moving, &stop_sign_ahead(2.0));
        assert!(state.rolling);
        assert!(matches!(state.phase, IntersectionPhase::Stopped { .. }));

        let (_, action) = run(&moving, &stop_sign_ahead(20.0));
        assert_eq!(
            action,
            IntersectionAction::StopAt {
                distance: 20.0,
                crawl_speed: ROLLING_CRAWL_SPEED
            }
        );
    }
}
