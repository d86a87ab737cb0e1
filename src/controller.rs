//! The per-vehicle decision models, composed into a single [Decision] per tick.

pub use intersection::{IntersectionAction, IntersectionPhase, IntersectionState};
pub use lateral::{LaneChangePhase, LaneIntent};
pub use longitudinal::LongitudinalController;

use crate::error::SimResult;
use crate::lane::Side;
use crate::perception::perceive;
use crate::rng::{Stream, VehicleRng};
use crate::snapshot::WorldView;
use crate::vehicle::Vehicle;
use crate::VehicleId;
use lateral::LateralController;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub(crate) mod intersection;
pub(crate) mod lateral;
pub(crate) mod longitudinal;

/// A vehicle's decision for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Decision {
    pub vehicle: VehicleId,
    /// The acceleration to apply, within `[-deceleration, acceleration]`.
    pub target_acceleration: f64,
    pub lane_intent: LaneIntent,
    pub intersection_action: IntersectionAction,
}

/// Why a vehicle braked as hard as it can.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EmergencyCause {
    /// The vehicle overlaps its leader.
    Overlap,
    /// The vehicle is closer to its leader than its tailgate distance.
    Tailgating,
    /// The vehicle cannot stop for a signal, nor make it through.
    SignalViolation,
    /// The vehicle has been frozen.
    Frozen,
    /// The vehicle's models failed.
    ControllerFault,
}

/// A decision together with the model state it would commit.
#[derive(Clone, Debug)]
pub(crate) struct Proposal {
    pub decision: Decision,
    pub lane_change: LaneChangePhase,
    /// Set when a lane change intent was emitted this tick.
    pub lane_change_started: Option<Side>,
    pub lane_change_aborted: bool,
    pub intersection: Option<IntersectionState>,
    pub emergency: Option<EmergencyCause>,
}

impl Proposal {
    /// Brakes as hard as possible, leaving all model state untouched.
    pub fn fallback(vehicle: &Vehicle, cause: EmergencyCause) -> Self {
        Self {
            decision: Decision {
                vehicle: vehicle.id(),
                target_acceleration: -vehicle.profile().deceleration(),
                lane_intent: LaneIntent::Stay,
                intersection_action: IntersectionAction::None,
            },
            lane_change: *vehicle.lane_change(),
            lane_change_started: None,
            lane_change_aborted: false,
            intersection: vehicle.intersection().copied(),
            emergency: Some(cause),
        }
    }

    /// Overrides the decision with maximal braking.
    pub fn brake(&mut self, max_dec: f64, cause: EmergencyCause) {
        self.decision.target_acceleration = -max_dec;
        self.emergency = Some(cause);
    }
}

/// Decides what a vehicle will do this tick, reading only the committed world state.
pub(crate) fn decide(view: &WorldView, vehicle: &Vehicle) -> SimResult<Proposal> {
    let rng = |stream| VehicleRng::new(view.seed, vehicle.id(), view.tick, stream);
    let profile = vehicle.profile();

    let perception = perceive(view, vehicle, &mut rng(Stream::Perception))?;
    let lateral =
        LateralController::new(view, vehicle, &perception).step(&mut rng(Stream::Lateral))?;
    let (intersection, action) = intersection::step(
        vehicle,
        perception.control.as_ref(),
        &mut rng(Stream::Intersection),
        view.time,
    );

    let mut lon = LongitudinalController::new(profile, vehicle.vel(), view.dt);
    lon.apply_speed_limit(perception.speed_limit);
    if let Some(leader) = &perception.leader {
        lon.follow_vehicle(leader);
    }
    if let LaneChangePhase::Merging { side, .. } = lateral.phase {
        // Straddling both lanes, so keep clear of the target lane's leader too
        if let Some(leader) = perception.adjacent(side).and_then(|gap| gap.leader) {
            lon.follow_vehicle(&leader);
        }
    }

    let lane = view.network.lane(vehicle.lane_id())?;
    if lane.drops() {
        lon.stop_at_line(lane.length() - vehicle.pos_front(), 0.0);
    }

    match action {
        IntersectionAction::StopAt {
            distance,
            crawl_speed,
        } => lon.stop_at_line(distance, crawl_speed),
        IntersectionAction::EmergencyStop => lon.emergency_stop(EmergencyCause::SignalViolation),
        IntersectionAction::Proceed | IntersectionAction::None => {}
    }

    let (target_acceleration, emergency) = lon.finish(vehicle.acc());
    let lane_change_started = match lateral.phase {
        LaneChangePhase::Signaling { side, .. } if lateral.intent != LaneIntent::Stay => {
            Some(side)
        }
        _ => None,
    };

    Ok(Proposal {
        decision: Decision {
            vehicle: vehicle.id(),
            target_acceleration,
            lane_intent: lateral.intent,
            intersection_action: action,
        },
        lane_change: lateral.phase,
        lane_change_started,
        lane_change_aborted: lateral.aborted,
        intersection,
        emergency,
    })
}
