use crate::error::SimResult;
use crate::lane::Side;
use crate::perception::{AdjacentGap, Perception};
use crate::rng::VehicleRng;
use crate::snapshot::WorldView;
use crate::vehicle::Vehicle;
use crate::LaneId;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How long a vehicle signals before it starts to move across, in s.
pub const SIGNAL_DURATION: f64 = 1.5; // s

/// How long the move into the adjacent lane takes, in s.
pub const MERGE_DURATION: f64 = 3.0; // s

/// How far from the end of a dropped lane vehicles start trying to leave it, in m.
const DROP_HORIZON: f64 = 250.0; // m

/// A leader slower than this fraction of the desired speed is worth overtaking.
const SLOW_LEADER_RATIO: f64 = 0.85;

/// Slow leaders further away than this are ignored, in m.
const SLOW_LEADER_RANGE: f64 = 60.0; // m

/// How much faster the adjacent lane must be moving to be worth changing into, in m/s.
const MIN_ADVANTAGE: f64 = 2.0; // m/s

/// The gap needed either side of a merging vehicle at standstill, in m.
const MIN_SAFE_GAP: f64 = 4.0; // m

/// Additional gap needed per m/s of speed, in s.
const GAP_PER_SPEED: f64 = 1.0; // s

/// Additional gap needed per m/s of closing speed, in s.
const GAP_PER_CLOSING: f64 = 1.0; // s

/// The share of the safety gap which the boldest merger gives up.
const MAX_GAP_DISCOUNT: f64 = 0.6;

/// Once moving across, the gap may shrink to this fraction before aborting.
const MERGING_GAP_FACTOR: f64 = 0.5;

/// The state of a vehicle's lane changing model.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LaneChangePhase {
    /// Keeping to the current lane.
    Cruising,
    /// Waiting for the signal period to elapse before moving across.
    Signaling {
        target: LaneId,
        side: Side,
        /// Time spent signalling so far, in s.
        elapsed: f64,
        /// Whether other drivers can see the signal.
        broadcast: bool,
        /// The tick at which the lane change began.
        since: u64,
    },
    /// Moving across into the target lane.
    Merging {
        target: LaneId,
        side: Side,
        /// The fraction of the move completed, from 0 to 1.
        progress: f64,
        /// The tick at which the lane change began.
        since: u64,
    },
}

impl LaneChangePhase {
    /// The lane the vehicle is moving into, if any.
    pub fn target(&self) -> Option<LaneId> {
        match self {
            Self::Cruising => None,
            Self::Signaling { target, .. } | Self::Merging { target, .. } => Some(*target),
        }
    }

    /// The lane which other drivers can tell the vehicle is moving into.
    pub fn visible_target(&self) -> Option<LaneId> {
        match self {
            Self::Signaling {
                target,
                broadcast: true,
                ..
            }
            | Self::Merging { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn is_merging(&self) -> bool {
        matches!(self, Self::Merging { .. })
    }

    /// The same lane change aimed at a different lane, or
    /// [Cruising](Self::Cruising) if there is no lane to aim at.
    pub(crate) fn retarget(self, lane: Option<LaneId>) -> Self {
        match (self, lane) {
            (Self::Signaling { side, elapsed, broadcast, since, .. }, Some(target)) => {
                Self::Signaling { target, side, elapsed, broadcast, since }
            }
            (Self::Merging { side, progress, since, .. }, Some(target)) => {
                Self::Merging { target, side, progress, since }
            }
            _ => Self::Cruising,
        }
    }
}

/// A vehicle's lateral decision for a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LaneIntent {
    Stay,
    MoveLeft,
    MoveRight,
}

impl From<Side> for LaneIntent {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => LaneIntent::MoveLeft,
            Side::Right => LaneIntent::MoveRight,
        }
    }
}

/// The result of running the lane changing model for one tick.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LateralOutcome {
    pub phase: LaneChangePhase,
    pub intent: LaneIntent,
    pub aborted: bool,
}

impl LateralOutcome {
    fn keep(phase: LaneChangePhase) -> Self {
        Self {
            phase,
            intent: LaneIntent::Stay,
            aborted: false,
        }
    }

    fn abort() -> Self {
        Self {
            phase: LaneChangePhase::Cruising,
            intent: LaneIntent::Stay,
            aborted: true,
        }
    }
}

/// The lane changing model of a vehicle.
pub(crate) struct LateralController<'a, 'b> {
    view: &'b WorldView<'a>,
    vehicle: &'b Vehicle,
    perception: &'b Perception,
}

impl<'a, 'b> LateralController<'a, 'b> {
    pub fn new(view: &'b WorldView<'a>, vehicle: &'b Vehicle, perception: &'b Perception) -> Self {
        Self {
            view,
            vehicle,
            perception,
        }
    }

    /// Advances the lane changing state machine by one tick.
    ///
    /// A new lane change is only considered once the vehicle has travelled
    /// `1 / lane_change_frequency` since its last one. `rng` decides whether
    /// the turn signal is used.
    pub fn step(&self, rng: &mut VehicleRng) -> SimResult<LateralOutcome> {
        let dt = self.view.dt;
        match *self.vehicle.lane_change() {
            LaneChangePhase::Cruising => self.consider(rng),

            LaneChangePhase::Signaling {
                target,
                side,
                elapsed,
                broadcast,
                since,
            } => {
                if !self.gap_holds(target, side, 1.0) {
                    return Ok(LateralOutcome::abort());
                }
                let elapsed = elapsed + dt;
                let phase = if elapsed >= SIGNAL_DURATION {
                    LaneChangePhase::Merging {
                        target,
                        side,
                        progress: 0.0,
                        since,
                    }
                } else {
                    LaneChangePhase::Signaling {
                        target,
                        side,
                        elapsed,
                        broadcast,
                        since,
                    }
                };
                Ok(LateralOutcome::keep(phase))
            }

            LaneChangePhase::Merging {
                target,
                side,
                progress,
                since,
            } => {
                if !self.gap_holds(target, side, MERGING_GAP_FACTOR) {
                    return Ok(LateralOutcome::abort());
                }
                Ok(LateralOutcome::keep(LaneChangePhase::Merging {
                    target,
                    side,
                    progress: f64::min(progress + dt / MERGE_DURATION, 1.0),
                    since,
                }))
            }
        }
    }

    /// Whether the vehicle has travelled far enough to consider another lane change.
    fn eligible(&self) -> bool {
        match self.vehicle.profile().lane_change_interval() {
            None => false,
            Some(interval) => self
                .vehicle
                .since_lane_change()
                .map_or(true, |dist| dist >= interval),
        }
    }

    fn consider(&self, rng: &mut VehicleRng) -> SimResult<LateralOutcome> {
        let cruise = LateralOutcome::keep(LaneChangePhase::Cruising);
        if !self.eligible() {
            return Ok(cruise);
        }
        let Some(side) = self.desired_side()? else {
            return Ok(cruise);
        };
        let Some(gap) = self.perception.adjacent(side) else {
            return Ok(cruise);
        };
        if !self.gap_acceptable(gap, 1.0) {
            return Ok(cruise);
        }
        let broadcast = rng.gen_bool(self.vehicle.profile().turn_signal_usage());
        Ok(LateralOutcome {
            phase: LaneChangePhase::Signaling {
                target: gap.lane,
                side,
                elapsed: 0.0,
                broadcast,
                since: self.view.tick,
            },
            intent: side.into(),
            aborted: false,
        })
    }

    /// Chooses which way to change lanes, if at all.
    ///
    /// Leaving a dropped lane comes first, then heading for the destination,
    /// and finally overtaking a slow leader.
    fn desired_side(&self) -> SimResult<Option<Side>> {
        let network = self.view.network;
        let lane = network.lane(self.vehicle.lane_id())?;

        if lane.drops() && lane.length() - self.vehicle.pos_front() <= DROP_HORIZON {
            let side = [Side::Left, Side::Right]
                .into_iter()
                .find(|side| lane.adjacent(*side).is_some());
            return Ok(side);
        }

        if let Some(dst) = self.vehicle.destination() {
            return Ok(network.lateral_route(lane.id(), dst));
        }

        let Some(leader) = self.perception.leader else {
            return Ok(None);
        };
        let desired = f64::min(self.vehicle.profile().max_speed(), lane.speed_limit());
        if leader.vel >= SLOW_LEADER_RATIO * desired || leader.gap > SLOW_LEADER_RANGE {
            return Ok(None);
        }
        for side in [Side::Left, Side::Right] {
            let Some(gap) = self.perception.adjacent(side) else {
                continue;
            };
            if network.lane(gap.lane)?.drops() {
                continue;
            }
            let better = gap.leader.map_or(true, |other| {
                other.gap > leader.gap && other.vel >= leader.vel + MIN_ADVANTAGE
            });
            if better {
                return Ok(Some(side));
            }
        }
        Ok(None)
    }

    /// Whether the gap in the target lane is still large enough.
    fn gap_holds(&self, target: LaneId, side: Side, factor: f64) -> bool {
        self.perception
            .adjacent(side)
            .filter(|gap| gap.lane == target)
            .map_or(false, |gap| self.gap_acceptable(gap, factor))
    }

    /// Whether a gap is large enough to move into, given the vehicle's
    /// willingness to merge aggressively.
    fn gap_acceptable(&self, gap: &AdjacentGap, factor: f64) -> bool {
        let profile = self.vehicle.profile();
        let vel = self.vehicle.vel();
        let discount = 1.0 - MAX_GAP_DISCOUNT * profile.merge_acceptance();
        let required = |speed: f64, closing: f64| {
            let base = MIN_SAFE_GAP + GAP_PER_SPEED * speed + GAP_PER_CLOSING * f64::max(closing, 0.0);
            base * discount * factor
        };
        let front_ok = gap.leader.map_or(true, |leader| {
            let needed = f64::max(required(vel, vel - leader.vel), profile.tailgate_distance());
            leader.gap >= needed
        });
        let rear_ok = gap.follower.map_or(true, |follower| {
            follower.gap >= required(follower.vel, follower.vel - vel)
        });
        front_ok && rear_ok
    }
}
