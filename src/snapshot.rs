//! The committed world state read during the decision phase,
//! and the records produced at the end of each tick.

use crate::controller::EmergencyCause;
use crate::lane::Side;
use crate::math::Point2d;
use crate::network::RoadNetwork;
use crate::{JunctionId, LaneId, VehicleId, VehicleSet};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::cmp::Ordering;

/// Which vehicles occupy each lane, ordered by `(position, id)`.
#[derive(Clone, Default)]
pub(crate) struct Occupancy {
    /// Vehicles travelling on each lane.
    on_lane: SecondaryMap<LaneId, Vec<VehicleId>>,
    /// Vehicles visibly moving into each lane from a neighbour.
    entering: SecondaryMap<LaneId, Vec<VehicleId>>,
}

impl Occupancy {
    /// Indexes the vehicles by lane.
    pub fn build(vehicles: &VehicleSet) -> Self {
        let mut occupancy = Self::default();
        for (id, vehicle) in vehicles {
            if let Some(entry) = occupancy.on_lane.entry(vehicle.lane_id()) {
                entry.or_default().push(id);
            }
            if let Some(target) = vehicle.lane_change().visible_target() {
                if let Some(entry) = occupancy.entering.entry(target) {
                    entry.or_default().push(id);
                }
            }
        }
        let order = |a: &VehicleId, b: &VehicleId| order_by_position(vehicles, *a, *b);
        for list in occupancy.on_lane.values_mut() {
            list.sort_by(order);
        }
        for list in occupancy.entering.values_mut() {
            list.sort_by(order);
        }
        occupancy
    }

    /// The vehicles travelling on a lane, rearmost first.
    pub fn on_lane(&self, lane: LaneId) -> &[VehicleId] {
        self.on_lane.get(lane).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The vehicles signalling or merging into a lane, rearmost first.
    pub fn entering(&self, lane: LaneId) -> &[VehicleId] {
        self.entering.get(lane).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Orders two vehicles by longitudinal position, breaking ties by ID.
pub(crate) fn order_by_position(vehicles: &VehicleSet, a: VehicleId, b: VehicleId) -> Ordering {
    let pos = |id: VehicleId| vehicles.get(id).map(|v| v.pos_mid()).unwrap_or(f64::NAN);
    pos(a).total_cmp(&pos(b)).then(a.cmp(&b))
}

/// A read-only view of the world as committed at the end of the previous tick.
pub(crate) struct WorldView<'a> {
    pub network: &'a RoadNetwork,
    pub vehicles: &'a VehicleSet,
    pub occupancy: &'a Occupancy,
    pub seed: u64,
    pub tick: u64,
    pub time: f64,
    pub dt: f64,
}

/// The state of one vehicle at the end of a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleRecord {
    pub vehicle_id: VehicleId,
    pub lane_id: LaneId,
    /// The longitudinal position of the vehicle's centre along its lane, in m.
    pub position: f64,
    /// The world coordinates of the vehicle's centre.
    pub world: Point2d,
    /// The velocity in m/s.
    pub velocity: f64,
}

/// Something noteworthy which happened during a tick.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SimEvent {
    /// Two vehicles overlapped after conflict resolution.
    /// The follower was brought to a stop behind the leader.
    Collision {
        leader: VehicleId,
        follower: VehicleId,
        overlap: f64,
    },
    /// A vehicle braked as hard as it can.
    EmergencyBrake {
        vehicle: VehicleId,
        cause: EmergencyCause,
    },
    /// A vehicle's controllers failed and it fell back to an emergency stop.
    ControllerFallback { vehicle: VehicleId, reason: String },
    LaneChangeStarted { vehicle: VehicleId, side: Side },
    LaneChangeCompleted { vehicle: VehicleId, lane: LaneId },
    LaneChangeAborted { vehicle: VehicleId },
    /// A vehicle waiting at a stop sign was given right of way.
    RightOfWayGranted {
        vehicle: VehicleId,
        junction: JunctionId,
    },
    /// A vehicle drove off the end of the network and was removed.
    VehicleExited { vehicle: VehicleId },
}

/// Everything the simulation produced during one tick.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickOutput {
    /// The index of the tick just simulated.
    pub tick: u64,
    /// The simulation time at the end of the tick, in s.
    pub time: f64,
    pub vehicles: Vec<VehicleRecord>,
    pub events: Vec<SimEvent>,
}
