//! Deterministic resolution of decisions which cannot all be carried out.

use crate::controller::{LaneChangePhase, Proposal};
use crate::network::RoadNetwork;
use crate::snapshot::{order_by_position, Occupancy, SimEvent};
use crate::util::Interval;
use crate::{JunctionId, LaneId, VehicleId, VehicleSet};
use itertools::Itertools;
use log::{debug, warn};
use slotmap::SecondaryMap;

/// Clearance required between two vehicles moving into the same space, in m.
const MERGE_CLEARANCE: f64 = 2.0; // m

/// How long a junction stays blocked after granting right of way, in s.
pub const CROSSING_TIME: f64 = 3.0; // s

/// How much earlier a vehicle which has waited longer than its patience is
/// considered to have arrived, in s.
const IMPATIENCE_BOOST: f64 = 0.5; // s

/// Overlaps smaller than this are not collisions, in m.
const COLLISION_TOLERANCE: f64 = 1e-6; // m

/// A request by a vehicle waiting at a stop sign to cross the junction.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Claim {
    pub vehicle: VehicleId,
    pub junction: JunctionId,
    /// When the vehicle stopped at the line, in s.
    pub arrived: f64,
    /// How long the vehicle has been waiting, in s.
    pub waited: f64,
    /// The driver's patience, in s.
    pub patience: f64,
}

impl Claim {
    /// The arrival time used for priority, in s.
    fn priority(&self) -> f64 {
        if self.waited > self.patience {
            self.arrived - IMPATIENCE_BOOST
        } else {
            self.arrived
        }
    }
}

/// Prevents vehicles from moving across into the same space.
///
/// Vehicles already moving across keep priority, then those which began
/// their lane change earliest, then the lowest vehicle ID. A losing vehicle
/// which was about to start moving keeps signalling; one already moving
/// aborts its lane change.
pub(crate) fn resolve_merges(
    vehicles: &VehicleSet,
    proposals: &mut SecondaryMap<VehicleId, Proposal>,
) {
    let mergers = proposals
        .iter()
        .filter_map(|(id, proposal)| match proposal.lane_change {
            LaneChangePhase::Merging { target, since, .. } => {
                let vehicle = vehicles.get(id)?;
                let continuing = vehicle.lane_change().is_merging();
                Some((id, vehicle.lane_id(), target, continuing, since))
            }
            _ => None,
        })
        .sorted_by_key(|(id, _, _, continuing, since)| (!continuing, *since, *id))
        .collect::<Vec<_>>();

    let footprint = |id: VehicleId| {
        let vehicle = &vehicles[id];
        Interval::new(vehicle.pos_rear(), vehicle.pos_front())
    };

    let mut accepted: Vec<(VehicleId, LaneId, LaneId)> = vec![];
    for (id, origin, target, continuing, _) in mergers {
        let space = footprint(id);
        let blocked = accepted.iter().any(|&(other, other_origin, other_target)| {
            let swapping = target == other_origin && origin == other_target;
            let same_space = target == other_target || swapping;
            same_space && space.clearance_with(&footprint(other)) < MERGE_CLEARANCE
        });
        if !blocked {
            accepted.push((id, origin, target));
            continue;
        }

        let Some(proposal) = proposals.get_mut(id) else {
            continue;
        };
        if continuing {
            debug!("vehicle {id:?} aborted its merge into {target:?}");
            proposal.lane_change = LaneChangePhase::Cruising;
            proposal.lane_change_aborted = true;
        } else {
            debug!("vehicle {id:?} must keep signalling for {target:?}");
            proposal.lane_change = *vehicles[id].lane_change();
        }
    }
}

/// Grants right of way at stop sign junctions.
///
/// Each free junction lets through the claim with the earliest arrival,
/// ties broken by vehicle ID, and is then blocked for [CROSSING_TIME].
pub(crate) fn grant_right_of_way(
    claims: Vec<Claim>,
    busy_until: &mut SecondaryMap<JunctionId, f64>,
    time: f64,
) -> Vec<(VehicleId, JunctionId)> {
    let mut granted = vec![];
    let by_junction = claims
        .into_iter()
        .sorted_by(|a, b| {
            a.junction
                .cmp(&b.junction)
                .then(a.priority().total_cmp(&b.priority()))
                .then(a.vehicle.cmp(&b.vehicle))
        })
        .group_by(|claim| claim.junction);

    for (junction, mut claims) in &by_junction {
        let free = busy_until.get(junction).map_or(true, |until| time >= *until);
        if !free {
            continue;
        }
        if let Some(first) = claims.next() {
            busy_until.insert(junction, time + CROSSING_TIME);
            granted.push((first.vehicle, junction));
        }
    }
    granted
}

/// Finds vehicles overlapping the vehicle ahead of them and stops them
/// directly behind it.
///
/// Each lane is checked front to back, together with the vehicles moving
/// across into it. The frontmost vehicle is checked against the rearmost
/// vehicle on the lane it continues into.
pub(crate) fn correct_collisions(
    network: &RoadNetwork,
    vehicles: &mut VehicleSet,
    occupancy: &Occupancy,
) -> Vec<SimEvent> {
    let mut events = vec![];
    for lane in network.iter_lanes() {
        let merging = occupancy
            .entering(lane.id())
            .iter()
            .filter(|id| vehicles[**id].lane_change().is_merging());
        let on_lane = occupancy
            .on_lane(lane.id())
            .iter()
            .chain(merging)
            .copied()
            .sorted_by(|a, b| order_by_position(vehicles, *b, *a))
            .map(|id| (id, 0.0));
        // Positions on the next lane are offset by this lane's length
        let next = lane
            .lane_out()
            .and_then(|out| occupancy.on_lane(out).first())
            .map(|id| (*id, lane.length()));
        let chain = next.into_iter().chain(on_lane).collect::<Vec<_>>();

        for ((leader, base), (follower, _)) in chain.into_iter().tuple_windows() {
            if leader == follower {
                continue;
            }
            let rear = base + vehicles[leader].pos_rear();
            let vehicle = &mut vehicles[follower];
            let overlap = vehicle.pos_front() - rear;
            if overlap > COLLISION_TOLERANCE {
                warn!("vehicle {follower:?} collided with {leader:?} (overlap {overlap:.2} m)");
                vehicle.force_stop(rear - vehicle.half_length());
                events.push(SimEvent::Collision {
                    leader,
                    follower,
                    overlap,
                });
            }
        }
    }
    events
}
