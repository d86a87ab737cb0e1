//! What a driver sees of the world around them.

use crate::controller::longitudinal::stopping_distance;
use crate::error::{SimError, SimResult};
use crate::lane::Side;
use crate::light::LightState;
use crate::network::ControlKind;
use crate::rng::VehicleRng;
use crate::snapshot::WorldView;
use crate::vehicle::Vehicle;
use crate::{ControlId, LaneId, VehicleId};
use smallvec::{smallvec, SmallVec};
use std::cmp::Ordering;

/// How far an attentive driver looks for other vehicles, in m.
const ATTENTION_RANGE: f64 = 150.0; // m

/// The share of the attention range lost by a fully distracted driver.
const DISTRACTION_RANGE_LOSS: f64 = 0.5;

/// Standard deviation of the error in a leader's perceived speed
/// for a fully distracted driver, in m/s.
const SPEED_NOISE: f64 = 1.5; // m/s

/// Extra look-ahead beyond the distance needed to react and stop, in m.
const BRAKING_MARGIN: f64 = 10.0; // m

/// How far past a stop line a vehicle still considers it, in m.
const CONTROL_BEHIND: f64 = 2.0; // m

/// The maximum number of lane connections followed when searching.
const MAX_LANE_HOPS: usize = 8;

/// Another vehicle as perceived by a driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    pub id: VehicleId,
    /// The free space between the two vehicles in m, bumper to bumper.
    pub gap: f64,
    /// The perceived velocity in m/s.
    pub vel: f64,
    /// The vehicle's maximum deceleration in m/s<sup>2</sup>.
    pub max_dec: f64,
}

/// The vehicles either side of the gap alongside a vehicle in an adjacent lane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdjacentGap {
    pub lane: LaneId,
    pub leader: Option<Neighbour>,
    pub follower: Option<Neighbour>,
}

/// The next stop line ahead of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlAhead {
    pub id: ControlId,
    /// The distance from the front of the vehicle to the line in m.
    /// Slightly negative once the vehicle has crossed it.
    pub distance: f64,
    pub kind: ControlKind,
    /// The state of the signal and the time until it changes, for signals.
    pub signal: Option<(LightState, f64)>,
}

/// Everything a driver perceives during one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Perception {
    /// The speed limit of the current lane in m/s.
    pub speed_limit: f64,
    /// The distance up to which other vehicles are noticed, in m.
    pub range: f64,
    pub leader: Option<Neighbour>,
    pub follower: Option<Neighbour>,
    pub left: Option<AdjacentGap>,
    pub right: Option<AdjacentGap>,
    pub control: Option<ControlAhead>,
}

impl Perception {
    /// The gap in the adjacent lane on the given side, if there is such a lane.
    pub fn adjacent(&self, side: Side) -> Option<&AdjacentGap> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }
}

/// Perceives the world from the point of view of `vehicle`.
///
/// Distraction shortens the range at which other vehicles are noticed,
/// though never below what the driver needs to stop in. With a probability
/// equal to the distraction level, the leader's speed is read one tick
/// late and with added noise. `rng` is only drawn from for that.
pub(crate) fn perceive(
    view: &WorldView,
    vehicle: &Vehicle,
    rng: &mut VehicleRng,
) -> SimResult<Perception> {
    let profile = vehicle.profile();
    let lane = view.network.lane(vehicle.lane_id())?;

    let attention = ATTENTION_RANGE * (1.0 - DISTRACTION_RANGE_LOSS * profile.distraction());
    let reaction = f64::max(profile.reaction_time(), view.dt);
    let braking = stopping_distance(vehicle.vel(), profile.deceleration())
        + vehicle.vel() * reaction
        + BRAKING_MARGIN;
    let range = f64::max(attention, braking);

    let scanner = Scanner { view, me: vehicle };

    let mut leader = scanner.ahead(lane.id(), range)?;
    if let Some(leader) = leader.as_mut() {
        if rng.gen_bool(profile.distraction()) {
            let late = view
                .vehicles
                .get(leader.id)
                .map_or(leader.vel, |veh| veh.prev_vel());
            let noise = rng.noise(SPEED_NOISE * profile.distraction());
            leader.vel = f64::max(late + noise, 0.0);
        }
    }

    let follower = scanner.behind(lane.id(), range)?;

    let mut adjacent = [None, None];
    for (slot, side) in adjacent.iter_mut().zip([Side::Left, Side::Right]) {
        if let Some(adj) = lane.adjacent(side) {
            *slot = Some(AdjacentGap {
                lane: adj,
                leader: scanner.ahead(adj, attention)?,
                follower: scanner.behind(adj, attention)?,
            });
        }
    }
    let [left, right] = adjacent;

    Ok(Perception {
        speed_limit: lane.speed_limit(),
        range,
        leader,
        follower,
        left,
        right,
        control: scanner.control_ahead(lane.id(), range)?,
    })
}

struct Scanner<'a, 'b> {
    view: &'b WorldView<'a>,
    me: &'b Vehicle,
}

impl<'a, 'b> Scanner<'a, 'b> {
    /// Where another vehicle sits relative to this one in `(position, id)` order.
    fn cmp_to_me(&self, id: VehicleId) -> Ordering {
        let pos = self
            .view
            .vehicles
            .get(id)
            .map_or(f64::NAN, |veh| veh.pos_mid());
        pos.total_cmp(&self.me.pos_mid())
            .then(id.cmp(&self.me.id()))
    }

    fn vehicle(&self, id: VehicleId) -> SimResult<&'b Vehicle> {
        self.view.vehicles.get(id).ok_or_else(|| SimError::Controller {
            vehicle: self.me.id(),
            reason: format!("perceived vehicle {id:?} does not exist"),
        })
    }

    fn neighbour(&self, other: &Vehicle, gap: f64) -> SimResult<Neighbour> {
        if !gap.is_finite() {
            return Err(SimError::Controller {
                vehicle: self.me.id(),
                reason: format!("gap to vehicle {:?} is not finite", other.id()),
            });
        }
        Ok(Neighbour {
            id: other.id(),
            gap,
            vel: other.vel(),
            max_dec: other.profile().deceleration(),
        })
    }

    /// Finds the nearest vehicle ahead on `lane` or the lanes it continues into.
    fn ahead(&self, lane: LaneId, range: f64) -> SimResult<Option<Neighbour>> {
        let occupancy = self.view.occupancy;
        let front = self.me.pos_front();
        let mut base = 0.0;
        let mut current = lane;

        for hop in 0..MAX_LANE_HOPS {
            let mut nearest: Option<&Vehicle> = None;
            for list in [occupancy.on_lane(current), occupancy.entering(current)] {
                let start = match hop {
                    0 => list.partition_point(|id| self.cmp_to_me(*id) != Ordering::Greater),
                    _ => 0,
                };
                let Some(&id) = list[start..].iter().find(|id| **id != self.me.id()) else {
                    continue;
                };
                let other = self.vehicle(id)?;
                let closer = nearest.map_or(true, |near| {
                    (other.pos_mid(), other.id()) < (near.pos_mid(), near.id())
                });
                if closer {
                    nearest = Some(other);
                }
            }

            if let Some(other) = nearest {
                let gap = base + other.pos_rear() - front;
                if gap > range {
                    return Ok(None);
                }
                return self.neighbour(other, gap).map(Some);
            }

            let lane = self.view.network.lane(current)?;
            base += lane.length();
            match lane.lane_out() {
                Some(next) if base - front <= range => current = next,
                _ => break,
            }
        }
        Ok(None)
    }

    /// Finds the nearest vehicle behind on `lane` or the lanes feeding into it.
    fn behind(&self, lane: LaneId, range: f64) -> SimResult<Option<Neighbour>> {
        let occupancy = self.view.occupancy;
        let rear = self.me.pos_rear();
        let mut frontier: SmallVec<[(LaneId, f64); 4]> = smallvec![(lane, 0.0)];
        let mut nearest: Option<(f64, &Vehicle)> = None;

        for hop in 0..MAX_LANE_HOPS {
            let mut next: SmallVec<[(LaneId, f64); 4]> = SmallVec::new();
            for &(current, base) in &frontier {
                let mut found = false;
                for list in [occupancy.on_lane(current), occupancy.entering(current)] {
                    let end = match hop {
                        0 => list.partition_point(|id| self.cmp_to_me(*id) == Ordering::Less),
                        _ => list.len(),
                    };
                    let Some(&id) = list[..end].iter().rev().find(|id| **id != self.me.id())
                    else {
                        continue;
                    };
                    let other = self.vehicle(id)?;
                    let front = base + other.pos_front();
                    found = true;
                    let closer = nearest.map_or(true, |(near_front, near)| {
                        (front, other.id()) > (near_front, near.id())
                    });
                    if closer {
                        nearest = Some((front, other));
                    }
                }
                if found || rear - base > range {
                    continue;
                }
                for &prev in self.view.network.lane(current)?.lanes_in() {
                    let length = self.view.network.lane(prev)?.length();
                    next.push((prev, base - length));
                }
            }
            if nearest.is_some() || next.is_empty() {
                break;
            }
            frontier = next;
        }

        match nearest {
            Some((front, other)) if rear - front <= range => {
                self.neighbour(other, rear - front).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Finds the nearest stop line ahead which hasn't yet been passed.
    fn control_ahead(&self, lane: LaneId, range: f64) -> SimResult<Option<ControlAhead>> {
        let network = self.view.network;
        let front = self.me.pos_front();
        let mut base = 0.0;
        let mut current = lane;

        for _ in 0..MAX_LANE_HOPS {
            let lane = network.lane(current)?;
            for &(pos, id) in lane.controls() {
                let distance = base + pos - front;
                if distance < -CONTROL_BEHIND {
                    continue;
                }
                if distance > range {
                    return Ok(None);
                }
                let control = network.control(id).ok_or_else(|| {
                    SimError::PerceptionInconsistency(format!("control {id:?} does not exist"))
                })?;
                let signal = match control.kind {
                    ControlKind::Signal { light } => {
                        let light = network.light(light).ok_or_else(|| {
                            SimError::PerceptionInconsistency(format!(
                                "light {light:?} does not exist"
                            ))
                        })?;
                        Some(light.state_at(self.view.time))
                    }
                    ControlKind::StopSign { .. } => None,
                };
                return Ok(Some(ControlAhead {
                    id,
                    distance,
                    kind: control.kind,
                    signal,
                }));
            }
            base += lane.length();
            match lane.lane_out() {
                Some(next) if base - front <= range => current = next,
                _ => break,
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attributes::{AttributeProfile, CarAttributes};
    use crate::lane::LaneAttributes;
    use crate::math::Point2d;
    use crate::network::RoadNetwork;
    use crate::rng::Stream;
    use crate::snapshot::Occupancy;
    use crate::VehicleSet;
    use assert_approx_eq::assert_approx_eq;

    struct World {
        network: RoadNetwork,
        vehicles: VehicleSet,
        lanes: Vec<LaneId>,
    }

    impl World {
        /// Two parallel lanes, left then right, each continuing into a second section.
        fn new() -> Self {
            let mut network = RoadNetwork::new();
            let mut lane = |y: f64, x0: f64| {
                network.add_lane(&LaneAttributes {
                    start: Point2d::new(x0, y),
                    end: Point2d::new(x0 + 100.0, y),
                    speed_limit: 20.0,
                })
            };
            let lanes = vec![lane(3.5, 0.0), lane(0.0, 0.0), lane(3.5, 100.0), lane(0.0, 100.0)];
            network.set_adjacent(lanes[0], lanes[1]).unwrap();
            network.set_adjacent(lanes[2], lanes[3]).unwrap();
            network.connect(lanes[0], lanes[2]).unwrap();
            network.connect(lanes[1], lanes[3]).unwrap();
            Self {
                network,
                vehicles: VehicleSet::with_key(),
                lanes,
            }
        }

        fn add(&mut self, lane: usize, pos: f64, vel: f64) -> VehicleId {
            let profile = AttributeProfile::new(CarAttributes {
                velocity: vel,
                distraction_level: 0.0,
                ..Default::default()
            })
            .unwrap();
            let lane = self.lanes[lane];
            self.vehicles
                .insert_with_key(|id| Vehicle::new(id, profile, lane, pos))
        }

        fn perceive(&self, id: VehicleId) -> SimResult<Perception> {
            let occupancy = Occupancy::build(&self.vehicles);
            let view = WorldView {
                network: &self.network,
                vehicles: &self.vehicles,
                occupancy: &occupancy,
                seed: 0,
                tick: 0,
                time: 0.0,
                dt: 0.1,
            };
            let mut rng = VehicleRng::new(0, id, 0, Stream::Perception);
            perceive(&view, &self.vehicles[id], &mut rng)
        }
    }

    #[test]
    fn finds_leader_and_follower_on_same_lane() {
        let mut world = World::new();
        let me = world.add(1, 50.0, 10.0);
        let ahead = world.add(1, 70.0, 8.0);
        let behind = world.add(1, 30.0, 12.0);
        world.add(1, 90.0, 8.0);

        let seen = world.perceive(me).unwrap();
        let leader = seen.leader.unwrap();
        assert_eq!(leader.id, ahead);
        assert_approx_eq!(leader.gap, 20.0 - 4.5);
        assert_approx_eq!(leader.vel, 8.0);
        let follower = seen.follower.unwrap();
        assert_eq!(follower.id, behind);
        assert_approx_eq!(follower.gap, 20.0 - 4.5);
        assert_approx_eq!(seen.speed_limit, 20.0);
    }

    #[test]
    fn looks_across_lane_connections() {
        let mut world = World::new();
        let me = world.add(1, 90.0, 10.0);
        let ahead = world.add(3, 20.0, 10.0);
        let behind = world.add(0, 20.0, 10.0);
        let seen = world.perceive(me).unwrap();
        assert_eq!(seen.leader.map(|l| l.id), Some(ahead));
        assert_approx_eq!(seen.leader.unwrap().gap, 30.0 - 4.5);

        // The vehicle on the next section of the left lane is seen through it
        let seen = world.perceive(behind).unwrap();
        let right = seen.right.unwrap();
        assert_eq!(right.leader.map(|l| l.id), Some(me));
        assert!(right.follower.is_none());
        assert!(seen.leader.is_none());
    }

    #[test]
    fn adjacent_gap_is_bounded_by_both_neighbours() {
        let mut world = World::new();
        let me = world.add(1, 50.0, 10.0);
        let front = world.add(0, 65.0, 10.0);
        let rear = world.add(0, 45.0, 10.0);
        let seen = world.perceive(me).unwrap();
        assert!(seen.right.is_none());
        let left = seen.left.unwrap();
        assert_eq!(left.lane, world.lanes[0]);
        assert_eq!(left.leader.map(|l| l.id), Some(front));
        assert_eq!(left.follower.map(|f| f.id), Some(rear));
        // Abreast vehicles overlap, giving a negative gap
        assert_approx_eq!(left.follower.unwrap().gap, 5.0 - 4.5);
    }

    #[test]
    fn distant_leader_is_not_perceived() {
        let mut world = World::new();
        let me = world.add(1, 0.0, 0.0);
        world.add(3, 99.0, 0.0);
        let seen = world.perceive(me).unwrap();
        assert_approx_eq!(seen.range, ATTENTION_RANGE);
        assert!(seen.leader.is_none());
    }
}
