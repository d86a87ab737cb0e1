use crate::error::{SimError, SimResult};
use crate::lane::{Lane, LaneAttributes, Side};
use crate::light::TrafficLight;
use crate::math::Point2d;
use crate::{ControlId, JunctionId, LaneId, LaneSet, TrafficLightId};
use arrayvec::ArrayVec;
use slotmap::SlotMap;

/// The road network the vehicles drive on.
///
/// The network is built up front and is read-only to the simulation.
/// Adjacent lanes are assumed to run in parallel and to share the same
/// longitudinal coordinate, so a position on one lane maps directly onto
/// the same position on its neighbours.
#[derive(Clone, Default)]
pub struct RoadNetwork {
    lanes: LaneSet,
    lights: SlotMap<TrafficLightId, TrafficLight>,
    junctions: SlotMap<JunctionId, ()>,
    controls: SlotMap<ControlId, ControlPoint>,
}

/// A stop line on a lane, governed by a stop sign or a signal.
#[derive(Clone, Copy, Debug)]
pub struct ControlPoint {
    /// The lane the stop line is on.
    pub lane: LaneId,
    /// The longitudinal position of the stop line in m.
    pub position: f64,
    /// What governs the stop line.
    pub kind: ControlKind,
}

/// The type of traffic control at a control point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    /// A stop sign; vehicles at all stop signs of the junction share right of way.
    StopSign { junction: JunctionId },
    /// A traffic signal.
    Signal { light: TrafficLightId },
}

impl RoadNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a lane to the network.
    pub fn add_lane(&mut self, attributes: &LaneAttributes) -> LaneId {
        self.lanes.insert_with_key(|id| Lane::new(id, attributes))
    }

    /// Specifies that `left` lies directly to the left of `right`,
    /// and that vehicles may change lanes between them.
    pub fn set_adjacent(&mut self, left: LaneId, right: LaneId) -> SimResult<()> {
        self.lane(left)?;
        self.lane(right)?;
        if left == right {
            return Err(SimError::PerceptionInconsistency(format!(
                "lane {left:?} cannot be adjacent to itself"
            )));
        }
        self.lanes[left].set_adjacent(Side::Right, right);
        self.lanes[right].set_adjacent(Side::Left, left);
        Ok(())
    }

    /// Specifies that the end of the `from` lane connects to the start of the `to` lane.
    pub fn connect(&mut self, from: LaneId, to: LaneId) -> SimResult<()> {
        self.lane(to)?;
        if self.lane(from)?.lane_out().is_some() {
            return Err(SimError::PerceptionInconsistency(format!(
                "lane {from:?} already continues into another lane"
            )));
        }
        self.lanes[from].set_lane_out(to);
        self.lanes[to].add_lane_in(from);
        Ok(())
    }

    /// Marks a lane as ending, so vehicles must merge out of it before its end.
    pub fn set_lane_drop(&mut self, lane: LaneId) -> SimResult<()> {
        self.lane(lane)?;
        self.lanes[lane].set_drops();
        Ok(())
    }

    /// Adds a junction, which groups stop signs sharing right of way.
    pub fn add_junction(&mut self) -> JunctionId {
        self.junctions.insert(())
    }

    /// Adds a traffic light to the network.
    pub fn add_traffic_light(&mut self, light: TrafficLight) -> TrafficLightId {
        self.lights.insert(light)
    }

    /// Places a stop line on a lane.
    pub fn add_control(
        &mut self,
        lane: LaneId,
        position: f64,
        kind: ControlKind,
    ) -> SimResult<ControlId> {
        self.lane(lane)?;
        let id = self.controls.insert(ControlPoint {
            lane,
            position,
            kind,
        });
        self.lanes[lane].add_control(position, id);
        Ok(id)
    }

    /// Gets a lane, or an error if it doesn't exist.
    pub fn lane(&self, id: LaneId) -> SimResult<&Lane> {
        self.lanes.get(id).ok_or(SimError::UnknownLane(id))
    }

    /// Returns an iterator over all the lanes.
    pub fn iter_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.values()
    }

    pub fn control(&self, id: ControlId) -> Option<&ControlPoint> {
        self.controls.get(id)
    }

    pub fn light(&self, id: TrafficLightId) -> Option<&TrafficLight> {
        self.lights.get(id)
    }

    /// Samples the world position of a point on a lane.
    pub fn sample(&self, lane: LaneId, pos: f64, lat: f64) -> SimResult<Point2d> {
        Ok(self.lane(lane)?.sample(pos, lat))
    }

    /// Checks that the network is well formed.
    pub fn validate(&self) -> SimResult<()> {
        let fail = |msg: String| Err(SimError::PerceptionInconsistency(msg));

        for lane in self.lanes.values() {
            let id = lane.id();
            if !(lane.length().is_finite() && lane.length() > 0.0) {
                return fail(format!("lane {id:?} has no length"));
            }
            if !(lane.speed_limit().is_finite() && lane.speed_limit() > 0.0) {
                return fail(format!("lane {id:?} has no positive speed limit"));
            }
            for side in [Side::Left, Side::Right] {
                if let Some(adj) = lane.adjacent(side) {
                    let mirrored = self
                        .lanes
                        .get(adj)
                        .and_then(|other| other.adjacent(side.opposite()));
                    if mirrored != Some(id) {
                        return fail(format!("adjacency of lane {id:?} is not mirrored"));
                    }
                }
            }
            if let Some(out) = lane.lane_out() {
                if !self.lanes.contains_key(out) {
                    return fail(format!("lane {id:?} continues into a missing lane"));
                }
            }
            if lane.drops() {
                if lane.lane_out().is_some() {
                    return fail(format!("dropped lane {id:?} cannot continue"));
                }
                if lane.adjacent(Side::Left).is_none() && lane.adjacent(Side::Right).is_none() {
                    return fail(format!("dropped lane {id:?} has no lane to merge into"));
                }
            }
        }

        for (id, control) in &self.controls {
            let lane = self.lane(control.lane)?;
            if !(0.0..=lane.length()).contains(&control.position) {
                return fail(format!("control {id:?} lies outside its lane"));
            }
            match control.kind {
                ControlKind::Signal { light } if !self.lights.contains_key(light) => {
                    return fail(format!("control {id:?} references a missing light"));
                }
                ControlKind::StopSign { junction } if !self.junctions.contains_key(junction) => {
                    return fail(format!("control {id:?} references a missing junction"));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Finds which way a vehicle on `from` should change lanes to reach `to`.
    ///
    /// Returns `None` if `to` is unreachable or if the route does not begin
    /// with a lane change. Routes which change lanes early are preferred.
    pub fn lateral_route(&self, from: LaneId, to: LaneId) -> Option<Side> {
        let lane = self.lanes.get(from)?;
        let path = pathfinding::directed::bfs::bfs(
            &from,
            |id| self.successors(*id),
            |id| *id == to,
        )?;
        let next = *path.get(1)?;
        [Side::Left, Side::Right]
            .into_iter()
            .find(|side| lane.adjacent(*side) == Some(next))
    }

    fn successors(&self, id: LaneId) -> ArrayVec<LaneId, 3> {
        let mut out = ArrayVec::new();
        if let Some(lane) = self.lanes.get(id) {
            out.extend(lane.adjacent(Side::Left));
            out.extend(lane.adjacent(Side::Right));
            out.extend(lane.lane_out());
        }
        out
    }
}
