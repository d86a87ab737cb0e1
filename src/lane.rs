use crate::math::{rot90, Point2d, Vector2d};
use crate::{ControlId, LaneId};
use cgmath::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A lane represents a single, straight stretch of one lane of traffic.
#[derive(Clone, Debug)]
pub struct Lane {
    /// The lane ID.
    id: LaneId,
    /// World coordinates of the start of the centre line.
    start: Point2d,
    /// Unit vector along the lane.
    dir: Vector2d,
    /// Length in m.
    length: f64,
    /// Speed limit in m/s.
    speed_limit: f64,
    /// The lanes that feed into this one.
    lanes_in: Vec<LaneId>,
    /// The lane this one continues into.
    lane_out: Option<LaneId>,
    /// The adjacent lane to the left.
    left: Option<LaneId>,
    /// The adjacent lane to the right.
    right: Option<LaneId>,
    /// Whether the lane ends, forcing vehicles to merge out of it.
    drops: bool,
    /// Control points along the lane, ordered by position.
    controls: Vec<(f64, ControlId)>,
}

/// The attributes of a lane.
#[derive(Clone, Copy, Debug)]
pub struct LaneAttributes {
    /// World coordinates of the start of the centre line.
    pub start: Point2d,
    /// World coordinates of the end of the centre line.
    pub end: Point2d,
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

/// A lateral direction relative to the direction of travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// The sign of a lateral offset towards this side.
    pub fn sign(self) -> f64 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }
}

impl Lane {
    /// Creates a new lane.
    pub(crate) fn new(id: LaneId, attribs: &LaneAttributes) -> Self {
        let delta = attribs.end - attribs.start;
        let length = delta.magnitude();
        let dir = if length > 0.0 {
            delta / length
        } else {
            Vector2d::new(1.0, 0.0)
        };
        Self {
            id,
            start: attribs.start,
            dir,
            length,
            speed_limit: attribs.speed_limit,
            lanes_in: vec![],
            lane_out: None,
            left: None,
            right: None,
            drops: false,
            controls: vec![],
        }
    }

    /// Gets the lane ID.
    pub fn id(&self) -> LaneId {
        self.id
    }

    /// Gets the length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// The lanes which feed into this one.
    pub fn lanes_in(&self) -> &[LaneId] {
        &self.lanes_in
    }

    /// The lane this one continues into, if any.
    pub fn lane_out(&self) -> Option<LaneId> {
        self.lane_out
    }

    /// The adjacent lane on the given side, if any.
    pub fn adjacent(&self, side: Side) -> Option<LaneId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Whether the lane ends, requiring vehicles to merge out of it.
    pub fn drops(&self) -> bool {
        self.drops
    }

    /// The control points on the lane as `(position, id)` pairs, nearest first.
    pub fn controls(&self) -> &[(f64, ControlId)] {
        &self.controls
    }

    /// Samples the world position of a point on the lane.
    ///
    /// # Parameters
    /// * `pos` - The longitudinal position along the lane
    /// * `lat` - The lateral offset from the centre line, positive to the left
    pub fn sample(&self, pos: f64, lat: f64) -> Point2d {
        self.start + self.dir * pos + rot90(self.dir) * lat
    }

    pub(crate) fn set_adjacent(&mut self, side: Side, lane: LaneId) {
        match side {
            Side::Left => self.left = Some(lane),
            Side::Right => self.right = Some(lane),
        }
    }

    pub(crate) fn set_lane_out(&mut self, lane: LaneId) {
        self.lane_out = Some(lane);
    }

    pub(crate) fn add_lane_in(&mut self, lane: LaneId) {
        self.lanes_in.push(lane);
    }

    pub(crate) fn set_drops(&mut self) {
        self.drops = true;
    }

    pub(crate) fn add_control(&mut self, pos: f64, control: ControlId) {
        let idx = self
            .controls
            .iter()
            .position(|(p, _)| *p > pos)
            .unwrap_or(self.controls.len());
        self.controls.insert(idx, (pos, control));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn samples_along_and_across() {
        let lane = Lane::new(
            LaneId::default(),
            &LaneAttributes {
                start: Point2d::new(0.0, 0.0),
                end: Point2d::new(0.0, 100.0),
                speed_limit: 15.0,
            },
        );
        assert_approx_eq!(lane.length(), 100.0);
        let p = lane.sample(25.0, 3.5);
        // Travelling north, left is west.
        assert_approx_eq!(p.x, -3.5);
        assert_approx_eq!(p.y, 25.0);
    }

    #[test]
    fn controls_stay_ordered() {
        let mut lane = Lane::new(
            LaneId::default(),
            &LaneAttributes {
                start: Point2d::new(0.0, 0.0),
                end: Point2d::new(100.0, 0.0),
                speed_limit: 15.0,
            },
        );
        lane.add_control(80.0, ControlId::default());
        lane.add_control(20.0, ControlId::default());
        lane.add_control(50.0, ControlId::default());
        let positions = lane.controls().iter().map(|(p, _)| *p).collect::<Vec<_>>();
        assert_eq!(positions, vec![20.0, 50.0, 80.0]);
    }
}
