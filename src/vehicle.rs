use crate::attributes::AttributeProfile;
use crate::controller::{IntersectionState, LaneChangePhase};
use crate::math::{CubicFn, Point2d};
use crate::network::RoadNetwork;
use crate::snapshot::VehicleRecord;
use crate::{LaneId, VehicleId};

/// The length of every simulated vehicle, in m.
pub const VEHICLE_LENGTH: f64 = 4.5;

/// The lateral distance between the centre lines of adjacent lanes, in m.
pub const LANE_WIDTH: f64 = 3.5;

/// Velocities below this are snapped to zero when integrating, in m/s.
const VELOCITY_EPSILON: f64 = 1e-9;

/// A simulated vehicle and the per-tick state owned by the simulation.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The driver's tuning attributes.
    profile: AttributeProfile,
    /// Half the vehicle's length in m.
    half_len: f64,
    /// The lane the vehicle is travelling on.
    lane: LaneId,
    /// The longitudinal position of the centre of the vehicle along its lane, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// The velocity at the end of the tick before last, in m/s.
    prev_vel: f64,
    /// The acceleration applied during the last tick, in m/s<sup>2</sup>.
    acc: f64,
    /// The state of the lane changing model.
    lane_change: LaneChangePhase,
    /// Distance travelled since the last lane change intent, in m.
    /// `None` if the vehicle has never signalled a lane change.
    since_lane_change: Option<f64>,
    /// The state of the intersection model for the upcoming control point.
    intersection: Option<IntersectionState>,
    /// The lane the vehicle would like to end up in.
    destination: Option<LaneId>,
    /// The world space coordinates of the centre of the vehicle.
    world_pos: Point2d,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(id: VehicleId, profile: AttributeProfile, lane: LaneId, pos: f64) -> Self {
        let vel = profile.initial_velocity();
        Self {
            id,
            profile,
            half_len: 0.5 * VEHICLE_LENGTH,
            lane,
            pos,
            vel,
            prev_vel: vel,
            acc: 0.0,
            lane_change: LaneChangePhase::Cruising,
            since_lane_change: None,
            intersection: None,
            destination: None,
            world_pos: Point2d::new(0.0, 0.0),
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The driver's tuning attributes.
    pub fn profile(&self) -> &AttributeProfile {
        &self.profile
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    pub(crate) fn half_length(&self) -> f64 {
        self.half_len
    }

    /// The ID of the lane the vehicle is currently travelling on.
    pub fn lane_id(&self) -> LaneId {
        self.lane
    }

    /// The longitudinal position of the centre of the vehicle in m.
    pub fn pos_mid(&self) -> f64 {
        self.pos
    }

    /// The longitudinal position of the rear of the vehicle in m.
    pub fn pos_rear(&self) -> f64 {
        self.pos - self.half_len
    }

    /// The longitudinal position of the front of the vehicle in m.
    pub fn pos_front(&self) -> f64 {
        self.pos + self.half_len
    }

    /// The coordinates in world space of the centre of the vehicle.
    pub fn position(&self) -> Point2d {
        self.world_pos
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The velocity one tick ago, as seen by a driver reacting late.
    pub(crate) fn prev_vel(&self) -> f64 {
        self.prev_vel
    }

    /// The acceleration applied during the last tick in m/s<sup>2</sup>.
    pub fn acc(&self) -> f64 {
        self.acc
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.vel == 0.0
    }

    pub fn lane_change(&self) -> &LaneChangePhase {
        &self.lane_change
    }

    pub fn intersection(&self) -> Option<&IntersectionState> {
        self.intersection.as_ref()
    }

    pub fn destination(&self) -> Option<LaneId> {
        self.destination
    }

    pub(crate) fn since_lane_change(&self) -> Option<f64> {
        self.since_lane_change
    }

    pub(crate) fn set_profile(&mut self, profile: AttributeProfile) {
        self.profile = profile;
    }

    pub(crate) fn set_destination(&mut self, lane: Option<LaneId>) {
        self.destination = lane;
    }

    pub(crate) fn set_lane_change(&mut self, phase: LaneChangePhase) {
        self.lane_change = phase;
    }

    pub(crate) fn set_intersection(&mut self, state: Option<IntersectionState>) {
        self.intersection = state;
    }

    /// Restarts the distance count towards the next permitted lane change.
    pub(crate) fn reset_lane_change_distance(&mut self) {
        self.since_lane_change = Some(0.0);
    }

    /// Integrates the vehicle's velocity and position.
    ///
    /// # Parameters
    /// * `acc` - The acceleration to apply, in m/s<sup>2</sup>
    /// * `dt` - The time step in seconds
    pub(crate) fn integrate(&mut self, acc: f64, dt: f64) {
        let mut vel = f64::max(self.vel + dt * acc, 0.0);
        if vel < VELOCITY_EPSILON {
            vel = 0.0;
        }
        let travelled = 0.5 * (self.vel + vel) * dt;
        self.prev_vel = self.vel;
        self.vel = vel;
        self.acc = acc;
        self.pos += travelled;
        if let Some(dist) = self.since_lane_change.as_mut() {
            *dist += travelled;
        }
    }

    /// Moves the vehicle onto another lane at the given position.
    pub(crate) fn set_location(&mut self, lane: LaneId, pos: f64) {
        self.lane = lane;
        self.pos = pos;
    }

    /// Brings the vehicle to an immediate halt with its centre at `pos`.
    pub(crate) fn force_stop(&mut self, pos: f64) {
        self.pos = pos;
        self.vel = 0.0;
        self.acc = 0.0;
    }

    /// Updates the vehicle's world coordinates.
    pub(crate) fn update_coords(&mut self, network: &RoadNetwork) {
        let lat = match self.lane_change {
            LaneChangePhase::Merging { side, progress, .. } => {
                CubicFn::from_ends(0.0, 0.0, 1.0, side.sign() * LANE_WIDTH).y(progress)
            }
            _ => 0.0,
        };
        if let Ok(pos) = network.sample(self.lane, self.pos, lat) {
            self.world_pos = pos;
        }
    }

    /// Produces the output record for this vehicle.
    pub(crate) fn record(&self) -> VehicleRecord {
        VehicleRecord {
            vehicle_id: self.id,
            lane_id: self.lane,
            position: self.pos,
            world: self.world_pos,
            velocity: self.vel,
        }
    }
}
