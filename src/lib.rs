pub use attributes::{AttributeProfile, CarAttributes, METRES_PER_MILE};
pub use cgmath;
pub use config::SimConfig;
pub use controller::{
    Decision, EmergencyCause, IntersectionAction, IntersectionPhase, IntersectionState,
    LaneChangePhase, LaneIntent, LongitudinalController,
};
pub use error::{SimError, SimResult};
pub use lane::{Lane, LaneAttributes, Side};
pub use light::{LightState, Phase, TrafficLight};
pub use network::{ControlKind, ControlPoint, RoadNetwork};
pub use perception::{AdjacentGap, ControlAhead, Neighbour, Perception};
pub use simulation::Simulation;
pub use slotmap::{Key, KeyData};
use slotmap::{new_key_type, SlotMap};
pub use snapshot::{SimEvent, TickOutput, VehicleRecord};
pub use util::Interval;
pub use vehicle::{Vehicle, LANE_WIDTH, VEHICLE_LENGTH};

mod attributes;
mod config;
mod conflict;
mod controller;
mod debug;
mod error;
mod lane;
mod light;
pub mod math;
mod network;
mod perception;
mod rng;
mod simulation;
mod snapshot;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Lane].
    pub struct LaneId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
    /// Unique ID of a [TrafficLight].
    pub struct TrafficLightId;
    /// Unique ID of a group of stop signs which share right of way.
    pub struct JunctionId;
    /// Unique ID of a [ControlPoint].
    pub struct ControlId;
}

type LaneSet = SlotMap<LaneId, Lane>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;
