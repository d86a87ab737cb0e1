use crate::attributes::AttributeProfile;
use crate::config::SimConfig;
use crate::conflict::{self, Claim};
use crate::controller::{self, EmergencyCause, IntersectionPhase, LaneChangePhase, Proposal};
#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::debug::debug_decision;
use crate::error::{SimError, SimResult};
use crate::lane::Side;
use crate::network::{ControlKind, RoadNetwork};
use crate::snapshot::{Occupancy, SimEvent, TickOutput, VehicleRecord, WorldView};
use crate::vehicle::Vehicle;
use crate::{JunctionId, LaneId, VehicleId, VehicleSet};
use log::{debug, error, trace, warn};
use slotmap::SecondaryMap;

/// A traffic simulation.
///
/// Each tick runs in two phases. First every vehicle decides what to do,
/// reading only the state committed at the end of the previous tick. Then
/// the decisions are reconciled and applied one vehicle at a time, in
/// ascending ID order. The result depends only on the network, the vehicles
/// and the seed, never on the order in which the decisions were computed.
#[derive(Clone)]
pub struct Simulation {
    /// The road network.
    network: RoadNetwork,
    /// The seed and tick duration.
    config: SimConfig,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The vehicles on each lane.
    occupancy: Occupancy,
    /// The set of "frozen" vehicles, which will not move.
    frozen_vehs: Vec<VehicleId>,
    /// When each stop sign junction becomes free again, in s.
    junction_busy: SecondaryMap<JunctionId, f64>,
    /// The number of ticks simulated so far.
    tick: u64,
    /// Debugging information from the previously simulated tick.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Simulation {
    /// Creates a new simulation on the given network.
    pub fn new(network: RoadNetwork, config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        if let Err(err) = network.validate() {
            error!("Cannot simulate a malformed network: {err}");
            return Err(err);
        }
        Ok(Self {
            network,
            config,
            vehicles: VehicleSet::with_key(),
            occupancy: Occupancy::default(),
            frozen_vehs: vec![],
            junction_busy: SecondaryMap::new(),
            tick: 0,
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
        })
    }

    /// Adds a vehicle to the simulation.
    ///
    /// # Parameters
    /// * `profile` - The driver's attributes
    /// * `lane` - The lane to place the vehicle on
    /// * `offset` - The position of the centre of the vehicle along the lane in m
    pub fn add_vehicle(
        &mut self,
        profile: AttributeProfile,
        lane: LaneId,
        offset: f64,
    ) -> SimResult<VehicleId> {
        let length = self.network.lane(lane)?.length();
        if !(0.0..=length).contains(&offset) {
            return Err(SimError::InvalidConfig(format!(
                "offset {offset} lies outside lane {lane:?}"
            )));
        }
        let vehicle_id = self.vehicles.insert_with_key(|id| {
            let mut vehicle = Vehicle::new(id, profile, lane, offset);
            vehicle.update_coords(&self.network);
            vehicle
        });
        self.occupancy = Occupancy::build(&self.vehicles);
        Ok(vehicle_id)
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        let vehicle = self.vehicles.remove(id)?;
        self.frozen_vehs.retain(|frozen| *frozen != id);
        self.occupancy = Occupancy::build(&self.vehicles);
        Some(vehicle)
    }

    /// Re-issues a vehicle's attributes. They apply from the next tick.
    pub fn set_vehicle_profile(&mut self, id: VehicleId, profile: AttributeProfile) -> SimResult<()> {
        self.vehicle_mut(id)?.set_profile(profile);
        Ok(())
    }

    /// Sets the lane the vehicle would like to end up in, or clears it.
    pub fn set_vehicle_destination(&mut self, id: VehicleId, lane: Option<LaneId>) -> SimResult<()> {
        if let Some(lane) = lane {
            self.network.lane(lane)?;
        }
        self.vehicle_mut(id)?.set_destination(lane);
        Ok(())
    }

    /// Sets the `frozen` attribute of a vehicle. When a vehicle is frozen,
    /// it will maximally decelerate until its velocity is zero and remain stopped
    /// until it is no longer frozen.
    pub fn set_vehicle_frozen(&mut self, vehicle_id: VehicleId, frozen: bool) {
        let idx = self.frozen_vehs.iter().position(|id| *id == vehicle_id);
        match (frozen, idx) {
            (true, None) if self.vehicles.contains_key(vehicle_id) => {
                self.frozen_vehs.push(vehicle_id);
            }
            (false, Some(idx)) => {
                self.frozen_vehs.remove(idx);
            }
            _ => {}
        }
    }

    /// Gets the `frozen` attribute of a vehicle. [Read more](Self::set_vehicle_frozen).
    pub fn get_vehicle_frozen(&self, vehicle_id: VehicleId) -> bool {
        self.frozen_vehs.iter().any(|id| *id == vehicle_id)
    }

    /// Advances the simulation by one tick.
    ///
    /// Fails only if the world is found to be inconsistent; failures of a
    /// single vehicle's models are reported as events and that vehicle
    /// brakes as hard as it can instead.
    pub fn step(&mut self) -> SimResult<TickOutput> {
        let dt = self.config.tick_duration;
        let time = self.time();
        let mut events = vec![];

        let mut proposals = self.decide(&mut events)?;
        self.apply_frozen_vehicles(&mut proposals);
        conflict::resolve_merges(&self.vehicles, &mut proposals);
        self.grant_right_of_way(&mut proposals, &mut events, time);
        self.commit(proposals, &mut events, dt);
        self.advance_vehicles(&mut events)?;

        self.occupancy = Occupancy::build(&self.vehicles);
        events.extend(conflict::correct_collisions(
            &self.network,
            &mut self.vehicles,
            &self.occupancy,
        ));
        self.update_vehicle_coords();

        self.tick += 1;
        trace!(
            "Tick {} simulated: {} vehicles, {} events",
            self.tick,
            self.vehicles.len(),
            events.len()
        );

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }

        Ok(TickOutput {
            tick: self.tick - 1,
            time: self.time(),
            vehicles: self.snapshot(),
            events,
        })
    }

    /// Advances the simulation by the given number of ticks.
    pub fn run(&mut self, ticks: usize) -> SimResult<Vec<TickOutput>> {
        (0..ticks).map(|_| self.step()).collect()
    }

    /// Gets the number of ticks simulated so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Gets the current simulation time in s.
    pub fn time(&self) -> f64 {
        self.tick as f64 * self.config.tick_duration
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// The state of every vehicle, in ascending ID order.
    pub fn snapshot(&self) -> Vec<VehicleRecord> {
        self.vehicles.values().map(Vehicle::record).collect()
    }

    /// Gets the decisions made during the previously simulated tick as a JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&self) -> serde_json::Value {
        self.debug.clone()
    }

    fn vehicle_mut(&mut self, id: VehicleId) -> SimResult<&mut Vehicle> {
        self.vehicles.get_mut(id).ok_or(SimError::UnknownVehicle(id))
    }

    /// Runs every vehicle's models against the committed state.
    ///
    /// Fatal errors abort the tick. A vehicle whose models failed
    /// brakes as hard as it can instead.
    fn decide(&self, events: &mut Vec<SimEvent>) -> SimResult<SecondaryMap<VehicleId, Proposal>> {
        let view = WorldView {
            network: &self.network,
            vehicles: &self.vehicles,
            occupancy: &self.occupancy,
            seed: self.config.seed,
            tick: self.tick,
            time: self.time(),
            dt: self.config.tick_duration,
        };

        #[cfg(feature = "parallel")]
        let decided: Vec<_> = {
            use rayon::prelude::*;
            let ids = self.vehicles.keys().collect::<Vec<_>>();
            ids.into_par_iter()
                .map(|id| (id, controller::decide(&view, &self.vehicles[id])))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let decided: Vec<_> = self
            .vehicles
            .iter()
            .map(|(id, vehicle)| (id, controller::decide(&view, vehicle)))
            .collect();

        let mut proposals = SecondaryMap::new();
        for (id, result) in decided {
            let proposal = match result {
                Ok(proposal) => proposal,
                Err(err) if err.is_fatal() => {
                    error!("Vehicle {id:?} found the world inconsistent: {err}");
                    return Err(err);
                }
                Err(err) => {
                    warn!("Vehicle {id:?} fell back to an emergency stop: {err}");
                    events.push(SimEvent::ControllerFallback {
                        vehicle: id,
                        reason: err.to_string(),
                    });
                    Proposal::fallback(&self.vehicles[id], EmergencyCause::ControllerFault)
                }
            };
            proposals.insert(id, proposal);
        }
        Ok(proposals)
    }

    /// Applies a large negative acceleration to all frozen vehicles.
    fn apply_frozen_vehicles(&mut self, proposals: &mut SecondaryMap<VehicleId, Proposal>) {
        let vehicles = &self.vehicles;
        self.frozen_vehs.retain(|vehicle_id| {
            if let (Some(vehicle), Some(proposal)) =
                (vehicles.get(*vehicle_id), proposals.get_mut(*vehicle_id))
            {
                proposal.brake(vehicle.profile().deceleration(), EmergencyCause::Frozen);
                true
            } else {
                false
            }
        })
    }

    /// Lets vehicles waiting at stop signs cross when it is their turn.
    fn grant_right_of_way(
        &mut self,
        proposals: &mut SecondaryMap<VehicleId, Proposal>,
        events: &mut Vec<SimEvent>,
        time: f64,
    ) {
        let claims = proposals
            .iter()
            .filter_map(|(id, proposal)| {
                let state = proposal.intersection?;
                let IntersectionPhase::Waiting { arrived } = state.phase else {
                    return None;
                };
                let ControlKind::StopSign { junction } = self.network.control(state.control)?.kind
                else {
                    return None;
                };
                Some(Claim {
                    vehicle: id,
                    junction,
                    arrived,
                    waited: time - arrived,
                    patience: self.vehicles.get(id)?.profile().wait_time(),
                })
            })
            .collect();

        for (id, junction) in conflict::grant_right_of_way(claims, &mut self.junction_busy, time) {
            if let Some(state) = proposals.get_mut(id).and_then(|p| p.intersection.as_mut()) {
                state.phase = IntersectionPhase::Proceeding;
            }
            debug!("Vehicle {id:?} was given right of way at {junction:?}");
            events.push(SimEvent::RightOfWayGranted {
                vehicle: id,
                junction,
            });
        }
    }

    /// Applies the decisions, integrating the velocities and positions of all vehicles.
    fn commit(
        &mut self,
        mut proposals: SecondaryMap<VehicleId, Proposal>,
        events: &mut Vec<SimEvent>,
        dt: f64,
    ) {
        for (id, vehicle) in &mut self.vehicles {
            let Some(proposal) = proposals.remove(id) else {
                continue;
            };
            debug_decision(&proposal.decision);

            if let Some(cause) = proposal.emergency {
                if vehicle.vel() > 0.0 {
                    events.push(SimEvent::EmergencyBrake { vehicle: id, cause });
                }
            }
            if let Some(side) = proposal.lane_change_started {
                debug!("Vehicle {id:?} signalled a lane change to the {side:?}");
                vehicle.reset_lane_change_distance();
                events.push(SimEvent::LaneChangeStarted { vehicle: id, side });
            }
            if proposal.lane_change_aborted {
                debug!("Vehicle {id:?} abandoned its lane change");
                events.push(SimEvent::LaneChangeAborted { vehicle: id });
            }

            vehicle.set_lane_change(proposal.lane_change);
            vehicle.set_intersection(proposal.intersection);
            vehicle.integrate(proposal.decision.target_acceleration, dt);

            if let LaneChangePhase::Merging {
                target, progress, ..
            } = proposal.lane_change
            {
                if progress >= 1.0 {
                    vehicle.set_location(target, vehicle.pos_mid());
                    vehicle.set_lane_change(LaneChangePhase::Cruising);
                    debug!("Vehicle {id:?} moved into {target:?}");
                    events.push(SimEvent::LaneChangeCompleted {
                        vehicle: id,
                        lane: target,
                    });
                }
            }
        }
    }

    /// Find vehicles that have advanced past the end of their lane and either
    /// move them to the next lane or remove them from the simulation.
    fn advance_vehicles(&mut self, events: &mut Vec<SimEvent>) -> SimResult<()> {
        let mut exited = vec![];

        for (id, vehicle) in &mut self.vehicles {
            loop {
                let lane = self.network.lane(vehicle.lane_id())?;
                if lane.drops() && vehicle.pos_front() > lane.length() {
                    // Nowhere to go but the neighbouring lanes
                    vehicle.force_stop(lane.length() - vehicle.half_length());
                    break;
                }
                if vehicle.pos_mid() <= lane.length() {
                    break;
                }
                let Some(next) = lane.lane_out() else {
                    exited.push(id);
                    break;
                };

                // Carry any lane change over to the lane alongside the next one
                let phase = *vehicle.lane_change();
                if let Some(target) = phase.target() {
                    let next_lane = self.network.lane(next)?;
                    let next_target = self.network.lane(target)?.lane_out().filter(|out| {
                        [Side::Left, Side::Right]
                            .into_iter()
                            .any(|side| next_lane.adjacent(side) == Some(*out))
                    });
                    if next_target.is_none() {
                        events.push(SimEvent::LaneChangeAborted { vehicle: id });
                    }
                    vehicle.set_lane_change(phase.retarget(next_target));
                }
                vehicle.set_location(next, vehicle.pos_mid() - lane.length());
            }
        }

        for id in exited {
            self.remove_vehicle(id);
            debug!("Vehicle {id:?} left the network");
            events.push(SimEvent::VehicleExited { vehicle: id });
        }
        Ok(())
    }

    /// Updates the world coordinates of all the vehicles.
    fn update_vehicle_coords(&mut self) {
        for vehicle in self.vehicles.values_mut() {
            vehicle.update_coords(&self.network);
        }
    }
}
