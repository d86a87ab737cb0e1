//! Tests of reproducibility, validation and error reporting.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use traffic_drivers::{
    cgmath::Point2, AttributeProfile, CarAttributes, ControlKind, LaneAttributes, LaneId,
    RoadNetwork, SimConfig, SimError, SimEvent, Simulation, TrafficLight,
};

/// Builds two parallel lanes with a signal across both and a stop sign further on.
fn two_lane_road() -> (RoadNetwork, [LaneId; 2]) {
    let mut network = RoadNetwork::new();
    let lanes = [3.5, 0.0].map(|y| {
        network.add_lane(&LaneAttributes {
            start: Point2::new(0.0, y),
            end: Point2::new(800.0, y),
            speed_limit: 25.0,
        })
    });
    network.set_adjacent(lanes[0], lanes[1]).unwrap();
    let light = network.add_traffic_light(TrafficLight::fixed_time(15.0, 3.0, 12.0, 0.0).unwrap());
    let junction = network.add_junction();
    for lane in lanes {
        network
            .add_control(lane, 300.0, ControlKind::Signal { light })
            .unwrap();
        network
            .add_control(lane, 600.0, ControlKind::StopSign { junction })
            .unwrap();
    }
    (network, lanes)
}

fn busy_simulation(seed: u64) -> Simulation {
    let (network, lanes) = two_lane_road();
    let mut sim = Simulation::new(network, SimConfig::new(seed, 0.1)).unwrap();
    let mut rng = SmallRng::seed_from_u64(99);
    for lane in lanes {
        for i in 0..12 {
            let profile = AttributeProfile::new(CarAttributes {
                velocity: rng.gen_range(5.0..15.0),
                max_speed: rng.gen_range(15.0..30.0),
                aggression_level: rng.gen(),
                risk_tolerance: rng.gen(),
                distraction_level: rng.gen_range(0.0..0.5),
                lane_change_frequency: rng.gen_range(0.0..10.0),
                merge_aggression: rng.gen(),
                turn_signal_usage: rng.gen(),
                yellow_light_behavior: rng.gen(),
                stop_sign_compliance: rng.gen(),
                ..Default::default()
            })
            .unwrap();
            sim.add_vehicle(profile, lane, 10.0 + 20.0 * i as f64).unwrap();
        }
    }
    sim
}

/// Test that two runs from the same seed produce identical output.
#[test]
fn same_seed_same_output() {
    let mut a = busy_simulation(1234);
    let mut b = busy_simulation(1234);
    for _ in 0..400 {
        assert_eq!(a.step().unwrap(), b.step().unwrap());
    }
}

/// Test that a cloned simulation continues exactly like the original.
#[test]
fn clone_continues_identically() {
    let mut sim = busy_simulation(77);
    sim.run(100).unwrap();
    let mut copy = sim.clone();
    assert_eq!(sim.run(200).unwrap(), copy.run(200).unwrap());
}

/// Test that the committed state stays physically sensible under load.
#[test]
fn vehicles_stay_within_their_limits() {
    let mut sim = busy_simulation(5);
    for _ in 0..400 {
        let output = sim.step().unwrap();
        assert_eq!(output.vehicles.len(), sim.iter_vehicles().count());
        for vehicle in sim.iter_vehicles() {
            let profile = vehicle.profile();
            assert!(vehicle.vel() >= 0.0);
            assert!(vehicle.acc() >= -profile.deceleration() - 1e-9);
            assert!(vehicle.acc() <= profile.acceleration() + 1e-9);
        }
        for pair in output.vehicles.windows(2) {
            assert!(pair[0].vehicle_id < pair[1].vehicle_id);
        }
    }
}

/// Test that malformed input is rejected up front.
#[test]
fn rejects_invalid_input() {
    let err = AttributeProfile::new(CarAttributes {
        stop_sign_compliance: 1.5,
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, SimError::InvalidAttribute { field: "stop_sign_compliance", .. }));

    let (network, _) = two_lane_road();
    assert!(matches!(
        Simulation::new(network, SimConfig::new(0, 0.0)),
        Err(SimError::InvalidConfig(_))
    ));

    let mut network = RoadNetwork::new();
    let lane = network.add_lane(&LaneAttributes {
        start: Point2::new(0.0, 0.0),
        end: Point2::new(100.0, 0.0),
        speed_limit: 10.0,
    });
    network.set_lane_drop(lane).unwrap();
    assert!(matches!(
        Simulation::new(network, SimConfig::default()),
        Err(SimError::PerceptionInconsistency(_))
    ));

    let (network, lanes) = two_lane_road();
    let mut sim = Simulation::new(network, SimConfig::default()).unwrap();
    let profile = AttributeProfile::new(CarAttributes::default()).unwrap();
    assert!(sim.add_vehicle(profile.clone(), lanes[0], 900.0).is_err());
    let veh = sim.add_vehicle(profile, lanes[0], 10.0).unwrap();
    assert!(sim.remove_vehicle(veh).is_some());
    assert_eq!(
        sim.set_vehicle_destination(veh, Some(lanes[1])),
        Err(SimError::UnknownVehicle(veh))
    );
}

/// Test that overlapping vehicles are reported and pulled apart.
#[test]
fn overlap_is_corrected_and_reported() {
    let mut network = RoadNetwork::new();
    let lane = network.add_lane(&LaneAttributes {
        start: Point2::new(0.0, 0.0),
        end: Point2::new(500.0, 0.0),
        speed_limit: 20.0,
    });
    let mut sim = Simulation::new(network, SimConfig::default()).unwrap();
    let profile = AttributeProfile::new(CarAttributes {
        velocity: 10.0,
        ..Default::default()
    })
    .unwrap();
    let behind = sim.add_vehicle(profile.clone(), lane, 48.0).unwrap();
    let ahead = sim.add_vehicle(profile, lane, 50.0).unwrap();

    let output = sim.step().unwrap();
    assert!(output.events.contains(&SimEvent::EmergencyBrake {
        vehicle: behind,
        cause: traffic_drivers::EmergencyCause::Overlap,
    }));
    assert!(output.events.iter().any(|event| matches!(
        event,
        SimEvent::Collision { leader, follower, .. } if *leader == ahead && *follower == behind
    )));

    let (behind, ahead) = (sim.get_vehicle(behind).unwrap(), sim.get_vehicle(ahead).unwrap());
    assert_eq!(behind.vel(), 0.0);
    assert!(behind.pos_front() <= ahead.pos_rear() + 1e-9);
}

/// Test that an overlap spanning the join between two lanes is corrected.
#[test]
fn overlap_across_lane_connection_is_corrected() {
    let mut network = RoadNetwork::new();
    let first = network.add_lane(&LaneAttributes {
        start: Point2::new(0.0, 0.0),
        end: Point2::new(100.0, 0.0),
        speed_limit: 20.0,
    });
    let second = network.add_lane(&LaneAttributes {
        start: Point2::new(100.0, 0.0),
        end: Point2::new(300.0, 0.0),
        speed_limit: 20.0,
    });
    network.connect(first, second).unwrap();
    let mut sim = Simulation::new(network, SimConfig::default()).unwrap();
    let profile = AttributeProfile::new(CarAttributes::default()).unwrap();
    let behind = sim.add_vehicle(profile.clone(), first, 98.0).unwrap();
    let ahead = sim.add_vehicle(profile, second, 1.0).unwrap();

    let output = sim.step().unwrap();
    assert!(output.events.iter().any(|event| matches!(
        event,
        SimEvent::Collision { leader, follower, .. } if *leader == ahead && *follower == behind
    )));

    let (behind, ahead) = (sim.get_vehicle(behind).unwrap(), sim.get_vehicle(ahead).unwrap());
    assert_eq!(behind.lane_id(), first);
    assert_eq!(behind.vel(), 0.0);
    assert!(behind.pos_front() <= 100.0 + ahead.pos_rear() + 1e-9);
}
