//! Tests that involve vehicles passing signals and stop signs.

use traffic_drivers::{
    cgmath::Point2, AttributeProfile, CarAttributes, ControlKind, LaneAttributes, LaneId,
    LightState, RoadNetwork, SimConfig, SimEvent, Simulation, TrafficLight,
};

fn lane_at(network: &mut RoadNetwork, y: f64, length: f64) -> LaneId {
    network.add_lane(&LaneAttributes {
        start: Point2::new(0.0, y),
        end: Point2::new(length, y),
        speed_limit: 25.0,
    })
}

fn profile(velocity: f64) -> AttributeProfile {
    AttributeProfile::new(CarAttributes {
        velocity,
        distraction_level: 0.0,
        stop_sign_compliance: 1.0,
        ..Default::default()
    })
    .unwrap()
}

/// Test that a vehicle waits at a red light and drives on when it turns green.
#[test]
fn waits_for_green_light() {
    let mut network = RoadNetwork::new();
    let lane = lane_at(&mut network, 0.0, 400.0);
    // Red for the first 20 s
    let light = TrafficLight::fixed_time(10.0, 3.0, 20.0, 13.0).unwrap();
    assert_eq!(light.state_at(0.0).0, LightState::Red);
    assert_eq!(light.state_at(20.0).0, LightState::Green);
    let light = network.add_traffic_light(light);
    network
        .add_control(lane, 200.0, ControlKind::Signal { light })
        .unwrap();
    let mut sim = Simulation::new(network, SimConfig::new(9, 0.1)).unwrap();
    let veh = sim.add_vehicle(profile(15.0), lane, 20.0).unwrap();

    let mut waited = false;
    for _ in 0..195 {
        let output = sim.step().unwrap();
        assert!(!output
            .events
            .iter()
            .any(|event| matches!(event, SimEvent::EmergencyBrake { .. })));
        let vehicle = sim.get_vehicle(veh).unwrap();
        assert!(vehicle.pos_front() <= 200.0);
        waited |= vehicle.has_stopped();
    }
    assert!(waited);

    sim.run(100).unwrap();
    assert!(sim.get_vehicle(veh).unwrap().pos_front() > 200.0);
}

/// Test that a slow vehicle still far from the line during a short green
/// stops again when the light turns back to red.
#[test]
fn short_green_far_from_line_does_not_run_red() {
    let mut network = RoadNetwork::new();
    let lane = lane_at(&mut network, 0.0, 500.0);
    // Red for 40 s, then 2 s green and 1 s yellow
    let light = TrafficLight::fixed_time(2.0, 1.0, 40.0, 3.0).unwrap();
    let timeline = light.clone();
    let light = network.add_traffic_light(light);
    network
        .add_control(lane, 200.0, ControlKind::Signal { light })
        .unwrap();
    let mut sim = Simulation::new(network, SimConfig::new(12, 0.1)).unwrap();
    let veh = sim
        .add_vehicle(
            AttributeProfile::new(CarAttributes {
                max_speed: 3.0,
                distraction_level: 0.0,
                ..Default::default()
            })
            .unwrap(),
            lane,
            20.0,
        )
        .unwrap();

    let mut crossed = false;
    for _ in 0..1000 {
        let time = sim.time();
        let before = sim.get_vehicle(veh).unwrap().pos_front();
        sim.step().unwrap();
        let after = sim.get_vehicle(veh).unwrap().pos_front();
        if before <= 200.0 && after > 200.0 {
            let (state, _) = timeline.state_at(time);
            assert_ne!(state, LightState::Red, "crossed the line at t={time}");
            crossed = true;
            break;
        }
    }
    assert!(crossed);
}

/// Test that a vehicle which cannot stop for a red light brakes as hard as it can.
#[test]
fn brakes_hard_when_surprised_by_red() {
    let mut network = RoadNetwork::new();
    let lane = lane_at(&mut network, 0.0, 400.0);
    let light = TrafficLight::fixed_time(10.0, 3.0, 20.0, 13.0).unwrap();
    let light = network.add_traffic_light(light);
    network
        .add_control(lane, 60.0, ControlKind::Signal { light })
        .unwrap();
    let mut sim = Simulation::new(network, SimConfig::new(10, 0.1)).unwrap();
    let veh = sim.add_vehicle(profile(25.0), lane, 20.0).unwrap();

    let output = sim.step().unwrap();
    assert!(output.events.contains(&SimEvent::EmergencyBrake {
        vehicle: veh,
        cause: traffic_drivers::EmergencyCause::SignalViolation,
    }));
    let vehicle = sim.get_vehicle(veh).unwrap();
    assert!(vehicle.acc() <= -vehicle.profile().deceleration());
}

/// Test that vehicles at the same stop sign junction cross one at a time,
/// in the order they arrived.
#[test]
fn stop_sign_junction_grants_in_arrival_order() {
    let mut network = RoadNetwork::new();
    let north = lane_at(&mut network, 10.0, 300.0);
    let south = lane_at(&mut network, -10.0, 300.0);
    let junction = network.add_junction();
    for lane in [north, south] {
        network
            .add_control(lane, 200.0, ControlKind::StopSign { junction })
            .unwrap();
    }
    let mut sim = Simulation::new(network, SimConfig::new(11, 0.1)).unwrap();
    let first = sim.add_vehicle(profile(10.0), north, 120.0).unwrap();
    let second = sim.add_vehicle(profile(10.0), south, 110.0).unwrap();

    let mut grants = vec![];
    for _ in 0..400 {
        let output = sim.step().unwrap();
        for event in &output.events {
            if let SimEvent::RightOfWayGranted { vehicle, junction: granted } = event {
                assert_eq!(*granted, junction);
                grants.push((*vehicle, output.time));
            }
        }
    }

    assert_eq!(grants.len(), 2);
    assert_eq!(grants[0].0, first);
    assert_eq!(grants[1].0, second);
    assert!(grants[1].1 - grants[0].1 >= 2.9);
}
