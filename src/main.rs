use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use traffic_drivers::cgmath::Point2;
use traffic_drivers::{
    AttributeProfile, CarAttributes, ControlKind, LaneAttributes, LaneId, RoadNetwork, SimConfig,
    SimError, SimEvent, SimResult, Simulation, TrafficLight,
};

const NUM_LANES: usize = 3;
const SECTION_LENGTH: f64 = 400.0;
const VEHICLES_PER_LANE: usize = 20;

/// Builds a corridor of three parallel lanes in two sections, with a signal
/// at the end of the first section and a stop sign on the last lane.
fn corridor() -> SimResult<(RoadNetwork, Vec<LaneId>)> {
    let mut network = RoadNetwork::new();
    let mut sections = vec![];
    for section in 0..2 {
        let x0 = section as f64 * SECTION_LENGTH;
        let lanes = (0..NUM_LANES)
            .map(|i| {
                let y = 3.5 * (NUM_LANES - 1 - i) as f64;
                network.add_lane(&LaneAttributes {
                    start: Point2::new(x0, y),
                    end: Point2::new(x0 + SECTION_LENGTH, y),
                    speed_limit: 25.0,
                })
            })
            .collect::<Vec<_>>();
        for pair in lanes.windows(2) {
            network.set_adjacent(pair[0], pair[1])?;
        }
        sections.push(lanes);
    }
    for (from, to) in sections[0].iter().zip(&sections[1]) {
        network.connect(*from, *to)?;
    }

    let light = TrafficLight::fixed_time(30.0, 4.0, 20.0, 0.0)
        .ok_or_else(|| SimError::InvalidConfig("bad light timings".into()))?;
    let light = network.add_traffic_light(light);
    for lane in &sections[0] {
        network.add_control(*lane, SECTION_LENGTH - 1.0, ControlKind::Signal { light })?;
    }
    let junction = network.add_junction();
    network.add_control(sections[1][NUM_LANES - 1], 200.0, ControlKind::StopSign { junction })?;

    Ok((network, sections.swap_remove(0)))
}

fn random_profile(rng: &mut SmallRng) -> SimResult<AttributeProfile> {
    AttributeProfile::new(CarAttributes {
        velocity: rng.gen_range(5.0..15.0),
        max_speed: rng.gen_range(20.0..32.0),
        acceleration: rng.gen_range(1.5..3.5),
        deceleration: rng.gen_range(4.0..8.0),
        aggression_level: rng.gen(),
        reaction_time: rng.gen_range(0.5..1.5),
        risk_tolerance: rng.gen(),
        experience_level: rng.gen(),
        distraction_level: rng.gen_range(0.0..0.5),
        tailgate_distance: rng.gen_range(1.0..4.0),
        following_distance: rng.gen_range(1.0..3.0),
        lane_change_frequency: rng.gen_range(0.0..8.0),
        merge_aggression: rng.gen(),
        turn_signal_usage: rng.gen(),
        wait_time: rng.gen_range(1.0..10.0),
        yellow_light_behavior: rng.gen(),
        stop_sign_compliance: rng.gen(),
        ..Default::default()
    })
}

fn main() -> SimResult<()> {
    let (network, entry) = corridor()?;
    let mut sim = Simulation::new(network, SimConfig::new(42, 0.1))?;

    let mut rng = SmallRng::seed_from_u64(42);
    for lane in &entry {
        for i in 0..VEHICLES_PER_LANE {
            let offset = 10.0 + 15.0 * i as f64;
            sim.add_vehicle(random_profile(&mut rng)?, *lane, offset)?;
        }
    }

    println!("Simulating...");
    const NUM_FRAMES: u32 = 1000;
    let start = Instant::now();
    let mut collisions = 0;
    for _ in 0..NUM_FRAMES {
        let output = sim.step()?;
        collisions += output
            .events
            .iter()
            .filter(|event| matches!(event, SimEvent::Collision { .. }))
            .count();
    }
    let frame = start.elapsed() / NUM_FRAMES;
    println!(
        "Avg. frame: {:?} --> {}x speedup ({} vehs remaining, {} collisions)",
        frame,
        0.1 / frame.as_secs_f32(),
        sim.iter_vehicles().count(),
        collisions,
    );
    Ok(())
}
