//! Deterministic per-vehicle, per-tick random number generation.
//!
//! Every draw is made from a `SmallRng` seeded by mixing the simulation seed
//! with the vehicle's key, the tick index and a stream tag. No generator is
//! shared between vehicles or carried between ticks, so the outcome of a tick
//! does not depend on the order (or the threads) in which vehicles are processed.

use crate::VehicleId;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use slotmap::Key;

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Separates the draws made by different models within one tick.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Stream {
    Perception = 1,
    Lateral = 2,
    Intersection = 3,
}

pub(crate) struct VehicleRng(SmallRng);

impl VehicleRng {
    /// Seeds a generator for one vehicle, tick and stream.
    pub fn new(seed: u64, vehicle: VehicleId, tick: u64, stream: Stream) -> Self {
        let key = vehicle.data().as_ffi();
        let mixed = seed
            ^ key.wrapping_mul(MIXING_CONSTANT)
            ^ tick.wrapping_add(1).wrapping_mul(MIXING_CONSTANT).rotate_left(21)
            ^ (stream as u64).wrapping_mul(MIXING_CONSTANT).rotate_left(42);
        VehicleRng(SmallRng::seed_from_u64(mixed))
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.0.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Samples a normally distributed value with zero mean.
    pub fn noise(&mut self, stddev: f64) -> f64 {
        match Normal::new(0.0, stddev) {
            Ok(distr) => distr.sample(&mut self.0),
            Err(_) => 0.0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::{KeyData, SlotMap};

    fn draws(mut rng: VehicleRng) -> Vec<f64> {
        (0..8).map(|_| rng.noise(1.0)).collect()
    }

    #[test]
    fn same_inputs_same_draws() {
        let id = VehicleId::from(KeyData::from_ffi(7));
        let a = draws(VehicleRng::new(42, id, 3, Stream::Perception));
        let b = draws(VehicleRng::new(42, id, 3, Stream::Perception));
        assert_eq!(a, b);
    }

    #[test]
    fn draws_differ_by_vehicle_tick_and_stream() {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let (v1, v2) = (ids.insert(()), ids.insert(()));
        let base = draws(VehicleRng::new(42, v1, 3, Stream::Perception));
        assert_ne!(base, draws(VehicleRng::new(42, v2, 3, Stream::Perception)));
        assert_ne!(base, draws(VehicleRng::new(42, v1, 4, Stream::Perception)));
        assert_ne!(base, draws(VehicleRng::new(42, v1, 3, Stream::Lateral)));
        assert_ne!(base, draws(VehicleRng::new(43, v1, 3, Stream::Perception)));
    }

    #[test]
    fn certain_and_impossible_events() {
        let id = VehicleId::from(KeyData::from_ffi(1));
        let mut rng = VehicleRng::new(0, id, 0, Stream::Intersection);
        assert!((0..100).all(|_| rng.gen_bool(1.0)));
        assert!((0..100).all(|_| !rng.gen_bool(0.0)));
    }
}
