//! Miscellaneous utility structs and functions.

use cgmath::num_traits::Float;
use std::fmt::Debug;

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: std::cmp::PartialOrd> Interval<T> {
    /// Returns true if this interval overlaps with the other.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.max > other.min && other.max > self.min
    }
}

impl<T: Float> Interval<T> {
    /// Computes the gap between two intervals.
    /// Will be negative if the intervals overlap.
    pub fn clearance_with(&self, other: &Self) -> T {
        T::max(other.min - self.max, self.min - other.max)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

#[cfg(test)]
mod test {
    use super::Interval;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn clearance_and_overlap() {
        let a: Interval<f64> = Interval::new(8.0, 12.0);
        let b = Interval::new(13.0, 17.0);
        assert!(!a.overlaps(&b));
        assert_approx_eq!(a.clearance_with(&b), 1.0);
        assert_approx_eq!(b.clearance_with(&a), 1.0);
        let c = Interval::new(9.0, 13.0);
        assert!(a.overlaps(&c));
        assert!(a.clearance_with(&c) < 0.0);
    }
}
