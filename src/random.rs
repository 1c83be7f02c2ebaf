//! Small sampling helpers over an injected [`Rng`].
//!
//! Nothing in the crate touches a global RNG: callers pass a seeded generator
//! (usually `StdRng::seed_from_u64`) so terrain, algae and flocks are reproducible.

use rand::Rng;

use crate::types::Value;

/// Uniform sample in `[min, max)`. Returns `min` when the range is empty.
pub fn random_between<R: Rng + ?Sized>(rng: &mut R, min: Value, max: Value) -> Value {
    if max <= min {
        return min;
    }
    rng.gen_range(min..max)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn samples_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let v = random_between(&mut rng, -2., 3.);
            assert!((-2. ..3.).contains(&v));
        }
    }

    #[test]
    fn empty_range_returns_min() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(random_between(&mut rng, 1., 1.), 1.);
    }
}
