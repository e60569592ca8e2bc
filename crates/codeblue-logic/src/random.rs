//! Seedable random source shared by every probabilistic decision.
//!
//! A session owns exactly one [`RandomSource`] and threads it by `&mut`
//! into each kernel call that draws. Every decision point consumes a
//! single [`RandomSource::next_f64`] draw, so replaying the same seed with
//! the same sequence of requests reproduces the same timeline exactly.
//!
//! ```
//! use codeblue_logic::random::RandomSource;
//!
//! let mut a = RandomSource::new(7);
//! let mut b = RandomSource::new(7);
//! assert_eq!(a.next_f64(), b.next_f64());
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed used by [`RandomSource::default`] and [`RandomSource::reset`].
pub const DEFAULT_SEED: u64 = 12345;

/// Session-owned pseudorandom generator.
///
/// Not `Clone`: two handles drawing from copies of one stream would let a
/// session diverge from its own replay.
#[derive(Debug)]
pub struct RandomSource {
    seed: u64,
    rng: StdRng,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restart the stream from `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Restart the stream from [`DEFAULT_SEED`].
    pub fn reset(&mut self) {
        self.set_seed(DEFAULT_SEED);
    }

    /// The seed the current stream was started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform draw in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Bernoulli trial: `true` with probability `p` (clamped to `[0, 1]`).
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p.clamp(0.0, 1.0)
    }

    /// `base + floor(draw * span)`, i.e. uniform over `base..base + span`.
    pub fn uniform_int(&mut self, base: i32, span: u32) -> i32 {
        base + (self.next_f64() * span as f64).floor() as i32
    }

    /// Uniform integer offset in `[-radius, radius]`.
    pub fn jitter(&mut self, radius: u32) -> i32 {
        self.uniform_int(-(radius as i32), radius * 2 + 1)
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = RandomSource::new(99);
        let mut b = RandomSource::new(99);
        for _ in 0..100 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn reset_returns_to_default_stream() {
        let mut fresh = RandomSource::default();
        let expected: Vec<f64> = (0..5).map(|_| fresh.next_f64()).collect();

        let mut rng = RandomSource::new(1);
        rng.next_f64();
        rng.reset();
        assert_eq!(rng.seed(), DEFAULT_SEED);
        let replay: Vec<f64> = (0..5).map(|_| rng.next_f64()).collect();
        assert_eq!(expected, replay);
    }

    #[test]
    fn set_seed_restarts_stream() {
        let mut rng = RandomSource::new(5);
        let first = rng.next_f64();
        rng.next_f64();
        rng.set_seed(5);
        assert_eq!(rng.next_f64(), first);
    }

    #[test]
    fn draws_are_unit_interval() {
        let mut rng = RandomSource::new(3);
        for _ in 0..1000 {
            let x = rng.next_f64();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn uniform_int_stays_in_band() {
        let mut rng = RandomSource::new(11);
        for _ in 0..1000 {
            let hr = rng.uniform_int(85, 20);
            assert!((85..105).contains(&hr));
        }
    }

    #[test]
    fn jitter_bounded() {
        let mut rng = RandomSource::new(13);
        let mut seen = [false; 3];
        for _ in 0..1000 {
            let j = rng.jitter(1);
            assert!((-1..=1).contains(&j));
            seen[(j + 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn chance_extremes() {
        let mut rng = RandomSource::new(17);
        for _ in 0..100 {
            assert!(!rng.chance(0.0));
            assert!(rng.chance(1.0));
        }
    }
}
