//! Randomness seam
//!
//! Role draws, task sampling, colours and join codes all go through
//! [`RandomSource`] so tests can script the outcome.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the random choices the game makes
pub trait RandomSource: Send + Sync {
    /// Uniform index in `[0, len)`. `len` is never zero.
    fn index(&mut self, len: usize) -> usize;

    /// `amount` distinct indices from `[0, len)`, in draw order.
    /// `amount` is never larger than `len`.
    fn sample(&mut self, len: usize, amount: usize) -> Vec<usize>;

    /// Uppercase alphanumeric string of `len` characters
    fn code(&mut self, len: usize) -> String;
}

/// [`RandomSource`] backed by any `rand` generator
#[derive(Debug)]
pub struct RngSource<R>(pub R);

impl RngSource<StdRng> {
    /// Generator seeded from the operating system
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send + Sync> RandomSource for RngSource<R> {
    fn index(&mut self, len: usize) -> usize {
        self.0.gen_range(0..len)
    }

    fn sample(&mut self, len: usize, amount: usize) -> Vec<usize> {
        rand::seq::index::sample(&mut self.0, len, amount).into_vec()
    }

    fn code(&mut self, len: usize) -> String {
        (&mut self.0)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect()
    }
}

/// Player colour in CSS `rgb()` notation
pub fn random_colour(rng: &mut dyn RandomSource) -> String {
    format!(
        "rgb({}, {}, {})",
        rng.index(256),
        rng.index(256),
        rng.index(256)
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_shape() {
        let mut rng = RngSource::seeded(7);
        let code = rng.code(8);
        assert_eq!(code.len(), 8);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_sample_is_distinct() {
        let mut rng = RngSource::seeded(42);
        let mut picked = rng.sample(5, 5);
        picked.sort_unstable();
        assert_eq!(picked, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_colour_format() {
        let mut rng = testing::ScriptedSource::new([1, 2, 255]);
        assert_eq!(random_colour(&mut rng), "rgb(1, 2, 255)");
    }
}
