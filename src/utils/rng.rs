//! Seeded random number generation for reproducibility.
//!
//! Every random decision of a training run (data shuffling, weight
//! initialization, dropout masks, tack-on noise) is drawn from one `StdRng`
//! created here, so a fixed seed reproduces a run exactly.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fallback used when the clock cannot be read.
const FALLBACK_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Resolves a configured seed.
///
/// A seed of zero means "derive one from the current time". Such runs are not
/// reproducible; the derived seed is logged so a run can still be replayed.
pub fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let resolved = if nanos == 0 { FALLBACK_SEED } else { nanos };
    log::warn!("seed 0 requested, using time-derived seed {resolved}; this run is not reproducible");
    resolved
}

/// Creates a generator from an already resolved seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Random permutation of `0..len`.
pub fn permutation(len: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = seeded_rng(42);
        let mut rng2 = seeded_rng(42);

        for _ in 0..100 {
            assert_eq!(rng1.random::<u32>(), rng2.random::<u32>());
        }
    }

    #[test]
    fn test_explicit_seed_is_kept() {
        assert_eq!(resolve_seed(7), 7);
    }

    #[test]
    fn test_zero_seed_is_replaced() {
        assert_ne!(resolve_seed(0), 0);
    }

    #[test]
    fn test_permutation_contains_every_index() {
        let mut rng = seeded_rng(33333);
        let mut data = permutation(10, &mut rng);
        data.sort();
        assert_eq!(data, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_permutation_empty() {
        let mut rng = seeded_rng(44444);
        assert!(permutation(0, &mut rng).is_empty());
    }
}
