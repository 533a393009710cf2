pub use rand::{Rng, SeedableRng, rngs::StdRng};

const CONST_SEED: u64 = 42;

/// Returns a random number generator seeded with a fixed value, so test data is reproducible.
#[inline(always)]
pub fn get_seeded_rng() -> StdRng {
    StdRng::seed_from_u64(CONST_SEED)
}

/// Fills a vector with values drawn uniformly from `[low, high)`.
pub fn uniform_vec<R: Rng>(rng: &mut R, len: usize, low: f64, high: f64) -> alloc::vec::Vec<f64> {
    (0..len).map(|_| rng.random_range(low..high)).collect()
}

/// Fills a vector with integer-valued floats in `[low, high)`. Sums of such values are exact, so
/// results do not depend on the order in which lanes accumulate them.
pub fn integer_valued_vec<R: Rng>(
    rng: &mut R,
    len: usize,
    low: i32,
    high: i32,
) -> alloc::vec::Vec<f64> {
    (0..len)
        .map(|_| rng.random_range(low..high) as f64)
        .collect()
}
