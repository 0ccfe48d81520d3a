//! Seedable randomness behind every fault decision.
//!
//! Drop coins, jitter, reordering delays and unwired timeouts all sample
//! from one thread-local `ChaCha8Rng`. Seeding it with [`set_rng_seed`]
//! makes a single-threaded run reproduce exactly; each thread keeps its own
//! state, so multi-threaded runs stay seedable per thread while tests run in
//! parallel.

use std::cell::RefCell;
use std::ops::Range;
use std::time::Duration;

use rand::distr::uniform::SampleUniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

thread_local! {
    static FAULT_RNG: RefCell<ChaCha8Rng> = RefCell::new(ChaCha8Rng::from_os_rng());

    /// Last seed applied on this thread, for failure reports.
    static CURRENT_SEED: RefCell<u64> = const { RefCell::new(0) };
}

/// Seed the fault RNG for the current thread.
///
/// The same seed reproduces the same sequence of drop coins and delays on
/// that thread.
///
/// # Examples
///
/// ```
/// use simrpc::{rng_seed, set_rng_seed};
///
/// set_rng_seed(42);
/// assert_eq!(rng_seed(), 42);
/// ```
pub fn set_rng_seed(seed: u64) {
    FAULT_RNG.with(|rng| {
        *rng.borrow_mut() = ChaCha8Rng::seed_from_u64(seed);
    });
    CURRENT_SEED.with(|current| {
        *current.borrow_mut() = seed;
    });
}

/// The seed last applied on the current thread, or 0 if never seeded.
///
/// Include this in failure reports so a chaotic run can be replayed.
pub fn rng_seed() -> u64 {
    CURRENT_SEED.with(|current| *current.borrow())
}

/// Sample a value from `range` (exclusive upper bound).
pub(crate) fn random_range<T>(range: Range<T>) -> T
where
    T: SampleUniform + PartialOrd,
{
    FAULT_RNG.with(|rng| rng.borrow_mut().random_range(range))
}

/// Like [`random_range`], but an empty range yields its start value instead
/// of panicking. Keeps zeroed tuning knobs legal.
pub(crate) fn random_range_or_default<T>(range: Range<T>) -> T
where
    T: SampleUniform + PartialOrd,
{
    if range.start >= range.end {
        range.start
    } else {
        random_range(range)
    }
}

/// A uniform `f64` in `[0, 1)`, for probability coins.
pub(crate) fn random_ratio() -> f64 {
    FAULT_RNG.with(|rng| rng.borrow_mut().random())
}

/// Sample a duration uniformly from `[0, limit)`, at millisecond grain.
pub(crate) fn random_delay(limit: Duration) -> Duration {
    Duration::from_millis(random_range_or_default(0..limit.as_millis() as u64))
}
