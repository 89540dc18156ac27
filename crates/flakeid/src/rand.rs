use ::rand::{Rng, rng};

/// A trait for random sources that return random integers.
///
/// The generator draws from this source to reseed the sequence at the start
/// of every millisecond, so tests can plug in a fixed value.
///
/// # Example
/// ```
/// use flakeid::RandSource;
///
/// struct FixedRand;
/// impl RandSource for FixedRand {
///     fn rand(&self) -> u64 {
///         1234
///     }
/// }
///
/// let rng = FixedRand;
/// assert_eq!(rng.rand(), 1234);
/// ```
pub trait RandSource {
    /// Returns a random integer.
    fn rand(&self) -> u64;
}

/// A `RandSource` that uses the thread-local RNG (`rand::rng()`).
///
/// Each OS thread has its own RNG instance. This type does **not** store the
/// RNG itself; it accesses the thread-local generator on each call, so it is
/// `Send + Sync` and may be shared freely.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadRandom;

impl RandSource for ThreadRandom {
    fn rand(&self) -> u64 {
        rng().random()
    }
}
