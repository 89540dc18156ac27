use std::time::{SystemTime, UNIX_EPOCH};

/// Default epoch: Tuesday, January 1, 2019 00:00:00 UTC+8, in milliseconds
/// since the Unix epoch.
///
/// With a 41-bit timestamp field this epoch stays encodable until 2088.
pub const DEFAULT_EPOCH: u64 = 1_546_272_000_000;

/// A trait for wall-clock time sources.
///
/// This abstraction allows you to plug in the real system clock or a mocked
/// time source in tests.
///
/// The unit is **milliseconds since the Unix epoch**. The generator subtracts
/// its own epoch; time sources never see it.
///
/// # Example
///
/// ```
/// use flakeid::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

/// The operating system's wall clock.
///
/// Unlike a monotonic ticker this clock follows NTP steps and manual
/// adjustments, which is what lets the generator *detect* a backwards jump
/// and refuse to issue IDs instead of silently reusing timestamps.
#[derive(Default, Clone, Copy, Debug)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        // A clock before 1970 reads as zero and fails the epoch check.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_millis() as u64)
    }
}
