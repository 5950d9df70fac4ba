//! Microsecond time source.
//!
//! The scheduler only needs elapsed time between two nearby instants, so a
//! free-running, wrapping 32-bit microsecond counter is enough. All
//! comparisons go through [`elapsed_micros`], which stays correct across the
//! wrap roughly every 71 minutes.

/// A free-running microsecond counter.
pub trait MicrosClock {
    /// Current counter value. Wraps on overflow.
    fn now_micros(&self) -> u32;
}

impl<T: MicrosClock + ?Sized> MicrosClock for &T {
    fn now_micros(&self) -> u32 {
        (**self).now_micros()
    }
}

/// Microseconds from `since` to `now`, tolerating one counter wrap.
#[must_use]
#[inline]
pub const fn elapsed_micros(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Clock backed by the embassy time driver.
#[cfg(feature = "embassy-time")]
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EmbassyClock;

#[cfg(feature = "embassy-time")]
impl MicrosClock for EmbassyClock {
    fn now_micros(&self) -> u32 {
        embassy_time::Instant::now().as_micros() as u32
    }
}
