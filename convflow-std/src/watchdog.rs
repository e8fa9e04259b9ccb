//! Watchdog counter.

/// Counts consecutive idle cycles and expires after `limit` of them.
///
/// The counter is a plain value so that it can live in the registers of a pure state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watchdog {
    limit: u64,
    count: u64,
}

impl Watchdog {
    /// Creates a watchdog expiring after `limit` idle cycles.
    pub const fn new(limit: u64) -> Self { Self { limit, count: 0 } }

    /// Smallest power of two number of cycles covering `seconds` at `clock_hz`, saturating at `2^63`.
    pub fn timeout_for(clock_hz: u64, seconds: u64) -> u64 {
        clock_hz.saturating_mul(seconds).checked_next_power_of_two().unwrap_or(1 << 63)
    }

    /// Expiry threshold.
    pub fn limit(&self) -> u64 { self.limit }

    /// Consecutive idle cycles so far.
    pub fn count(&self) -> u64 { self.count }

    /// Whether the idle period reached the threshold.
    pub fn expired(&self) -> bool { self.count >= self.limit }

    /// Counter after an idle cycle.
    #[must_use]
    pub fn advance(self) -> Self { Self { count: self.count.saturating_add(1), ..self } }

    /// Counter after a cycle with activity.
    #[must_use]
    pub fn kick(self) -> Self { Self { count: 0, ..self } }
}
