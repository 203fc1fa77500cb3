//! Nanosecond-resolution timestamps.

use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A point in time expressed as nanoseconds since the Unix epoch.
///
/// Internally every timestamp in the engine is an `i64` nanosecond count
///. `Timestamp` never needs to format itself as RFC3339 in this
/// crate — that conversion belongs to the wire/HTTP layer, which is out of
/// scope here — but it exposes the raw nanosecond count so that layer can do
/// the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The zero timestamp (Unix epoch). Used as the lower bound of
    /// `GetAsOf`-style range scans.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Wrap a raw nanosecond count.
    pub const fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    /// The current wall-clock time, nanosecond resolution.
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(dur.as_nanos() as i64)
    }

    /// The raw nanosecond count.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Rewrite a caller-supplied timestamp to preserve per-entity
    /// monotonicity: an out-of-order value (one that would precede the last
    /// timestamp already observed for this entity) is rewritten to
    /// `max(observed, now)`. A value that is already non-decreasing is left
    /// untouched.
    pub fn monotonic(self, last_observed: Option<Timestamp>) -> Timestamp {
        match last_observed {
            Some(last) if self < last => last.max(Timestamp::now()),
            _ => self,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd<i64> for Timestamp {
    fn partial_cmp(&self, other: &i64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_epoch() {
        assert!(Timestamp::now() > Timestamp::EPOCH);
    }

    #[test]
    fn monotonic_never_goes_backwards() {
        let last = Timestamp::from_nanos(1_000_000);
        let stale = Timestamp::from_nanos(1);
        let rewritten = stale.monotonic(Some(last));
        assert!(rewritten >= last);
    }

    #[test]
    fn monotonic_keeps_already_advancing_value() {
        let last = Timestamp::from_nanos(100);
        let advancing = Timestamp::now();
        assert_eq!(advancing.monotonic(Some(last)), advancing.max(last));
    }
}
