//! Retention policy types.
//!
//! `KeepAll`/`KeepLast`/`KeepFor`/`Composite`, evaluated per tag namespace
//! via a `should_retain` predicate — the composite override key is the tag
//! namespace rather than any global axis.

use std::collections::HashMap;
use std::time::Duration;

use entitydb_core::Timestamp;

/// A policy governing how long superseded tags (and, by extension, logically
/// deleted entities and orphaned chunks) are retained before the retention
/// collector is allowed to prune them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RetentionPolicy {
    /// Keep everything forever. The default; never prunes.
    #[default]
    KeepAll,
    /// Keep only the most recent `n` tags per namespace.
    KeepLast(usize),
    /// Keep tags newer than `now - duration`.
    KeepFor(Duration),
    /// Per-namespace overrides over a default policy.
    Composite {
        default: Box<RetentionPolicy>,
        overrides: HashMap<String, Box<RetentionPolicy>>,
    },
}

impl RetentionPolicy {
    /// Construct a `KeepLast(n)` policy.
    ///
    /// # Panics
    /// Panics if `n` is 0.
    pub fn keep_last(n: usize) -> Self {
        assert!(n > 0, "KeepLast(n) requires n > 0");
        RetentionPolicy::KeepLast(n)
    }

    /// Construct a `KeepFor(duration)` policy.
    ///
    /// # Panics
    /// Panics if `duration` is zero.
    pub fn keep_for(duration: Duration) -> Self {
        assert!(!duration.is_zero(), "KeepFor requires non-zero duration");
        RetentionPolicy::KeepFor(duration)
    }

    /// Start building a composite policy with per-namespace overrides.
    pub fn composite(default: RetentionPolicy) -> CompositeBuilder {
        CompositeBuilder { default: Box::new(default), overrides: HashMap::new() }
    }

    /// Whether a tag should be retained.
    ///
    /// * `timestamp` — the tag's own timestamp.
    /// * `rank_from_newest` — 0 for the most recent tag in its namespace, 1
    ///   for the next, etc. (only consulted by `KeepLast`).
    /// * `now` — current time, for `KeepFor`.
    /// * `namespace` — the tag's namespace, for `Composite` override lookup.
    pub fn should_retain(
        &self,
        timestamp: Timestamp,
        rank_from_newest: usize,
        now: Timestamp,
        namespace: &str,
    ) -> bool {
        match self {
            RetentionPolicy::KeepAll => true,
            RetentionPolicy::KeepLast(n) => rank_from_newest < *n,
            RetentionPolicy::KeepFor(duration) => {
                let cutoff = now.as_nanos().saturating_sub(duration.as_nanos() as i64);
                timestamp.as_nanos() >= cutoff
            }
            RetentionPolicy::Composite { default, overrides } => {
                let policy = overrides.get(namespace).unwrap_or(default);
                policy.should_retain(timestamp, rank_from_newest, now, namespace)
            }
        }
    }
}

/// Builder for [`RetentionPolicy::Composite`].
pub struct CompositeBuilder {
    default: Box<RetentionPolicy>,
    overrides: HashMap<String, Box<RetentionPolicy>>,
}

impl CompositeBuilder {
    /// Override the policy for one namespace.
    pub fn with_override(mut self, namespace: impl Into<String>, policy: RetentionPolicy) -> Self {
        self.overrides.insert(namespace.into(), Box::new(policy));
        self
    }

    /// Finish building.
    pub fn build(self) -> RetentionPolicy {
        RetentionPolicy::Composite { default: self.default, overrides: self.overrides }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_all_always_retains() {
        let p = RetentionPolicy::KeepAll;
        assert!(p.should_retain(Timestamp::from_nanos(0), 1000, Timestamp::from_nanos(1_000_000), "status"));
    }

    #[test]
    fn keep_last_bounds_by_rank() {
        let p = RetentionPolicy::keep_last(2);
        assert!(p.should_retain(Timestamp::from_nanos(0), 0, Timestamp::from_nanos(0), "status"));
        assert!(p.should_retain(Timestamp::from_nanos(0), 1, Timestamp::from_nanos(0), "status"));
        assert!(!p.should_retain(Timestamp::from_nanos(0), 2, Timestamp::from_nanos(0), "status"));
    }

    #[test]
    fn keep_for_bounds_by_age() {
        let p = RetentionPolicy::keep_for(Duration::from_secs(60));
        let now = Timestamp::from_nanos(120_000_000_000);
        let recent = Timestamp::from_nanos(100_000_000_000);
        let old = Timestamp::from_nanos(10_000_000_000);
        assert!(p.should_retain(recent, 0, now, "status"));
        assert!(!p.should_retain(old, 0, now, "status"));
    }

    #[test]
    fn composite_dispatches_by_namespace() {
        let p = RetentionPolicy::composite(RetentionPolicy::keep_last(1))
            .with_override("audit", RetentionPolicy::KeepAll)
            .build();
        assert!(!p.should_retain(Timestamp::from_nanos(0), 5, Timestamp::from_nanos(0), "status"));
        assert!(p.should_retain(Timestamp::from_nanos(0), 5, Timestamp::from_nanos(0), "audit"));
    }

    #[test]
    #[should_panic(expected = "KeepLast(n) requires n > 0")]
    fn keep_last_zero_panics() {
        RetentionPolicy::keep_last(0);
    }
}
