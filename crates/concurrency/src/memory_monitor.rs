//! Process memory-pressure sampling.
//!
//! A small struct sampled by a dedicated background worker against exactly
//! two priority tiers — `High` and `Critical`. The actual RSS sample comes
//! from `sysinfo`, the standard crate for reading process memory use
//! portably across platforms.

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// The two pressure watermarks, expressed as a fraction of
/// [`MemoryThresholds::budget_bytes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryThresholds {
    /// Byte budget pressure is measured against (e.g. a configured cache +
    /// working-set ceiling for this process).
    pub budget_bytes: u64,
    /// Fraction of `budget_bytes` at which [`PressureLevel::High`] kicks in.
    /// Defaults to 0.80.
    pub high_watermark: f64,
    /// Fraction of `budget_bytes` at which [`PressureLevel::Critical`]
    /// kicks in. Defaults to 0.95.
    pub critical_watermark: f64,
}

impl MemoryThresholds {
    /// Build thresholds against a byte budget using the default watermark
    /// fractions.
    pub fn with_budget(budget_bytes: u64) -> Self {
        MemoryThresholds { budget_bytes, high_watermark: 0.80, critical_watermark: 0.95 }
    }
}

/// The current pressure level, computed from a sampled RSS against
/// [`MemoryThresholds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    /// Below the high watermark. No action needed.
    Normal,
    /// Above the high watermark: caches should be shrunk and allocating
    /// telemetry disabled.
    High,
    /// Above the critical watermark: refuse new chunked writes, clear
    /// non-essential caches, hint at compaction.
    Critical,
}

/// Samples this process's resident memory and classifies it against
/// configured thresholds.
pub struct MemoryMonitor {
    system: System,
    pid: Pid,
    thresholds: MemoryThresholds,
}

impl MemoryMonitor {
    /// Build a monitor for the current process.
    pub fn new(thresholds: MemoryThresholds) -> Self {
        let pid = Pid::from_u32(std::process::id());
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_memory()),
        );
        MemoryMonitor { system, pid, thresholds }
    }

    /// Re-sample this process's RSS, in bytes.
    pub fn sample_rss_bytes(&mut self) -> u64 {
        self.system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        self.system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    /// Re-sample and classify the current pressure level.
    pub fn sample(&mut self) -> PressureLevel {
        let rss = self.sample_rss_bytes();
        self.classify(rss)
    }

    /// Classify an already-sampled RSS value against the configured
    /// thresholds, without touching the OS. Exposed separately so callers
    /// (and tests) can drive the state machine with synthetic values.
    pub fn classify(&self, rss_bytes: u64) -> PressureLevel {
        let budget = self.thresholds.budget_bytes.max(1) as f64;
        let ratio = rss_bytes as f64 / budget;
        if ratio >= self.thresholds.critical_watermark {
            PressureLevel::Critical
        } else if ratio >= self.thresholds.high_watermark {
            PressureLevel::High
        } else {
            PressureLevel::Normal
        }
    }

    /// The thresholds this monitor was configured with.
    pub fn thresholds(&self) -> MemoryThresholds {
        self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_below_high_as_normal() {
        let monitor = MemoryMonitor::new(MemoryThresholds::with_budget(1_000_000));
        assert_eq!(monitor.classify(100_000), PressureLevel::Normal);
    }

    #[test]
    fn classifies_above_high_watermark() {
        let monitor = MemoryMonitor::new(MemoryThresholds::with_budget(1_000_000));
        assert_eq!(monitor.classify(850_000), PressureLevel::High);
    }

    #[test]
    fn classifies_above_critical_watermark() {
        let monitor = MemoryMonitor::new(MemoryThresholds::with_budget(1_000_000));
        assert_eq!(monitor.classify(960_000), PressureLevel::Critical);
    }

    #[test]
    fn live_sample_does_not_panic() {
        let mut monitor = MemoryMonitor::new(MemoryThresholds::with_budget(1_000_000_000));
        let _ = monitor.sample();
    }
}
