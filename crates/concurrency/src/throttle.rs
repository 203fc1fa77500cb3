//! Per-client request throttle.
//!
//! A sliding window per client, backed by a `DashMap` sharded by client id
//! so independent clients never contend on the same lock.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Configuration for [`RequestThrottle`].
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// Requests per rolling minute before a client is throttled.
    pub max_requests_per_minute: u32,
    /// Repeated calls to the *same* endpoint within this window trigger the
    /// repeat signal.
    pub repeat_window: Duration,
    /// Number of repeats within `repeat_window` before throttling kicks in.
    pub repeat_threshold: u32,
    /// Upper bound on the delay this throttle will ever impose.
    pub max_delay: Duration,
    /// How long a cached response may be served in place of redoing the
    /// work.
    pub cache_duration: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        ThrottleConfig {
            max_requests_per_minute: 600,
            repeat_window: Duration::from_secs(5),
            repeat_threshold: 10,
            max_delay: Duration::from_secs(2),
            cache_duration: Duration::from_secs(10),
        }
    }
}

/// What a caller should do after consulting the throttle for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleDecision<T> {
    /// Proceed normally.
    Proceed,
    /// Sleep for this long (capped at `max_delay`) before proceeding.
    Delay(Duration),
    /// Serve this cached response instead of redoing the work.
    ServeCached(T),
}

struct ClientWindow<T> {
    minute_start: Instant,
    requests_this_minute: u32,
    last_fingerprint: Option<(String, Instant, u32)>,
    cached: Option<(String, T, Instant)>,
}

/// Tracks per-client request rate and repeated-request bursts, independent
/// of any particular transport.
pub struct RequestThrottle<T: Clone> {
    clients: DashMap<String, ClientWindow<T>>,
    config: ThrottleConfig,
}

impl<T: Clone> RequestThrottle<T> {
    /// Build a throttle with the given configuration.
    pub fn new(config: ThrottleConfig) -> Self {
        RequestThrottle { clients: DashMap::new(), config }
    }

    /// Record a request from `client_id` against `fingerprint` (typically
    /// `"<endpoint>:<args-hash>"`) and decide what the caller should do.
    pub fn check(&self, client_id: &str, fingerprint: &str) -> ThrottleDecision<T> {
        let now = Instant::now();
        let mut entry = self.clients.entry(client_id.to_string()).or_insert_with(|| ClientWindow {
            minute_start: now,
            requests_this_minute: 0,
            last_fingerprint: None,
            cached: None,
        });

        if now.duration_since(entry.minute_start) >= Duration::from_secs(60) {
            entry.minute_start = now;
            entry.requests_this_minute = 0;
        }
        entry.requests_this_minute += 1;

        let repeat_count = match &mut entry.last_fingerprint {
            Some((fp, since, count)) if fp == fingerprint && now.duration_since(*since) <= self.config.repeat_window => {
                *count += 1;
                *count
            }
            _ => {
                entry.last_fingerprint = Some((fingerprint.to_string(), now, 1));
                1
            }
        };

        let over_rate = entry.requests_this_minute > self.config.max_requests_per_minute;
        let over_repeat = repeat_count > self.config.repeat_threshold;

        if !over_rate && !over_repeat {
            return ThrottleDecision::Proceed;
        }

        if let Some((fp, cached_at, value)) = &entry.cached {
            if fp == fingerprint && now.duration_since(*cached_at) <= self.config.cache_duration {
                return ThrottleDecision::ServeCached(value.clone());
            }
        }

        let over_by = entry.requests_this_minute.saturating_sub(self.config.max_requests_per_minute) as u64;
        let delay = Duration::from_millis((over_by * 50).min(self.config.max_delay.as_millis() as u64));
        ThrottleDecision::Delay(delay)
    }

    /// Cache a response for `fingerprint` so a subsequent throttled request
    /// from the same client can be served it instead of redoing the work.
    pub fn cache_response(&self, client_id: &str, fingerprint: &str, response: T) {
        if let Some(mut entry) = self.clients.get_mut(client_id) {
            entry.cached = Some((fingerprint.to_string(), Instant::now(), response));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proceeds_under_limits() {
        let throttle: RequestThrottle<()> = RequestThrottle::new(ThrottleConfig::default());
        assert_eq!(throttle.check("client-a", "GET:/x"), ThrottleDecision::Proceed);
    }

    #[test]
    fn throttles_repeated_requests() {
        let config = ThrottleConfig { repeat_threshold: 3,..ThrottleConfig::default() };
        let throttle: RequestThrottle<()> = RequestThrottle::new(config);
        for _ in 0..3 {
            assert_eq!(throttle.check("client-a", "GET:/x"), ThrottleDecision::Proceed);
        }
        match throttle.check("client-a", "GET:/x") {
            ThrottleDecision::Delay(d) => assert!(d <= Duration::from_secs(2)),
            other => panic!("expected Delay, got {other:?}"),
        }
    }

    #[test]
    fn serves_cached_response_once_throttled() {
        let config = ThrottleConfig { repeat_threshold: 1,..ThrottleConfig::default() };
        let throttle: RequestThrottle<&'static str> = RequestThrottle::new(config);
        let _ = throttle.check("client-a", "GET:/x");
        throttle.cache_response("client-a", "GET:/x", "cached-body");
        match throttle.check("client-a", "GET:/x") {
            ThrottleDecision::ServeCached(body) => assert_eq!(body, "cached-body"),
            other => panic!("expected ServeCached, got {other:?}"),
        }
    }

    #[test]
    fn independent_clients_have_independent_windows() {
        let config = ThrottleConfig { repeat_threshold: 1,..ThrottleConfig::default() };
        let throttle: RequestThrottle<()> = RequestThrottle::new(config);
        let _ = throttle.check("client-a", "GET:/x");
        assert_eq!(throttle.check("client-b", "GET:/x"), ThrottleDecision::Proceed);
    }
}
