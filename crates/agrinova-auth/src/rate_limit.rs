//! Failed-login throttling keyed by client address.
//!
//! Only failures count. A client that reaches `max_failures` inside one
//! window is blocked for `block_secs`; a successful login clears its
//! record.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct FailureWindow {
    failures: u32,
    window_start: Instant,
    blocked_until: Option<Instant>,
}

#[derive(Debug)]
pub struct LoginRateLimiter {
    entries: DashMap<String, FailureWindow>,
    max_failures: u32,
    window: Duration,
    block: Duration,
}

impl LoginRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            max_failures: config.max_failures.max(1),
            window: Duration::from_secs(config.window_secs),
            block: Duration::from_secs(config.block_secs),
        }
    }

    /// `Err(retry_after)` while the client is blocked.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    /// Count one failure. Returns `true` when this failure trips the block.
    pub fn record_failure(&self, key: &str) -> bool {
        self.record_failure_at(key, Instant::now())
    }

    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop entries whose window and block have both lapsed.
    pub fn prune(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| {
            let blocked = entry.blocked_until.is_some_and(|until| now < until);
            blocked || now.duration_since(entry.window_start) < self.window
        });
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        match self.entries.get(key).and_then(|e| e.blocked_until) {
            Some(until) if now < until => Err(until - now),
            _ => Ok(()),
        }
    }

    fn record_failure_at(&self, key: &str, now: Instant) -> bool {
        let mut entry = self.entries.entry(key.to_string()).or_insert(FailureWindow {
            failures: 0,
            window_start: now,
            blocked_until: None,
        });

        let expired_block = entry.blocked_until.is_some_and(|until| now >= until);
        if expired_block || now.duration_since(entry.window_start) >= self.window {
            *entry = FailureWindow {
                failures: 0,
                window_start: now,
                blocked_until: None,
            };
        }

        entry.failures += 1;
        if entry.failures >= self.max_failures && entry.blocked_until.is_none() {
            entry.blocked_until = Some(now + self.block);
            return true;
        }
        false
    }
}

/// Reduce a client address to its host so every connection from one
/// machine shares a limiter entry. Handles `ip:port`, `[v6]:port` and
/// bare addresses.
pub fn strip_port(addr: &str) -> &str {
    let addr = addr.trim();
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match addr.rsplit_once(':') {
        // A single colon separates host and port; more means bare IPv6.
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => addr,
    }
}
