//! Per-client sliding-window rate limiting.
//!
//! Each client address owns a log of the instants at which its admitted
//! requests arrived. A request is admitted while fewer than `limit` entries
//! fall inside the trailing window. The log never grows past `limit`, and
//! the number of tracked clients is capped, so memory is bounded.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::observability::metrics;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Allowed { remaining: usize },
    Limited { retry_after: Duration },
}

impl RateLimitOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitOutcome::Allowed { .. })
    }
}

#[derive(Debug)]
struct ClientWindow {
    hits: VecDeque<Instant>,
    last_seen: Instant,
}

impl ClientWindow {
    fn new(now: Instant) -> Self {
        Self {
            hits: VecDeque::new(),
            last_seen: now,
        }
    }

    /// Drop hits that left the window.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window limiter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<IpAddr, ClientWindow>,
    limit: usize,
    window: Duration,
    max_clients: usize,
}

impl RateLimiter {
    /// Limiter admitting `per_minute` requests per rolling minute.
    pub fn per_minute(per_minute: u32, max_clients: usize) -> Self {
        Self::new(per_minute as usize, Duration::from_secs(60), max_clients)
    }

    pub fn new(limit: usize, window: Duration, max_clients: usize) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
            max_clients: max_clients.max(1),
        }
    }

    /// Check and, if admitted, record a request from `ip`.
    pub fn check(&self, ip: IpAddr) -> RateLimitOutcome {
        self.check_at(ip, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> RateLimitOutcome {
        if !self.windows.contains_key(&ip) && self.windows.len() >= self.max_clients {
            self.make_room(now);
        }

        // The entry guard holds the shard lock, so concurrent requests from
        // the same address serialize here.
        let mut entry = self
            .windows
            .entry(ip)
            .or_insert_with(|| ClientWindow::new(now));
        let client = entry.value_mut();
        client.prune(now, self.window);
        client.last_seen = now;

        if client.hits.len() < self.limit {
            client.hits.push_back(now);
            RateLimitOutcome::Allowed {
                remaining: self.limit - client.hits.len(),
            }
        } else {
            let retry_after = client
                .hits
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            RateLimitOutcome::Limited { retry_after }
        }
    }

    /// Remove clients with no hits left in the window. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let window = self.window;
        self.windows.retain(|_, client| {
            client.prune(now, window);
            !client.hits.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        metrics::record_rate_limit_clients(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "Swept idle rate-limit windows");
        }
        removed
    }

    /// Number of client addresses currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    fn make_room(&self, now: Instant) {
        self.sweep_at(now);
        if self.windows.len() < self.max_clients {
            return;
        }

        let oldest = self
            .windows
            .iter()
            .min_by_key(|entry| entry.value().last_seen)
            .map(|entry| *entry.key());
        if let Some(ip) = oldest {
            self.windows.remove(&ip);
            tracing::warn!(
                evicted = %ip,
                max_clients = self.max_clients,
                "Rate limiter at capacity, evicted least recently seen client"
            );
        }
    }
}
