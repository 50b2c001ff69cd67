use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::audit;
use crate::errors::{Error, Result};

/// Configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of requests allowed per time window
    pub max_requests: usize,
    /// Sliding window duration in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: crate::constants::RATE_LIMIT_MAX_REQUESTS,
            window_seconds: crate::constants::RATE_LIMIT_WINDOW_SECS,
        }
    }
}

/// Paths exempt from rate limiting: health checks, interactive docs, and
/// webhook callbacks that carry their own signature verification.
const EXEMPT_PATHS: &[&str] = &["/health", "/docs", "/openapi.json", "/redoc"];
const EXEMPT_PREFIXES: &[&str] = &["/webhooks/"];

/// Per-IP sliding-window rate limiter.
///
/// Each IP owns a deque of request timestamps behind its own mutex, so
/// hot IPs never contend with each other; the outer map lock is held
/// only long enough to fetch or insert the per-IP slot. Eviction is
/// inline with each request; there is no background sweeper.
pub struct RateLimiter {
    config: RateLimitConfig,
    hits: Mutex<HashMap<String, Arc<Mutex<VecDeque<Instant>>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request. On rejection, `RateLimited` carries
    /// the `Retry-After` hint (the full window).
    pub fn check(&self, ip: &str, path: &str) -> Result<()> {
        if Self::is_exempt(path) {
            return Ok(());
        }

        let slot = {
            let mut hits = self.hits.lock().expect("rate limiter map poisoned");
            hits.entry(ip.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
                .clone()
        };

        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();

        let mut queue = slot.lock().expect("rate limiter slot poisoned");
        while let Some(oldest) = queue.front() {
            if now.duration_since(*oldest) >= window {
                queue.pop_front();
            } else {
                break;
            }
        }

        if queue.len() >= self.config.max_requests {
            audit::rate_limited(ip, path);
            return Err(Error::RateLimited {
                retry_after_secs: self.config.window_seconds,
            });
        }

        queue.push_back(now);
        Ok(())
    }

    /// Requests an IP may still make inside the current window.
    pub fn remaining(&self, ip: &str) -> usize {
        let slot = {
            let hits = self.hits.lock().expect("rate limiter map poisoned");
            match hits.get(ip) {
                Some(slot) => slot.clone(),
                None => return self.config.max_requests,
            }
        };

        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();
        let queue = slot.lock().expect("rate limiter slot poisoned");
        let current = queue
            .iter()
            .filter(|ts| now.duration_since(**ts) < window)
            .count();
        self.config.max_requests.saturating_sub(current)
    }

    /// Number of IPs currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.hits.lock().expect("rate limiter map poisoned").len()
    }

    fn is_exempt(path: &str) -> bool {
        EXEMPT_PATHS.contains(&path) || EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: usize, window_seconds: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_seconds,
        })
    }

    #[test]
    fn test_limit_enforced_per_ip() {
        let limiter = limiter(3, 60);

        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1", "/license/activate").is_ok());
        }
        match limiter.check("10.0.0.1", "/license/activate") {
            Err(Error::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        // A different IP is unaffected.
        assert!(limiter.check("10.0.0.2", "/license/activate").is_ok());
    }

    #[test]
    fn test_window_eviction_readmits() {
        let limiter = limiter(2, 0);

        assert!(limiter.check("10.0.0.1", "/license/validate").is_ok());
        assert!(limiter.check("10.0.0.1", "/license/validate").is_ok());
        // window_seconds == 0 means every prior hit is already expired.
        assert!(limiter.check("10.0.0.1", "/license/validate").is_ok());
    }

    #[test]
    fn test_exempt_paths_bypass() {
        let limiter = limiter(1, 60);

        for _ in 0..10 {
            assert!(limiter.check("10.0.0.1", "/health").is_ok());
            assert!(limiter.check("10.0.0.1", "/docs").is_ok());
            assert!(limiter.check("10.0.0.1", "/webhooks/billing").is_ok());
        }
        // Exempt traffic never consumed the budget.
        assert!(limiter.check("10.0.0.1", "/license/activate").is_ok());
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = limiter(5, 60);
        assert_eq!(limiter.remaining("10.0.0.1"), 5);
        limiter.check("10.0.0.1", "/license/activate").unwrap();
        limiter.check("10.0.0.1", "/license/activate").unwrap();
        assert_eq!(limiter.remaining("10.0.0.1"), 3);
    }
}
