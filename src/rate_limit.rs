use std::collections::HashMap;

use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};

use crate::{config::RateLimitConfig, error::AppError};

#[derive(Debug, Clone, Copy)]
struct Attempts {
    count: u32,
    reset_at: OffsetDateTime,
}

/// Failed-attempt counter per identifier, owned by `AppState`.
/// Best-effort: lost on restart.
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Attempts>>,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            window: cfg.window(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Refuses when `key` has used up its attempts in the current window.
    pub fn check(&self, key: &str, now: OffsetDateTime) -> Result<(), AppError> {
        let mut entries = self.entries.lock();
        match entries.get(key).copied() {
            Some(a) if a.reset_at <= now => {
                entries.remove(key);
                Ok(())
            }
            Some(a) if a.count >= self.max_attempts => Err(AppError::RateLimited {
                retry_after_secs: (a.reset_at - now).whole_seconds().max(1) as u64,
            }),
            _ => Ok(()),
        }
    }

    pub fn record_failure(&self, key: &str, now: OffsetDateTime) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert(Attempts {
            count: 0,
            reset_at: now + self.window,
        });
        if entry.reset_at <= now {
            *entry = Attempts {
                count: 0,
                reset_at: now + self.window,
            };
        }
        entry.count += 1;
    }

    pub fn reset(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Drops windows that have already closed.
    pub fn prune(&self, now: OffsetDateTime) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, a| a.reset_at > now);
        before - entries.len()
    }
}
