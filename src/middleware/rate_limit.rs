//! Rate limiting middleware
//!
//! Per-user limits on conversation start commands, backed by a keyed
//! `governor` rate limiter.

use std::num::NonZeroU32;
use std::time::Duration;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::{debug, warn};
use crate::config::RateLimitConfig;
use crate::utils::errors::{BlueberryError, Result};

type KeyedLimiter = RateLimiter<i64, DefaultKeyedStateStore<i64>, DefaultClock>;

/// Rate limiting middleware keyed by user id
pub struct RateLimitMiddleware {
    limiter: KeyedLimiter,
    clock: DefaultClock,
    name: &'static str,
}

impl RateLimitMiddleware {
    /// Allow `max_calls` within `period` per user, refilling evenly
    pub fn new(name: &'static str, max_calls: u32, period: Duration) -> Result<Self> {
        let burst = NonZeroU32::new(max_calls)
            .ok_or_else(|| BlueberryError::Config(format!("{} rate limit needs at least one call", name)))?;
        let quota = Quota::with_period(period / burst.get())
            .ok_or_else(|| BlueberryError::Config(format!("{} rate limit needs a non-zero period", name)))?
            .allow_burst(burst);

        Ok(Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
            name,
        })
    }

    /// Limiter for `/register` starts
    pub fn for_registration(config: &RateLimitConfig) -> Result<Self> {
        Self::new(
            "register",
            config.register_max_calls,
            Duration::from_secs(config.register_period_secs),
        )
    }

    /// Check if user is rate limited
    pub fn check_rate_limit(&self, user_id: i64) -> Result<()> {
        match self.limiter.check_key(&user_id) {
            Ok(()) => {
                debug!(user_id = user_id, limiter = self.name, "Rate limit check passed");
                Ok(())
            }
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                warn!(user_id = user_id, limiter = self.name, wait_secs = wait.as_secs(), "Rate limit exceeded");
                Err(BlueberryError::RateLimitExceeded)
            }
        }
    }

    /// Forget users whose limits have fully refilled
    pub fn cleanup(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}

impl std::fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitMiddleware")
            .field("name", &self.name)
            .field("tracked_users", &self.limiter.len())
            .finish()
    }
}
