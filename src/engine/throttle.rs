use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use crate::error::ErrorKind;

type KeyedRateLimiter = RateLimiter<ErrorKind, DefaultKeyedStateStore<ErrorKind>, DefaultClock>;

/// Limits how often each error kind is reported to observers
///
/// Throttling only affects reporting. Retries happen regardless.
pub struct ReportThrottle {
    limiter: Option<KeyedRateLimiter>,
}

impl ReportThrottle {
    /// At most one report per kind within `window`; a zero window disables
    /// throttling
    pub fn new(window: Duration) -> Self {
        let limiter = Quota::with_period(window)
            .map(|quota| RateLimiter::keyed(quota.allow_burst(NonZeroU32::MIN)));
        Self { limiter }
    }

    pub fn should_report(&self, kind: ErrorKind) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check_key(&kind).is_ok(),
            None => true,
        }
    }
}
