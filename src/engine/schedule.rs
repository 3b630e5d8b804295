use std::time::Duration;

use tokio::time::Instant;

/// Next-due instants of the periodic loop phases
///
/// Each phase is checked against wall-clock time independently of the tick
/// length. Everything is due immediately after construction.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    next_fetch: Instant,
    next_prediction: Instant,
    next_connection_check: Instant,
}

impl Schedule {
    pub fn new(now: Instant) -> Self {
        Self {
            next_fetch: now,
            next_prediction: now,
            next_connection_check: now,
        }
    }

    pub fn fetch_due(&self, now: Instant) -> bool {
        now >= self.next_fetch
    }

    pub fn prediction_due(&self, now: Instant) -> bool {
        now >= self.next_prediction
    }

    pub fn connection_check_due(&self, now: Instant) -> bool {
        now >= self.next_connection_check
    }

    pub fn fetch_succeeded(&mut self, now: Instant, interval: Duration) {
        self.next_fetch = now + interval;
    }

    /// Retry a failed fetch after half the configured interval
    pub fn fetch_failed(&mut self, now: Instant, interval: Duration) {
        self.next_fetch = now + interval / 2;
    }

    pub fn prediction_ran(&mut self, now: Instant, interval: Duration) {
        self.next_prediction = now + interval;
    }

    pub fn connection_checked(&mut self, now: Instant, interval: Duration) {
        self.next_connection_check = now + interval;
    }

    /// Make data fetch and prediction due right away
    pub fn refresh_now(&mut self, now: Instant) {
        self.next_fetch = now;
        self.next_prediction = now;
    }

    pub fn next_fetch(&self) -> Instant {
        self.next_fetch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(10);

    #[test]
    fn test_everything_due_at_start() {
        let now = Instant::now();
        let schedule = Schedule::new(now);
        assert!(schedule.fetch_due(now));
        assert!(schedule.prediction_due(now));
        assert!(schedule.connection_check_due(now));
    }

    #[test]
    fn test_fetch_success_waits_full_interval() {
        let now = Instant::now();
        let mut schedule = Schedule::new(now);

        schedule.fetch_succeeded(now, INTERVAL);

        assert!(!schedule.fetch_due(now + Duration::from_secs(9)));
        assert!(schedule.fetch_due(now + INTERVAL));
    }

    #[test]
    fn test_fetch_failure_halves_interval() {
        let now = Instant::now();
        let mut schedule = Schedule::new(now);

        schedule.fetch_failed(now, INTERVAL);

        assert_eq!(schedule.next_fetch(), now + Duration::from_secs(5));
        assert!(!schedule.fetch_due(now + Duration::from_secs(4)));
        assert!(schedule.fetch_due(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_refresh_now() {
        let now = Instant::now();
        let mut schedule = Schedule::new(now);
        schedule.fetch_succeeded(now, INTERVAL);
        schedule.prediction_ran(now, INTERVAL);

        let later = now + Duration::from_secs(1);
        schedule.refresh_now(later);

        assert!(schedule.fetch_due(later));
        assert!(schedule.prediction_due(later));
    }
}
