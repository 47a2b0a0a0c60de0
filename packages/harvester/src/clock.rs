//! Wall clock and sleeping, behind a trait so waits can be simulated.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current time and of blocking waits.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration);
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::from_millis(5));
        assert!(clock.now() > before);
    }
}
