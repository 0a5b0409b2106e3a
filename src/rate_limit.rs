use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic clock abstraction so window arithmetic is testable with a fake.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Sliding-window request budget: at most `limit` acquisitions within any
/// trailing `window`. Shared across request handlers, so the timestamp queue
/// sits behind a mutex.
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            clock,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to consume one slot. On exhaustion returns how long until the
    /// oldest tracked request leaves the window.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut timestamps = self
            .timestamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < self.limit {
            timestamps.push_back(now);
            Ok(())
        } else {
            let oldest = *timestamps.front().expect("non-empty at limit");
            Err(self.window.saturating_sub(now.duration_since(oldest)))
        }
    }
}

/// Per-key sliding windows (keyed by client address at the HTTP boundary).
pub struct KeyedRateLimiter {
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl KeyedRateLimiter {
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Try to consume one slot for `key`. On exhaustion returns the retry
    /// hint in whole seconds (at least 1).
    pub fn try_acquire(&self, key: &str) -> Result<(), u64> {
        let now = self.clock.now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Prune every window and evict fully expired keys, otherwise the map
        // grows with each distinct client ever seen.
        windows.retain(|_, timestamps| {
            while let Some(front) = timestamps.front() {
                if now.duration_since(*front) >= self.window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
            !timestamps.is_empty()
        });

        let timestamps = windows.entry(key.to_string()).or_default();

        if timestamps.len() < self.limit {
            timestamps.push_back(now);
            Ok(())
        } else {
            let oldest = *timestamps.front().expect("non-empty at limit");
            let remaining = self.window.saturating_sub(now.duration_since(oldest));
            Err(remaining.as_secs().max(1))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeClock;
    use super::*;

    #[test]
    fn allows_up_to_limit_within_window() {
        let clock = Arc::new(FakeClock::new());
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60), clock.clone());

        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn window_slides_as_time_passes() {
        let clock = Arc::new(FakeClock::new());
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60), clock.clone());

        assert!(limiter.try_acquire().is_ok());
        clock.advance(Duration::from_secs(30));
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());

        // The first acquisition falls out of the window after 60s total.
        clock.advance(Duration::from_secs(31));
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn exhaustion_reports_time_until_reset() {
        let clock = Arc::new(FakeClock::new());
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60), clock.clone());

        assert!(limiter.try_acquire().is_ok());
        clock.advance(Duration::from_secs(10));
        let wait = limiter.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_secs(50));
    }

    #[test]
    fn keyed_windows_are_independent() {
        let clock = Arc::new(FakeClock::new());
        let limiter = KeyedRateLimiter::new(1, Duration::from_secs(900), clock.clone());

        assert!(limiter.try_acquire("10.0.0.1").is_ok());
        assert!(limiter.try_acquire("10.0.0.2").is_ok());

        let retry = limiter.try_acquire("10.0.0.1").unwrap_err();
        assert!(retry >= 1 && retry <= 900);
        assert!(limiter.try_acquire("10.0.0.2").is_err());
    }

    #[test]
    fn expired_keys_are_evicted() {
        let clock = Arc::new(FakeClock::new());
        let limiter = KeyedRateLimiter::new(5, Duration::from_secs(60), clock.clone());

        for i in 0..100 {
            assert!(limiter.try_acquire(&format!("10.0.0.{}", i)).is_ok());
        }
        assert_eq!(limiter.windows.lock().unwrap().len(), 100);

        clock.advance(Duration::from_secs(61));
        assert!(limiter.try_acquire("fresh-client").is_ok());
        assert_eq!(limiter.windows.lock().unwrap().len(), 1);
    }
}
