use std::time::Duration;
use tokio::time::Instant;

/// Bounded, fixed-interval iteration guard.
///
/// ```no_run
/// # use std::time::Duration;
/// # use kitchen_monitor_orchestrator::WaitLoop;
/// # async fn run() {
/// let mut wait_loop = WaitLoop::new(Duration::from_secs(10), Duration::from_secs(600));
/// while wait_loop.tick().await {
///     // poll something
/// }
/// # }
/// ```
///
/// The first `tick` returns immediately. Every later `tick` sleeps for the
/// interval first. Once more than `total_duration` has passed since
/// construction, `tick` returns `false`.
#[derive(Debug)]
pub struct WaitLoop {
    interval: Duration,
    total_duration: Duration,
    started: Instant,
    first: bool,
}

impl WaitLoop {
    pub fn new(interval: Duration, total_duration: Duration) -> Self {
        Self {
            interval,
            total_duration,
            started: Instant::now(),
            first: true,
        }
    }

    pub async fn tick(&mut self) -> bool {
        if self.first {
            self.first = false;
        } else {
            tokio::time::sleep(self.interval).await;
        }
        !self.expired()
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() > self.total_duration
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_does_not_sleep() {
        let mut wait_loop = WaitLoop::new(Duration::from_secs(30), Duration::from_secs(60));
        let started = Instant::now();

        assert!(wait_loop.tick().await);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_count() {
        let mut wait_loop = WaitLoop::new(Duration::from_secs(3), Duration::from_secs(10));

        let mut iterations = 0;
        while wait_loop.tick().await {
            iterations += 1;
        }

        // ticks at 0s, 3s, 6s and 9s; the one at 12s is past the deadline
        assert_eq!(iterations, 4);
        assert!(wait_loop.expired());
        assert!(wait_loop.elapsed() >= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_allows_single_pass() {
        let mut wait_loop = WaitLoop::new(Duration::from_secs(1), Duration::ZERO);

        assert!(wait_loop.tick().await);
        assert!(!wait_loop.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_with_slow_body() {
        let mut wait_loop = WaitLoop::new(Duration::from_secs(1), Duration::from_secs(5));

        assert!(wait_loop.tick().await);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!wait_loop.tick().await);
    }
}
