//! Backpressure policy — a deliberate minimum interval between calls
//! to rate-limited collaborators, not incidental sleeps.

use std::time::Duration;

use tokio::time::Instant;

/// Enforces a minimum interval between successive `pause` returns.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Wait until at least `min_interval` has passed since the previous
    /// call. The first call never waits.
    pub async fn pause(&mut self) {
        if let Some(last) = self.last {
            let next = last + self.min_interval;
            let now = Instant::now();
            if next > now {
                tokio::time::sleep(next - now).await;
            }
        }
        self.last = Some(Instant::now());
    }
}
