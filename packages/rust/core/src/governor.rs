//! Sliding-window admission control for outbound calls.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

/// Length of the rolling window the ceiling applies to.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Extra wait past the moment the oldest admission leaves the window.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(1);

/// Admits at most `limit` calls in any trailing [`WINDOW`].
///
/// Scoped to one run and single-task: every search, scrape and rewrite call
/// goes through the same instance and counts against the same window.
#[derive(Debug)]
pub struct RateGovernor {
    limit: usize,
    admitted: VecDeque<Instant>,
}

impl RateGovernor {
    /// A ceiling of zero is treated as one.
    pub fn new(requests_per_minute: u32) -> Self {
        let limit = requests_per_minute.max(1) as usize;
        Self {
            limit,
            admitted: VecDeque::with_capacity(limit),
        }
    }

    /// Wait until another call fits in the window, then record it.
    pub async fn admit(&mut self) {
        loop {
            let now = Instant::now();
            self.prune(now);

            match self.admitted.front() {
                Some(&oldest) if self.admitted.len() >= self.limit => {
                    let wait = (oldest + WINDOW + SAFETY_MARGIN).saturating_duration_since(now);
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        in_window = self.admitted.len(),
                        "rate ceiling reached, waiting"
                    );
                    sleep(wait).await;
                }
                _ => {
                    self.admitted.push_back(now);
                    return;
                }
            }
        }
    }

    #[cfg(test)]
    fn in_window(&self) -> usize {
        self.admitted.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.admitted.front() {
            if now.duration_since(oldest) >= WINDOW {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}
