//! Daily stale-branch sweep.
//!
//! Waits until the next 00:00 UTC (at least one minute out), then sweeps
//! every 24 hours. The sweep runs under each repository's tracker lock,
//! so it can never overlap a fetch. The default branch is never dropped.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::watch;

use crate::git::GitTracker;

pub struct BranchCleanup {
    tracker: Arc<GitTracker>,
}

impl BranchCleanup {
    pub fn new(tracker: Arc<GitTracker>) -> Self {
        Self { tracker }
    }

    /// Run until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let first_delay = delay_until_next_midnight(Utc::now());
        tracing::info!(
            "branch cleanup scheduled in {}s",
            first_delay.num_seconds()
        );

        let sleep = tokio::time::sleep(
            first_delay
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(60)),
        );
        tokio::pin!(sleep);

        tokio::select! {
            _ = &mut sleep => {}
            _ = shutdown.changed() => return,
        }

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let dropped = self.tracker.sweep_stale_branches(Utc::now()).await;
                    if dropped > 0 {
                        tracing::info!(dropped, "swept stale branches");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

/// Time until the next 00:00 UTC, floored at one minute.
fn delay_until_next_midnight(now: chrono::DateTime<Utc>) -> Duration {
    let tomorrow = (now + Duration::days(1)).date_naive();
    let midnight = tomorrow
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now + Duration::days(1));

    let delay = midnight - now;
    if delay < Duration::minutes(1) {
        Duration::minutes(1)
    } else {
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn delay_targets_next_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 18, 30, 0).unwrap();
        let delay = delay_until_next_midnight(now);
        assert_eq!(delay.num_hours(), 5);
        assert_eq!(delay.num_minutes(), 5 * 60 + 30);
    }

    #[test]
    fn delay_is_floored_at_one_minute() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 45, ).unwrap();
        let delay = delay_until_next_midnight(now);
        assert!(delay >= Duration::minutes(1));
    }
}
