// Sliding-window message rate tracking per user.
//
// The window is recomputed on every message: stale timestamps are pruned
// against the caller's `now` right before counting, and nothing sweeps in
// the background.

use super::moderation_models::UserId;
use super::user_state::UserStateTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct RateTracker {
    table: Arc<UserStateTable>,
    limit: usize,
    window: Duration,
}

impl RateTracker {
    pub fn new(table: Arc<UserStateTable>, limit: u32, window: Duration) -> Self {
        Self {
            table,
            limit: limit as usize,
            window,
        }
    }

    /// Record a message at `now` and return how many messages (including
    /// this one) the user has sent inside the window.
    pub fn record(&self, user_id: UserId, now: Instant) -> usize {
        self.table.with_record(user_id, |record| {
            prune(&mut record.recent_messages, now, self.window);
            record.recent_messages.push_back(now);
            record.recent_messages.len()
        })
    }

    /// Record a message and report whether the user is now spamming.
    /// The triggering message counts toward the limit.
    pub fn record_and_check(&self, user_id: UserId, now: Instant) -> bool {
        self.record(user_id, now) >= self.limit
    }

    /// Timestamps still inside the window at `now`, pruning stale ones.
    pub fn recent(&self, user_id: UserId, now: Instant) -> Vec<Instant> {
        self.table
            .with_existing(user_id, |record| {
                prune(&mut record.recent_messages, now, self.window);
                record.recent_messages.iter().copied().collect()
            })
            .unwrap_or_default()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

fn prune(timestamps: &mut std::collections::VecDeque<Instant>, now: Instant, window: Duration) {
    // Oldest first, so stop at the first entry still in the window.
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(limit: u32, window_secs: u64) -> RateTracker {
        RateTracker::new(
            Arc::new(UserStateTable::new()),
            limit,
            Duration::from_secs(window_secs),
        )
    }

    #[test]
    fn test_burst_reaches_limit_on_nth_message() {
        let tracker = tracker(3, 5);
        let start = Instant::now();

        assert!(!tracker.record_and_check(1, start));
        assert!(!tracker.record_and_check(1, start + Duration::from_millis(500)));
        assert!(tracker.record_and_check(1, start + Duration::from_secs(1)));
    }

    #[test]
    fn test_window_resets_after_quiet_period() {
        let tracker = tracker(3, 5);
        let start = Instant::now();

        for i in 0..3 {
            tracker.record(1, start + Duration::from_millis(100 * i));
        }

        // Everything above is older than the window now.
        let later = start + Duration::from_secs(6);
        assert_eq!(tracker.record(1, later), 1);
        assert!(!tracker.record_and_check(1, later + Duration::from_millis(10)));
    }

    #[test]
    fn test_entry_exactly_window_old_is_pruned() {
        let tracker = tracker(2, 5);
        let start = Instant::now();

        tracker.record(1, start);
        assert!(!tracker.record_and_check(1, start + Duration::from_secs(5)));
    }

    #[test]
    fn test_users_are_tracked_independently() {
        let tracker = tracker(2, 5);
        let now = Instant::now();

        tracker.record(1, now);
        assert!(!tracker.record_and_check(2, now));
        assert!(tracker.record_and_check(1, now));
    }

    #[test]
    fn test_recent_prunes_on_read() {
        let tracker = tracker(10, 5);
        let start = Instant::now();

        tracker.record(1, start);
        tracker.record(1, start + Duration::from_secs(3));

        assert_eq!(tracker.recent(1, start + Duration::from_secs(4)).len(), 2);
        assert_eq!(tracker.recent(1, start + Duration::from_secs(6)).len(), 1);
        assert!(tracker.recent(99, start).is_empty());
    }
}
