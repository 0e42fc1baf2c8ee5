// Timed mutes with automatic expiry.
//
// Each mute owns one tokio timer task that sleeps until the expiry instant
// and then lifts the restriction. All transitions for a user (apply,
// replace, manual unmute, timer fire) run under that user's async mutex,
// and every timer carries the generation of the mute it belongs to, so a
// cancelled or replaced timer can never lift a newer mute.

use super::moderation_models::{CollaboratorError, ModerationError, MuteRecord, UserId};
use super::moderation_ports::Collaborators;
use super::user_locks::UserLocks;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Attempts made by the timer to lift a restriction before giving up.
const MAX_REVOKE_ATTEMPTS: u32 = 3;
/// Base backoff between revoke attempts (multiplied by the attempt number).
const REVOKE_RETRY_DELAY: Duration = Duration::from_secs(2);

struct ActiveMute {
    record: MuteRecord,
    generation: u64,
    /// `None` once the timer has fired but failed to lift the restriction.
    timer: Option<MuteTimer>,
}

/// Handle to a pending expiry task.
struct MuteTimer {
    task: JoinHandle<()>,
    /// Set by whoever resolves this timer first: the timer itself when it
    /// fires, or a canceller before aborting it.
    handled: Arc<AtomicBool>,
}

impl MuteTimer {
    fn cancel(self) {
        self.handled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Lives inside the timer future. If the future is dropped without the
/// timer having been handled (runtime shutdown, a panic), the user would
/// stay restricted with nothing left to lift it, so say so loudly.
struct TimerWatch {
    user_id: UserId,
    expires_at_utc: DateTime<Utc>,
    handled: Arc<AtomicBool>,
}

impl Drop for TimerWatch {
    fn drop(&mut self) {
        if !self.handled.load(Ordering::SeqCst) {
            tracing::error!(
                user_id = self.user_id,
                expires_at = %self.expires_at_utc,
                "Mute timer stopped before firing; user remains restricted until unmuted manually"
            );
        }
    }
}

struct SchedulerInner {
    collaborators: Collaborators,
    slots: UserLocks<Option<ActiveMute>>,
    next_generation: AtomicU64,
}

enum RevokeAttempt {
    Lifted,
    Failed,
    /// Replaced or unmuted since the timer was armed.
    Superseded,
}

impl SchedulerInner {
    fn release(&self, user_id: UserId) {
        self.slots.release(user_id, Option::is_none);
    }

    /// Called by the timer task once its deadline has passed.
    ///
    /// The user's lock is held for one revoke attempt at a time, so an admin
    /// unmute or a fresh mute is never stuck behind the retry backoff. Each
    /// attempt re-checks the generation first.
    async fn expire(&self, user_id: UserId, generation: u64, watch: &TimerWatch) {
        for attempt in 1..=MAX_REVOKE_ATTEMPTS {
            let outcome = self.try_revoke(user_id, generation, attempt, watch).await;
            self.release(user_id);

            match outcome {
                RevokeAttempt::Superseded => return,
                RevokeAttempt::Lifted => {
                    tracing::info!(user_id, "Mute expired, restriction lifted");
                    self.collaborators
                        .audit_best_effort(&format!(
                            "🔊 {} has been unmuted after mute duration.",
                            self.collaborators.mention(user_id)
                        ))
                        .await;
                    return;
                }
                RevokeAttempt::Failed => {
                    if attempt < MAX_REVOKE_ATTEMPTS {
                        tokio::time::sleep(REVOKE_RETRY_DELAY * attempt).await;
                    }
                }
            }
        }

        // The record stays so the user still shows as muted and a manual
        // unmute can retry the revoke.
        tracing::error!(
            user_id,
            expires_at = %watch.expires_at_utc,
            "Giving up on lifting expired mute after {} attempts; manual unmute required",
            MAX_REVOKE_ATTEMPTS
        );
        self.collaborators
            .audit_best_effort(&format!(
                "❗ Could not lift the mute on {}; an admin must unmute them manually.",
                self.collaborators.mention(user_id)
            ))
            .await;
    }

    async fn try_revoke(
        &self,
        user_id: UserId,
        generation: u64,
        attempt: u32,
        watch: &TimerWatch,
    ) -> RevokeAttempt {
        let slot = self.slots.slot(user_id);
        let mut guard = slot.lock().await;
        watch.handled.store(true, Ordering::SeqCst);

        match guard.as_mut() {
            Some(active) if active.generation == generation => {
                // Detach our own handle; the task is already running to completion.
                active.timer = None;
            }
            _ => return RevokeAttempt::Superseded,
        }

        match self
            .collaborators
            .restrictions
            .revoke_restriction(user_id)
            .await
        {
            Ok(()) => {
                *guard = None;
                RevokeAttempt::Lifted
            }
            Err(e) => {
                tracing::warn!(user_id, attempt, "Failed to lift expired mute: {}", e);
                RevokeAttempt::Failed
            }
        }
    }
}

/// Owns all pending mutes for one room.
#[derive(Clone)]
pub struct MuteScheduler {
    inner: Arc<SchedulerInner>,
}

impl MuteScheduler {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                collaborators,
                slots: UserLocks::new(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Restrict a user for `duration`, replacing any mute already in force.
    ///
    /// The restriction is granted before anything is recorded: if the grant
    /// fails no timer is scheduled and an existing mute is left untouched.
    pub async fn apply_mute(
        &self,
        user_id: UserId,
        duration: Duration,
        reason: &str,
    ) -> Result<MuteRecord, ModerationError> {
        if Instant::now().checked_add(duration).is_none() {
            return Err(ModerationError::InvalidInput(format!(
                "mute duration {:?} is too long",
                duration
            )));
        }

        let result = self.install_mute(user_id, duration, reason).await;
        // A failed first mute leaves an empty slot behind.
        self.inner.release(user_id);
        result
    }

    async fn install_mute(
        &self,
        user_id: UserId,
        duration: Duration,
        reason: &str,
    ) -> Result<MuteRecord, ModerationError> {
        let slot = self.inner.slots.slot(user_id);
        let mut guard = slot.lock().await;

        let restrictions = &self.inner.collaborators.restrictions;
        let grant_failed = |source: CollaboratorError| ModerationError::RestrictionGrantFailed {
            user_id,
            source,
        };
        restrictions
            .ensure_restriction_role_exists()
            .await
            .map_err(grant_failed)?;
        restrictions
            .grant_restriction(user_id)
            .await
            .map_err(grant_failed)?;

        // The clock starts once the restriction is actually in place.
        let expires_at = Instant::now() + duration;
        let expires_at_utc = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        if let Some(previous) = guard.take() {
            tracing::debug!(user_id, "Replacing existing mute");
            if let Some(timer) = previous.timer {
                timer.cancel();
            }
        }

        let record = MuteRecord {
            user_id,
            expires_at,
            expires_at_utc,
            reason: reason.to_string(),
        };
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let timer = self.spawn_timer(&record, generation);

        *guard = Some(ActiveMute {
            record: record.clone(),
            generation,
            timer: Some(timer),
        });

        tracing::info!(
            user_id,
            expires_in_secs = duration.as_secs(),
            "Mute applied"
        );
        Ok(record)
    }

    /// Lift a mute early. Returns `Ok(false)` if the user was not muted.
    ///
    /// The pending timer is only cancelled once the revoke succeeded, so a
    /// failed manual unmute still leaves the automatic expiry in place.
    pub async fn unmute(&self, user_id: UserId) -> Result<bool, ModerationError> {
        let result = self.lift_mute(user_id).await;
        self.inner.release(user_id);
        result
    }

    async fn lift_mute(&self, user_id: UserId) -> Result<bool, ModerationError> {
        let Some(slot) = self.inner.slots.existing(user_id) else {
            return Ok(false);
        };
        let mut guard = slot.lock().await;
        if guard.is_none() {
            return Ok(false);
        }

        self.inner
            .collaborators
            .restrictions
            .revoke_restriction(user_id)
            .await
            .map_err(|source| ModerationError::RestrictionRevokeFailed { user_id, source })?;

        if let Some(active) = guard.take() {
            if let Some(timer) = active.timer {
                timer.cancel();
            }
        }
        tracing::info!(user_id, "Mute lifted manually");
        Ok(true)
    }

    pub async fn mute_record(&self, user_id: UserId) -> Option<MuteRecord> {
        let slot = self.inner.slots.existing(user_id)?;
        let guard = slot.lock().await;
        guard.as_ref().map(|active| active.record.clone())
    }

    #[allow(dead_code)]
    pub async fn is_muted(&self, user_id: UserId) -> bool {
        self.mute_record(user_id).await.is_some()
    }

    /// All mutes currently in force, including ones whose automatic
    /// revoke failed and are waiting for a manual unmute.
    #[allow(dead_code)]
    pub async fn active_mutes(&self) -> Vec<MuteRecord> {
        let mut records = Vec::new();
        for slot in self.inner.slots.all() {
            if let Some(active) = slot.lock().await.as_ref() {
                records.push(active.record.clone());
            }
        }
        records
    }

    fn spawn_timer(&self, record: &MuteRecord, generation: u64) -> MuteTimer {
        let handled = Arc::new(AtomicBool::new(false));
        let watch = TimerWatch {
            user_id: record.user_id,
            expires_at_utc: record.expires_at_utc,
            handled: Arc::clone(&handled),
        };
        let inner = Arc::clone(&self.inner);
        let user_id = record.user_id;
        let expires_at = record.expires_at;

        let task = tokio::spawn(async move {
            let watch = watch;
            tokio::time::sleep_until(expires_at).await;
            inner.expire(user_id, generation, &watch).await;
        });

        MuteTimer { task, handled }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::test_support::RecordingHost;

    const MUTE: Duration = Duration::from_secs(300);

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_expires_on_its_own() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        let record = scheduler.apply_mute(1, MUTE, "Reached max warnings").await.unwrap();
        assert_eq!(record.user_id, 1);
        assert!(host.is_restricted(1));
        assert!(scheduler.is_muted(1).await);
        assert_eq!(host.role_checks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(MUTE - Duration::from_secs(1)).await;
        settle().await;
        assert!(host.is_restricted(1), "lifted too early");

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert!(!host.is_restricted(1));
        assert!(!scheduler.is_muted(1).await);
        assert_eq!(host.revoke_count(), 1);
        assert_eq!(host.audit_count("unmuted after mute duration"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmute_cancels_pending_timer() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        scheduler.apply_mute(1, MUTE, "Admin mute").await.unwrap();
        assert!(scheduler.unmute(1).await.unwrap());
        assert_eq!(host.revoke_count(), 1);

        tokio::time::sleep(MUTE * 2).await;
        settle().await;
        assert_eq!(host.revoke_count(), 1, "timer revoked a second time");
        assert_eq!(host.audit_count("unmuted after mute duration"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmute_when_not_muted_is_noop() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        assert!(!scheduler.unmute(5).await.unwrap());
        scheduler.apply_mute(5, MUTE, "x").await.unwrap();
        assert!(scheduler.unmute(5).await.unwrap());
        assert!(!scheduler.unmute(5).await.unwrap());
        assert_eq!(host.revoke_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reapply_replaces_timer_instead_of_stacking() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        scheduler.apply_mute(1, MUTE, "first").await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;
        let second = scheduler.apply_mute(1, MUTE, "second").await.unwrap();

        // The first mute's deadline passes without lifting the second one.
        tokio::time::sleep(Duration::from_secs(150)).await;
        settle().await;
        assert!(host.is_restricted(1));
        assert_eq!(host.revoke_count(), 0);
        assert_eq!(scheduler.mute_record(1).await, Some(second));

        tokio::time::sleep(Duration::from_secs(200)).await;
        settle().await;
        assert!(!host.is_restricted(1));
        assert_eq!(host.revoke_count(), 1);
        assert_eq!(host.audit_count("unmuted after mute duration"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_grant_schedules_nothing() {
        let host = RecordingHost::new();
        host.fail_grants.store(true, Ordering::SeqCst);
        let scheduler = MuteScheduler::new(host.collaborators());

        let err = scheduler.apply_mute(1, MUTE, "x").await.unwrap_err();
        assert!(matches!(
            err,
            ModerationError::RestrictionGrantFailed { user_id: 1, .. }
        ));
        assert!(!scheduler.is_muted(1).await);

        tokio::time::sleep(MUTE * 2).await;
        settle().await;
        assert_eq!(host.revoke_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_manual_unmute_keeps_mute_and_timer() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        scheduler.apply_mute(1, MUTE, "x").await.unwrap();
        host.failing_revokes.store(1, Ordering::SeqCst);

        let err = scheduler.unmute(1).await.unwrap_err();
        assert!(matches!(err, ModerationError::RestrictionRevokeFailed { .. }));
        assert!(scheduler.is_muted(1).await);

        tokio::time::sleep(MUTE + Duration::from_secs(1)).await;
        settle().await;
        assert!(!host.is_restricted(1));
        assert!(!scheduler.is_muted(1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_retries_then_keeps_record_for_manual_unmute() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        scheduler.apply_mute(1, MUTE, "x").await.unwrap();
        host.failing_revokes
            .store(MAX_REVOKE_ATTEMPTS as usize, Ordering::SeqCst);

        tokio::time::sleep(MUTE + Duration::from_secs(60)).await;
        settle().await;
        assert!(host.is_restricted(1));
        assert!(scheduler.is_muted(1).await);
        assert_eq!(scheduler.active_mutes().await.len(), 1);
        assert_eq!(host.audit_count("must unmute them manually"), 1);

        assert!(scheduler.unmute(1).await.unwrap());
        assert!(!host.is_restricted(1));
        assert!(scheduler.active_mutes().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_recovers_after_transient_failure() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        scheduler.apply_mute(1, MUTE, "x").await.unwrap();
        host.failing_revokes.store(1, Ordering::SeqCst);

        tokio::time::sleep(MUTE + Duration::from_secs(10)).await;
        settle().await;
        assert!(!host.is_restricted(1));
        assert_eq!(host.audit_count("unmuted after mute duration"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_dropped_once_no_mute_remains() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        scheduler.apply_mute(1, MUTE, "x").await.unwrap();
        scheduler.apply_mute(2, MUTE, "x").await.unwrap();
        assert_eq!(scheduler.inner.slots.len(), 2);

        scheduler.unmute(1).await.unwrap();
        assert_eq!(scheduler.inner.slots.len(), 1);

        tokio::time::sleep(MUTE + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(scheduler.inner.slots.len(), 0);

        host.fail_grants.store(true, Ordering::SeqCst);
        assert!(scheduler.apply_mute(3, MUTE, "x").await.is_err());
        assert_eq!(scheduler.inner.slots.len(), 0);
        assert_eq!(host.grant_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmute_is_not_held_up_by_revoke_backoff() {
        let host = RecordingHost::new();
        let scheduler = MuteScheduler::new(host.collaborators());

        scheduler.apply_mute(1, MUTE, "x").await.unwrap();
        host.failing_revokes.store(1, Ordering::SeqCst);

        // The timer's first revoke has failed and it is now backing off.
        tokio::time::sleep(MUTE + Duration::from_secs(1)).await;
        settle().await;
        assert!(scheduler.is_muted(1).await);

        let before = Instant::now();
        assert!(scheduler.unmute(1).await.unwrap());
        assert!(Instant::now() - before < Duration::from_secs(1));
        assert!(!host.is_restricted(1));

        // The timer wakes up, sees the mute is gone and leaves it alone.
        tokio::time::sleep(REVOKE_RETRY_DELAY * 3).await;
        settle().await;
        assert_eq!(host.revoke_count(), 1);
        assert_eq!(host.audit_count("unmuted after mute duration"), 0);
        assert_eq!(scheduler.inner.slots.len(), 0);
    }
}
