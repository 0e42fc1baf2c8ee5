// Moderation engine - core business logic for chat moderation.
//
// This service handles:
// - Spam-rate detection (sliding window per user)
// - Disallowed-content detection (pattern rules on raw + normalized text)
// - Warning escalation (warn -> timed mute)
// - Admin actions (clear warnings, manual mute/unmute, reset)
//
// NO Discord dependencies here - effects go out through the ports in
// `moderation_ports`.

use super::content_classifier::ContentClassifier;
use super::moderation_config::ModerationPolicy;
use super::moderation_models::{
    Audience, ChatMessage, Decision, EnforcementOutcome, ModerationError, MuteRecord, UserId,
    UserModerationState, Violation, ViolationKind,
};
use super::moderation_ports::Collaborators;
use super::mute_scheduler::MuteScheduler;
use super::normalizer::normalize;
use super::rate_tracker::RateTracker;
use super::user_locks::UserLocks;
use super::user_state::UserStateTable;
use super::warning_ledger::WarningLedger;
use std::sync::Arc;
use tokio::time::Instant;

const SPAM_REASON: &str = "is spamming";
const CONTENT_REASON: &str = "used inappropriate language";
const ESCALATION_REASON: &str = "Reached max warnings";

// ============================================================================
// CORE SERVICE
// ============================================================================

/// One engine per moderated room. Owns all per-user state for that room.
pub struct ModerationEngine {
    policy: ModerationPolicy,
    states: Arc<UserStateTable>,
    rate_tracker: RateTracker,
    classifier: ContentClassifier,
    ledger: WarningLedger,
    scheduler: MuteScheduler,
    collaborators: Collaborators,
    /// Serializes `enforce` per user across its collaborator awaits.
    enforcing: UserLocks<()>,
}

impl ModerationEngine {
    /// Build an engine, rejecting an invalid policy up front.
    pub fn new(
        policy: ModerationPolicy,
        collaborators: Collaborators,
    ) -> Result<Self, ModerationError> {
        policy.validate()?;
        let classifier = ContentClassifier::from_patterns(&policy.content_patterns)?;

        let states = Arc::new(UserStateTable::new());
        let rate_tracker = RateTracker::new(
            Arc::clone(&states),
            policy.spam_message_limit,
            policy.spam_window(),
        );
        let ledger = WarningLedger::new(Arc::clone(&states));
        let scheduler = MuteScheduler::new(collaborators.clone());

        Ok(Self {
            policy,
            states,
            rate_tracker,
            classifier,
            ledger,
            scheduler,
            collaborators,
            enforcing: UserLocks::new(),
        })
    }

    pub fn policy(&self) -> &ModerationPolicy {
        &self.policy
    }

    /// Classify a message.
    ///
    /// The rate check runs first and always records the message, so a burst
    /// of clean messages is still caught. Only one violation is reported per
    /// message, spam taking priority over content.
    pub fn evaluate(&self, message: &ChatMessage) -> Result<Decision, ModerationError> {
        let user_id = match message.author_id {
            Some(id) if id != 0 => id,
            _ => {
                return Err(ModerationError::InvalidInput(
                    "message has no author".to_string(),
                ))
            }
        };
        let now = message.timestamp.ok_or_else(|| {
            ModerationError::InvalidInput("message has no timestamp".to_string())
        })?;

        if self.rate_tracker.record_and_check(user_id, now) {
            let in_window = self.rate_tracker.recent(user_id, now).len();
            tracing::debug!(user_id, in_window, "Spam burst detected");
            return Ok(Decision::Violation(Violation {
                kind: ViolationKind::Spam,
                reason: SPAM_REASON.to_string(),
                detail: Some(format!(
                    "triggered spam detection ({} messages in {}s)",
                    in_window,
                    self.rate_tracker.window().as_secs()
                )),
            }));
        }

        let raw = message.text.to_lowercase();
        let normalized = normalize(&raw);
        if let Some(pattern) = self.classifier.first_match(&raw, &normalized) {
            tracing::debug!(user_id, "Disallowed content detected");
            return Ok(Decision::Violation(Violation {
                kind: ViolationKind::DisallowedContent,
                reason: CONTENT_REASON.to_string(),
                detail: Some(format!("matched content rule `{}`", pattern)),
            }));
        }

        Ok(Decision::Allow)
    }

    /// Apply the consequences of a violation: warn, and mute once the user
    /// reaches `max_warnings`.
    ///
    /// Notice and audit failures are logged and do not fail enforcement.
    /// If the mute cannot be applied the warning count is left at the
    /// threshold, so the next violation tries to escalate again.
    ///
    /// Calls for the same user run one at a time, so exactly one of them
    /// crosses the threshold and escalates.
    pub async fn enforce(
        &self,
        user_id: UserId,
        violation: &Violation,
        audience: Audience,
    ) -> Result<EnforcementOutcome, ModerationError> {
        let slot = self.enforcing.slot(user_id);
        let outcome = {
            let _turn = slot.lock().await;
            self.warn_and_escalate(user_id, violation, audience).await
        };
        drop(slot);
        self.enforcing.release(user_id, |_| true);
        outcome
    }

    async fn warn_and_escalate(
        &self,
        user_id: UserId,
        violation: &Violation,
        audience: Audience,
    ) -> Result<EnforcementOutcome, ModerationError> {
        let max_warnings = self.policy.max_warnings;
        let warning_count = self.ledger.add_warning(user_id);
        let mention = self.collaborators.mention(user_id);

        tracing::info!(
            user_id,
            warning_count,
            kind = %violation.kind,
            "Moderation warning issued"
        );

        self.collaborators
            .notify_best_effort(
                audience,
                &format!(
                    "⚠️ {} {}\nWarning {}/{}",
                    mention, violation.reason, warning_count, max_warnings
                ),
                self.policy.notice_ttl(),
            )
            .await;
        self.collaborators
            .audit_best_effort(&format!(
                "⚠️ {} received a warning: {}. Total warnings: {}",
                mention, violation.reason, warning_count
            ))
            .await;
        if let Some(detail) = &violation.detail {
            self.collaborators
                .audit_best_effort(&format!("⚠️ {} {}", mention, detail))
                .await;
        }

        if warning_count < max_warnings {
            return Ok(EnforcementOutcome {
                user_id,
                warning_count,
                max_warnings,
                mute: None,
            });
        }

        let record = match self
            .scheduler
            .apply_mute(user_id, self.policy.mute_duration(), ESCALATION_REASON)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(user_id, warning_count, "Failed to escalate to mute: {}", e);
                return Err(e);
            }
        };
        self.ledger.clear(user_id);

        self.collaborators
            .notify_best_effort(
                audience,
                &format!("🔇 {} has been muted ({}).", mention, ESCALATION_REASON),
                self.policy.notice_ttl(),
            )
            .await;
        self.collaborators
            .audit_best_effort(&format!(
                "🔇 {} was muted. Reason: {}",
                mention, ESCALATION_REASON
            ))
            .await;

        Ok(EnforcementOutcome {
            user_id,
            warning_count: 0,
            max_warnings,
            mute: Some(record),
        })
    }

    // ------------------------------------------------------------------------
    // Admin operations. The host checks authorization before calling these.
    // ------------------------------------------------------------------------

    pub fn get_warning_count(&self, user_id: UserId) -> u32 {
        self.ledger.get(user_id)
    }

    pub async fn clear_warnings(&self, user_id: UserId, actor: UserId) {
        self.ledger.clear(user_id);
        tracing::info!(user_id, actor, "Warnings cleared");
        self.collaborators
            .audit_best_effort(&format!(
                "✅ {} reset warnings for {}",
                self.collaborators.mention(actor),
                self.collaborators.mention(user_id)
            ))
            .await;
    }

    /// Mute a user for the policy's mute duration.
    pub async fn mute(
        &self,
        user_id: UserId,
        reason: &str,
        actor: UserId,
    ) -> Result<MuteRecord, ModerationError> {
        let record = self
            .scheduler
            .apply_mute(user_id, self.policy.mute_duration(), reason)
            .await?;
        self.collaborators
            .audit_best_effort(&format!(
                "🔇 {} was muted by {}. Reason: {}",
                self.collaborators.mention(user_id),
                self.collaborators.mention(actor),
                reason
            ))
            .await;
        Ok(record)
    }

    /// Lift a mute now. Returns `false` (and logs nothing) if the user was
    /// not muted.
    pub async fn unmute(&self, user_id: UserId, actor: UserId) -> Result<bool, ModerationError> {
        let lifted = self.scheduler.unmute(user_id).await?;
        if lifted {
            self.collaborators
                .audit_best_effort(&format!(
                    "🔊 {} was unmuted by {}",
                    self.collaborators.mention(user_id),
                    self.collaborators.mention(actor)
                ))
                .await;
        }
        Ok(lifted)
    }

    /// Forget a user's warnings and message history. Mutes are untouched.
    pub async fn reset_user(&self, user_id: UserId, actor: UserId) {
        if self.states.remove(user_id) {
            tracing::info!(user_id, actor, "Moderation state reset");
            self.collaborators
                .audit_best_effort(&format!(
                    "♻️ {} reset moderation state for {}",
                    self.collaborators.mention(actor),
                    self.collaborators.mention(user_id)
                ))
                .await;
        }
    }

    /// Snapshot of a user's state, with the message window pruned to now.
    pub async fn user_state(&self, user_id: UserId) -> UserModerationState {
        let active_mute_expiry = self
            .scheduler
            .mute_record(user_id)
            .await
            .map(|record| record.expires_at);

        UserModerationState {
            user_id,
            warning_count: self.ledger.get(user_id),
            recent_message_timestamps: self.rate_tracker.recent(user_id, Instant::now()),
            active_mute_expiry,
        }
    }

    #[allow(dead_code)]
    pub async fn active_mutes(&self) -> Vec<MuteRecord> {
        self.scheduler.active_mutes().await
    }

    /// Number of users this engine has state for.
    #[allow(dead_code)]
    pub fn tracked_users(&self) -> usize {
        self.states.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
