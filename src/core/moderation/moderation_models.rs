// Moderation domain models - data structures for the moderation engine.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts its own message/user types into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Platform user id. Discord snowflakes are never zero, so zero is rejected.
pub type UserId = u64;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure reported by a host collaborator (notification, audit, restriction).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to restrict user {user_id}: {source}")]
    RestrictionGrantFailed {
        user_id: UserId,
        source: CollaboratorError,
    },

    #[error("Failed to lift restriction for user {user_id}: {source}")]
    RestrictionRevokeFailed {
        user_id: UserId,
        source: CollaboratorError,
    },

    #[error("Policy misconfiguration: {0}")]
    PolicyMisconfiguration(String),
}

// ============================================================================
// MESSAGES AND DECISIONS
// ============================================================================

/// An inbound chat message as handed to the engine by the host.
///
/// Author and timestamp are optional because the host may not be able to
/// attribute every event; the engine rejects such messages with
/// `ModerationError::InvalidInput` before touching any state.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub author_id: Option<UserId>,
    pub text: String,
    pub timestamp: Option<Instant>,
}

impl ChatMessage {
    pub fn new(author_id: UserId, text: impl Into<String>, timestamp: Instant) -> Self {
        Self {
            author_id: Some(author_id),
            text: text.into(),
            timestamp: Some(timestamp),
        }
    }
}

/// Which policy a message broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Too many messages inside the spam window
    Spam,
    /// Text matched a disallowed-content pattern
    DisallowedContent,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::Spam => write!(f, "Spam"),
            ViolationKind::DisallowedContent => write!(f, "Disallowed Content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Short user-facing reason, e.g. "is spamming".
    pub reason: String,
    /// Extra line for the audit log, if the check produced one.
    pub detail: Option<String>,
}

/// Result of evaluating a single message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow,
    Violation(Violation),
}

#[allow(dead_code)]
impl Decision {
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Decision::Allow => None,
            Decision::Violation(v) => Some(v),
        }
    }
}

/// Where a user-facing notice should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The channel the violating message was posted in
    Channel(u64),
    /// Direct to the user
    #[allow(dead_code)]
    User(UserId),
}

// ============================================================================
// STATE SNAPSHOTS
// ============================================================================

/// Snapshot of everything the engine knows about one user.
#[derive(Debug, Clone)]
pub struct UserModerationState {
    pub user_id: UserId,
    pub warning_count: u32,
    pub recent_message_timestamps: Vec<Instant>,
    pub active_mute_expiry: Option<Instant>,
}

/// A mute currently in force, owned by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct MuteRecord {
    pub user_id: UserId,
    pub expires_at: Instant,
    /// Wall-clock expiry for display purposes.
    pub expires_at_utc: DateTime<Utc>,
    pub reason: String,
}

impl MuteRecord {
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// What `enforce` did for a single violation.
#[derive(Debug, Clone)]
pub struct EnforcementOutcome {
    pub user_id: UserId,
    /// Warning count after this violation (0 if it escalated into a mute).
    pub warning_count: u32,
    pub max_warnings: u32,
    pub mute: Option<MuteRecord>,
}

#[allow(dead_code)]
impl EnforcementOutcome {
    pub fn escalated(&self) -> bool {
        self.mute.is_some()
    }
}
