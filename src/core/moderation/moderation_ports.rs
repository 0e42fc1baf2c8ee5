// Ports the engine calls out through. The host (Discord layer) implements
// these; the core never knows which platform it is talking to.

use super::moderation_models::{Audience, CollaboratorError, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Delivers user-facing notices.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Send `text` to `audience`, deleting it after `auto_delete_after` if set.
    async fn notify(
        &self,
        audience: Audience,
        text: &str,
        auto_delete_after: Option<Duration>,
    ) -> Result<(), CollaboratorError>;

    /// How a user should be referred to in notice and audit text.
    fn mention(&self, user_id: UserId) -> String {
        format!("user {}", user_id)
    }
}

/// Moderator-facing audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_action(&self, text: &str) -> Result<(), CollaboratorError>;
}

/// The platform capability that actually silences a user.
///
/// Implementations must be idempotent: granting twice or revoking a
/// restriction that is not in place succeeds.
#[async_trait]
pub trait RestrictionGateway: Send + Sync {
    /// Make sure whatever backs the restriction (e.g. a role) exists.
    async fn ensure_restriction_role_exists(&self) -> Result<(), CollaboratorError>;

    async fn grant_restriction(&self, user_id: UserId) -> Result<(), CollaboratorError>;

    async fn revoke_restriction(&self, user_id: UserId) -> Result<(), CollaboratorError>;
}

/// Everything the engine needs from its host, bundled for injection.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn NotificationSink>,
    pub audit: Arc<dyn AuditSink>,
    pub restrictions: Arc<dyn RestrictionGateway>,
}

impl Collaborators {
    pub fn mention(&self, user_id: UserId) -> String {
        self.notifier.mention(user_id)
    }

    /// Send a notice; failures are logged, never propagated.
    pub async fn notify_best_effort(
        &self,
        audience: Audience,
        text: &str,
        auto_delete_after: Option<Duration>,
    ) {
        if let Err(e) = self.notifier.notify(audience, text, auto_delete_after).await {
            tracing::warn!("Failed to send moderation notice: {}", e);
        }
    }

    /// Write to the audit log; failures are logged, never propagated.
    pub async fn audit_best_effort(&self, text: &str) {
        if let Err(e) = self.audit.log_action(text).await {
            tracing::warn!("Failed to write moderation audit log: {}", e);
        }
    }
}
