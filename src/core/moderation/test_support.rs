// Recording collaborators shared by the moderation unit tests.

use super::moderation_models::{Audience, CollaboratorError, UserId};
use super::moderation_ports::{AuditSink, Collaborators, NotificationSink, RestrictionGateway};
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub audience: Audience,
    pub text: String,
    pub auto_delete_after: Option<Duration>,
}

/// In-memory host that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingHost {
    pub notices: Mutex<Vec<Notice>>,
    pub audit: Mutex<Vec<String>>,
    pub restricted: DashSet<UserId>,
    pub role_checks: AtomicUsize,
    pub grants: AtomicUsize,
    pub revokes: AtomicUsize,
    pub fail_grants: AtomicBool,
    /// How many upcoming revoke calls should fail.
    pub failing_revokes: AtomicUsize,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            notifier: self.clone(),
            audit: self.clone(),
            restrictions: self.clone(),
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn audit_lines(&self) -> Vec<String> {
        self.audit.lock().unwrap().clone()
    }

    pub fn audit_count(&self, needle: &str) -> usize {
        self.audit_lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    pub fn grant_count(&self) -> usize {
        self.grants.load(Ordering::SeqCst)
    }

    pub fn revoke_count(&self) -> usize {
        self.revokes.load(Ordering::SeqCst)
    }

    pub fn is_restricted(&self, user_id: UserId) -> bool {
        self.restricted.contains(&user_id)
    }
}

#[async_trait]
impl NotificationSink for RecordingHost {
    async fn notify(
        &self,
        audience: Audience,
        text: &str,
        auto_delete_after: Option<Duration>,
    ) -> Result<(), CollaboratorError> {
        // Stand-in for the network round trip a real notifier makes.
        tokio::task::yield_now().await;
        self.notices.lock().unwrap().push(Notice {
            audience,
            text: text.to_string(),
            auto_delete_after,
        });
        Ok(())
    }

    fn mention(&self, user_id: UserId) -> String {
        format!("@{}", user_id)
    }
}

#[async_trait]
impl AuditSink for RecordingHost {
    async fn log_action(&self, text: &str) -> Result<(), CollaboratorError> {
        self.audit.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[async_trait]
impl RestrictionGateway for RecordingHost {
    async fn ensure_restriction_role_exists(&self) -> Result<(), CollaboratorError> {
        self.role_checks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn grant_restriction(&self, user_id: UserId) -> Result<(), CollaboratorError> {
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("missing permissions"));
        }
        self.grants.fetch_add(1, Ordering::SeqCst);
        self.restricted.insert(user_id);
        Ok(())
    }

    async fn revoke_restriction(&self, user_id: UserId) -> Result<(), CollaboratorError> {
        let failing = self
            .failing_revokes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollaboratorError::new("gateway unavailable"));
        }
        self.revokes.fetch_add(1, Ordering::SeqCst);
        self.restricted.remove(&user_id);
        Ok(())
    }
}
