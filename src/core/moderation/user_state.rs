// Per-user moderation state, shared by the rate tracker and warning ledger.
//
// **DashMap:**
// Each user lives in one shard entry. Every read-modify-write goes through
// `with_record`, which holds the entry guard for the whole closure, so two
// messages from the same user can never interleave their updates.

use super::moderation_models::UserId;
use dashmap::DashMap;
use std::collections::VecDeque;
use tokio::time::Instant;

/// Mutable state kept for one user in one room.
#[derive(Debug, Default, Clone)]
pub struct UserRecord {
    pub warning_count: u32,
    /// Oldest first.
    pub recent_messages: VecDeque<Instant>,
}

#[derive(Debug, Default)]
pub struct UserStateTable {
    records: DashMap<UserId, UserRecord>,
}

impl UserStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the user's record, creating it on first use.
    pub fn with_record<R>(&self, user_id: UserId, f: impl FnOnce(&mut UserRecord) -> R) -> R {
        let mut entry = self.records.entry(user_id).or_default();
        f(&mut *entry)
    }

    /// Run `f` against an existing record without creating one.
    pub fn with_existing<R>(
        &self,
        user_id: UserId,
        f: impl FnOnce(&mut UserRecord) -> R,
    ) -> Option<R> {
        self.records.get_mut(&user_id).map(|mut entry| f(&mut *entry))
    }

    /// Drop everything known about a user. Returns whether a record existed.
    pub fn remove(&self, user_id: UserId) -> bool {
        self.records.remove(&user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
