// Per-user async locks for work that spans awaits.
//
// The DashMap entry guard in `user_state` covers synchronous updates only.
// Anything that awaits a collaborator between reading and writing a user's
// state (enforcement, mute transitions) takes the user's slot here instead.
// Slots are dropped from the map once they are idle and nobody holds them.

use super::moderation_models::UserId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type UserSlot<T> = Arc<Mutex<T>>;

pub struct UserLocks<T> {
    slots: DashMap<UserId, UserSlot<T>>,
}

impl<T: Default> UserLocks<T> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// The user's slot, created on first use.
    pub fn slot(&self, user_id: UserId) -> UserSlot<T> {
        // Clone the Arc out so the shard guard is released before awaiting.
        self.slots.entry(user_id).or_default().clone()
    }

    /// The user's slot if one exists, without creating it.
    pub fn existing(&self, user_id: UserId) -> Option<UserSlot<T>> {
        self.slots.get(&user_id).map(|slot| slot.clone())
    }

    /// Drop the user's slot if `is_idle` holds for its value and the map
    /// holds the only handle. Callers must drop their own handle first.
    pub fn release(&self, user_id: UserId, is_idle: impl Fn(&T) -> bool) {
        // Handles are only cloned out under the shard lock, which `remove_if`
        // holds, so a count of one cannot change underneath us.
        self.slots.remove_if(&user_id, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().map(|value| is_idle(&*value)).unwrap_or(false)
        });
    }

    #[allow(dead_code)]
    pub fn all(&self) -> Vec<UserSlot<T>> {
        self.slots.iter().map(|entry| entry.value().clone()).collect()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

impl<T: Default> Default for UserLocks<T> {
    fn default() -> Self {
        Self::new()
    }
}
