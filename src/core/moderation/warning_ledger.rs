// Per-user warning counts. Escalation policy lives in the engine; the
// ledger only counts.

use super::moderation_models::UserId;
use super::user_state::UserStateTable;
use std::sync::Arc;

pub struct WarningLedger {
    table: Arc<UserStateTable>,
}

impl WarningLedger {
    pub fn new(table: Arc<UserStateTable>) -> Self {
        Self { table }
    }

    /// Add one warning and return the new count.
    pub fn add_warning(&self, user_id: UserId) -> u32 {
        self.table.with_record(user_id, |record| {
            record.warning_count = record.warning_count.saturating_add(1);
            record.warning_count
        })
    }

    /// Reset a user's warnings to zero.
    pub fn clear(&self, user_id: UserId) {
        self.table.with_existing(user_id, |record| record.warning_count = 0);
    }

    /// Current count, 0 for users never seen.
    pub fn get(&self, user_id: UserId) -> u32 {
        self.table
            .with_existing(user_id, |record| record.warning_count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate() {
        let ledger = WarningLedger::new(Arc::new(UserStateTable::new()));
        assert_eq!(ledger.get(1), 0);

        for k in 1..=4 {
            assert_eq!(ledger.add_warning(1), k);
        }
        assert_eq!(ledger.get(1), 4);
        assert_eq!(ledger.get(2), 0);
    }

    #[test]
    fn test_clear_resets_and_is_safe_for_unknown_users() {
        let ledger = WarningLedger::new(Arc::new(UserStateTable::new()));
        ledger.add_warning(1);
        ledger.add_warning(1);

        ledger.clear(1);
        ledger.clear(42);

        assert_eq!(ledger.get(1), 0);
        assert_eq!(ledger.add_warning(1), 1);
    }
}
