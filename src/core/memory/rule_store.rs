use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core::traits::RoundUpRuleStore;
use crate::types::{LedgerError, Money, RoundUpRule, UserId};

/// In-memory round-up rules keyed by user
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: DashMap<UserId, RoundUpRule>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoundUpRuleStore for MemoryRuleStore {
    async fn get(&self, user_id: UserId) -> Result<Option<RoundUpRule>, LedgerError> {
        Ok(self.rules.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, rule: RoundUpRule) -> Result<(), LedgerError> {
        self.rules.insert(rule.user_id, rule);
        Ok(())
    }

    async fn record_round_up(
        &self,
        user_id: UserId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<RoundUpRule, LedgerError> {
        let mut entry = self
            .rules
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::not_found("round_up_rule", user_id))?;
        let rule = entry.value_mut();
        let saved = rule
            .total_amount_saved
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("round-up total"))?;
        rule.total_amount_saved = saved;
        rule.total_round_ups_count = rule.total_round_ups_count.saturating_add(1);
        rule.updated_at = now;
        Ok(rule.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IncrementType;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_record_round_up_accumulates() {
        let store = MemoryRuleStore::new();
        let user = Uuid::from_u128(1);
        store
            .upsert(RoundUpRule::new(user, IncrementType::Ten, Utc::now()))
            .await
            .unwrap();

        store.record_round_up(user, Money::from_minor(999), Utc::now()).await.unwrap();
        let rule = store.record_round_up(user, Money::from_minor(1), Utc::now()).await.unwrap();

        assert_eq!(rule.total_round_ups_count, 2);
        assert_eq!(rule.total_amount_saved, Money::from_minor(1_000));
    }

    #[tokio::test]
    async fn test_record_round_up_without_rule() {
        let store = MemoryRuleStore::new();
        let err = store
            .record_round_up(Uuid::from_u128(1), Money::from_minor(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }
}
