//! In-memory PIN credentials and authorization tokens
//!
//! Spent tokens are dropped rather than flagged, and expired ones are swept
//! whenever a token is redeemed, so the token map only holds live tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core::traits::PinStore;
use crate::types::{LedgerError, PinCredentials, PinToken, UserId, MAX_PIN_ATTEMPTS};

#[derive(Debug, Default)]
pub struct MemoryPinStore {
    credentials: DashMap<UserId, PinCredentials>,
    tokens: DashMap<String, PinToken>,
}

impl MemoryPinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens currently held, live or not yet swept
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl PinStore for MemoryPinStore {
    async fn get_credentials(&self, user_id: UserId) -> Result<Option<PinCredentials>, LedgerError> {
        Ok(self.credentials.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn upsert_credentials(&self, credentials: PinCredentials) -> Result<(), LedgerError> {
        self.credentials.insert(credentials.user_id, credentials);
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        user_id: UserId,
        expected_attempts: u8,
        at: DateTime<Utc>,
    ) -> Result<Option<PinCredentials>, LedgerError> {
        let mut entry = self
            .credentials
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::not_found("pin", user_id))?;
        let credentials = entry.value_mut();
        if credentials.failed_pin_attempts != expected_attempts {
            return Ok(None);
        }
        credentials.failed_pin_attempts = expected_attempts.saturating_add(1).min(MAX_PIN_ATTEMPTS);
        credentials.last_failed_attempt_at = Some(at);
        Ok(Some(credentials.clone()))
    }

    async fn reset_attempts(&self, user_id: UserId) -> Result<(), LedgerError> {
        if let Some(mut entry) = self.credentials.get_mut(&user_id) {
            entry.failed_pin_attempts = 0;
            entry.last_failed_attempt_at = None;
        }
        Ok(())
    }

    async fn insert_token(&self, token: PinToken) -> Result<(), LedgerError> {
        self.tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<PinToken>, LedgerError> {
        Ok(self.tokens.get(token).map(|entry| entry.value().clone()))
    }

    async fn consume_token(&self, user_id: UserId, token: &str, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        let consumed = self
            .tokens
            .remove_if(token, |_, entry| entry.is_valid_for(user_id, now))
            .is_some();
        self.tokens.retain(|_, entry| entry.expires_at > now && !entry.consumed);
        Ok(consumed)
    }

    async fn invalidate_token(&self, token: &str) -> Result<(), LedgerError> {
        self.tokens.remove(token);
        Ok(())
    }
}
