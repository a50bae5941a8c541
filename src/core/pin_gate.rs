//! PIN authorization gate
//!
//! Verifies a user's PIN with progressive lockout and, on success, issues a
//! short-lived single-use authorization token that monetary operations must
//! present.
//!
//! # Lockout
//!
//! Each consecutive failure increments a counter (capped at
//! [`MAX_PIN_ATTEMPTS`]) and stamps the failure time; the lockout window is
//! derived from both. The counter is updated with compare-and-set so two
//! concurrent wrong guesses always count as two.
//!
//! bcrypt work runs on the blocking pool.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::traits::PinStore;
use crate::types::pin::PIN_TOKEN_PREFIX;
use crate::types::{LedgerError, PinCredentials, PinToken, PinVerification, UserId, MAX_PIN_ATTEMPTS};

/// Lost compare-and-set races tolerated before giving up
const MAX_CAS_RETRIES: usize = 8;

#[derive(Clone)]
pub struct PinGate {
    pins: Arc<dyn PinStore>,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
    hash_cost: u32,
}

impl PinGate {
    pub fn new(pins: Arc<dyn PinStore>, clock: Arc<dyn Clock>, token_ttl: Duration, hash_cost: u32) -> Self {
        PinGate {
            pins,
            clock,
            token_ttl,
            hash_cost,
        }
    }

    /// Set or replace the user's PIN, clearing any lockout
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] unless the PIN is 4 to 6 ASCII digits.
    pub async fn set_pin(&self, user_id: UserId, pin: &str) -> Result<(), LedgerError> {
        validate_pin_format(pin)?;
        let pin = pin.to_string();
        let cost = self.hash_cost;
        let pin_hash = tokio::task::spawn_blocking(move || bcrypt::hash(pin, cost))
            .await
            .map_err(|e| LedgerError::internal(format!("pin hashing task failed: {}", e)))?
            .map_err(|e| LedgerError::internal(format!("pin hashing failed: {}", e)))?;

        self.pins
            .upsert_credentials(PinCredentials::new(user_id, pin_hash))
            .await?;
        info!(user_id = %user_id, "pin set");
        Ok(())
    }

    /// Check `pin` and issue an authorization token on success
    ///
    /// # Returns
    ///
    /// On a match, `verified = true` with a fresh token and
    /// `attempts_remaining = 5`. On a mismatch, `verified = false` with the
    /// attempts left and the end of the new lockout window.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PinLocked`] while a lockout window is open
    /// - [`LedgerError::NotFound`] if the user has no PIN
    pub async fn verify_pin(&self, user_id: UserId, pin: &str) -> Result<PinVerification, LedgerError> {
        let credentials = self.credentials(user_id).await?;
        let now = self.clock.now();
        check_not_locked(&credentials, now)?;

        if !self.matches(pin, &credentials.pin_hash).await? {
            return self.record_failure(user_id, credentials).await;
        }

        self.pins.reset_attempts(user_id).await?;
        let token = PinToken {
            token: format!("{}{}", PIN_TOKEN_PREFIX, Uuid::new_v4().simple()),
            user_id,
            expires_at: now + self.token_ttl,
            consumed: false,
        };
        self.pins.insert_token(token.clone()).await?;
        info!(user_id = %user_id, "pin verified, token issued");

        Ok(PinVerification {
            verified: true,
            token: Some(token.token),
            expires_at: Some(token.expires_at),
            attempts_remaining: MAX_PIN_ATTEMPTS,
            locked_until: None,
        })
    }

    /// True only if the token exists, belongs to the user, is unexpired and
    /// unconsumed. Does not consume it.
    pub async fn validate_pin_token(&self, user_id: UserId, token: &str) -> Result<bool, LedgerError> {
        let now = self.clock.now();
        Ok(self
            .pins
            .get_token(token)
            .await?
            .is_some_and(|stored| stored.is_valid_for(user_id, now)))
    }

    /// Validate and consume the token in one atomic step
    ///
    /// # Errors
    ///
    /// [`LedgerError::PinTokenExpired`] if the token is not usable.
    pub async fn redeem_pin_token(&self, user_id: UserId, token: &str) -> Result<(), LedgerError> {
        if self.pins.consume_token(user_id, token, self.clock.now()).await? {
            Ok(())
        } else {
            warn!(target: "security", user_id = %user_id, "rejected pin token");
            Err(LedgerError::PinTokenExpired)
        }
    }

    /// Mark the token consumed; idempotent
    pub async fn invalidate_pin_token(&self, token: &str) -> Result<(), LedgerError> {
        self.pins.invalidate_token(token).await
    }

    async fn credentials(&self, user_id: UserId) -> Result<PinCredentials, LedgerError> {
        self.pins
            .get_credentials(user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("pin", user_id))
    }

    async fn matches(&self, pin: &str, pin_hash: &str) -> Result<bool, LedgerError> {
        let pin = pin.to_string();
        let pin_hash = pin_hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(pin, &pin_hash))
            .await
            .map_err(|e| LedgerError::internal(format!("pin verification task failed: {}", e)))?
            .map_err(|e| LedgerError::internal(format!("stored pin hash is unreadable: {}", e)))
    }

    async fn record_failure(
        &self,
        user_id: UserId,
        mut credentials: PinCredentials,
    ) -> Result<PinVerification, LedgerError> {
        for _ in 0..MAX_CAS_RETRIES {
            let now = self.clock.now();
            let updated = self
                .pins
                .record_failed_attempt(user_id, credentials.failed_pin_attempts, now)
                .await?;

            if let Some(updated) = updated {
                let attempts_remaining = updated.attempts_remaining();
                if attempts_remaining == 0 {
                    warn!(
                        target: "security",
                        user_id = %user_id,
                        locked_until = ?updated.locked_until(),
                        "pin attempts exhausted"
                    );
                } else {
                    info!(user_id = %user_id, attempts_remaining, "pin mismatch");
                }
                return Ok(PinVerification {
                    verified: false,
                    token: None,
                    expires_at: None,
                    attempts_remaining,
                    locked_until: updated.locked_until(),
                });
            }

            // Another failure landed first; it may have opened a window.
            credentials = self.credentials(user_id).await?;
            check_not_locked(&credentials, now)?;
        }
        Err(LedgerError::storage("pin attempt counter is under heavy contention"))
    }
}

fn check_not_locked(credentials: &PinCredentials, now: chrono::DateTime<chrono::Utc>) -> Result<(), LedgerError> {
    match credentials.locked_until() {
        Some(until) if until > now => Err(LedgerError::pin_locked(0, until)),
        _ => Ok(()),
    }
}

fn validate_pin_format(pin: &str) -> Result<(), LedgerError> {
    if (4..=6).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(LedgerError::validation("pin", "must be 4 to 6 digits"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::memory::MemoryPinStore;
    use chrono::Utc;
    use rstest::rstest;

    async fn gate() -> (PinGate, Arc<ManualClock>, UserId) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gate = PinGate::new(
            Arc::new(MemoryPinStore::new()),
            clock.clone(),
            Duration::minutes(5),
            4,
        );
        let user = Uuid::from_u128(1);
        gate.set_pin(user, "1234").await.unwrap();
        (gate, clock, user)
    }

    #[rstest]
    #[case::four_digits("1234", true)]
    #[case::six_digits("123456", true)]
    #[case::too_short("123", false)]
    #[case::too_long("1234567", false)]
    #[case::letters("12a4", false)]
    #[case::unicode_digits("١٢٣٤", false)]
    fn test_pin_format(#[case] pin: &str, #[case] ok: bool) {
        assert_eq!(validate_pin_format(pin).is_ok(), ok);
    }

    #[tokio::test]
    async fn test_correct_pin_issues_token() {
        let (gate, _, user) = gate().await;
        let result = gate.verify_pin(user, "1234").await.unwrap();

        assert!(result.verified);
        assert_eq!(result.attempts_remaining, MAX_PIN_ATTEMPTS);
        let token = result.token.unwrap();
        assert!(token.starts_with("txn_"));
        assert!(gate.validate_pin_token(user, &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_mismatch_escalates_then_locks() {
        let (gate, clock, user) = gate().await;
        let start = clock.now();

        let first = gate.verify_pin(user, "0000").await.unwrap();
        assert!(!first.verified);
        assert_eq!(first.attempts_remaining, 4);
        assert_eq!(first.locked_until, Some(start + Duration::seconds(30)));

        // Inside the window even the right PIN is refused.
        let err = gate.verify_pin(user, "1234").await.unwrap_err();
        assert_eq!(err, LedgerError::pin_locked(0, start + Duration::seconds(30)));

        let mut previous_window = Duration::seconds(30);
        for expected_remaining in (0..4).rev() {
            clock.advance(previous_window);
            let now = clock.now();
            let result = gate.verify_pin(user, "0000").await.unwrap();
            assert_eq!(result.attempts_remaining, expected_remaining);
            let until = result.locked_until.unwrap();
            assert!(until > now);
            assert!(until - now > previous_window);
            previous_window = until - now;
        }

        assert!(matches!(
            gate.verify_pin(user, "1234").await,
            Err(LedgerError::PinLocked { attempts_remaining: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_correct_pin_after_window_resets_attempts() {
        let (gate, clock, user) = gate().await;
        for _ in 0..2 {
            let result = gate.verify_pin(user, "9999").await.unwrap();
            clock.set(result.locked_until.unwrap());
        }

        let result = gate.verify_pin(user, "1234").await.unwrap();
        assert!(result.verified);
        assert_eq!(result.attempts_remaining, MAX_PIN_ATTEMPTS);

        let next_failure = gate.verify_pin(user, "9999").await.unwrap();
        assert_eq!(next_failure.attempts_remaining, MAX_PIN_ATTEMPTS - 1);
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let (gate, _, user) = gate().await;
        let token = gate.verify_pin(user, "1234").await.unwrap().token.unwrap();

        gate.redeem_pin_token(user, &token).await.unwrap();
        assert_eq!(
            gate.redeem_pin_token(user, &token).await.unwrap_err(),
            LedgerError::PinTokenExpired
        );
        assert!(!gate.validate_pin_token(user, &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_expires() {
        let (gate, clock, user) = gate().await;
        let token = gate.verify_pin(user, "1234").await.unwrap().token.unwrap();
        clock.advance(Duration::minutes(5));

        assert!(!gate.validate_pin_token(user, &token).await.unwrap());
        assert!(gate.redeem_pin_token(user, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_token_bound_to_user() {
        let (gate, _, user) = gate().await;
        let token = gate.verify_pin(user, "1234").await.unwrap().token.unwrap();
        assert!(!gate.validate_pin_token(Uuid::from_u128(2), &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (gate, _, user) = gate().await;
        let token = gate.verify_pin(user, "1234").await.unwrap().token.unwrap();

        gate.invalidate_pin_token(&token).await.unwrap();
        gate.invalidate_pin_token(&token).await.unwrap();
        gate.invalidate_pin_token("txn_never_issued").await.unwrap();
        assert!(!gate.validate_pin_token(user, &token).await.unwrap());
    }
}
