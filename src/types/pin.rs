//! PIN credential, lockout and authorization token types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Failed attempts before the hard block
pub const MAX_PIN_ATTEMPTS: u8 = 5;

/// Prefix of every authorization token
pub const PIN_TOKEN_PREFIX: &str = "txn_";

/// Lockout window after the given number of consecutive failures
///
/// Windows escalate strictly: 30s, 2min, 5min, 15min, then a one hour hard
/// block once the attempts are exhausted.
pub fn lockout_window(failed_attempts: u8) -> Option<Duration> {
    match failed_attempts {
        0 => None,
        1 => Some(Duration::seconds(30)),
        2 => Some(Duration::minutes(2)),
        3 => Some(Duration::minutes(5)),
        4 => Some(Duration::minutes(15)),
        _ => Some(Duration::hours(1)),
    }
}

/// Stored PIN hash and lockout counters for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinCredentials {
    pub user_id: UserId,
    pub pin_hash: String,
    pub failed_pin_attempts: u8,
    pub last_failed_attempt_at: Option<DateTime<Utc>>,
}

impl PinCredentials {
    pub fn new(user_id: UserId, pin_hash: String) -> Self {
        PinCredentials {
            user_id,
            pin_hash,
            failed_pin_attempts: 0,
            last_failed_attempt_at: None,
        }
    }

    /// End of the current lockout window, if any failure has been recorded
    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        let window = lockout_window(self.failed_pin_attempts)?;
        self.last_failed_attempt_at.map(|at| at + window)
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until().is_some_and(|until| until > now)
    }

    pub fn attempts_remaining(&self) -> u8 {
        MAX_PIN_ATTEMPTS.saturating_sub(self.failed_pin_attempts)
    }
}

/// Single-use authorization token issued after a successful PIN check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl PinToken {
    /// Usable by `user_id` at `now`
    pub fn is_valid_for(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        self.user_id == user_id && !self.consumed && self.expires_at > now
    }
}

/// Outcome of a PIN verification that was not blocked by a lockout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinVerification {
    pub verified: bool,
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub attempts_remaining: u8,
    pub locked_until: Option<DateTime<Utc>>,
}
