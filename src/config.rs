//! Runtime configuration
//!
//! Values come from environment variables (a `.env` file is loaded by the
//! binary first) with defaults for everything. Malformed numbers are
//! rejected, naming the variable, rather than silently replaced.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::types::{LedgerError, Money};

/// Default per-transaction ceiling in minor units
pub const DEFAULT_SINGLE_TRANSACTION_LIMIT: i64 = 500_000;

/// Default daily aggregate ceiling in minor units
pub const DEFAULT_DAILY_LIMIT: i64 = 2_000_000;

/// bcrypt accepts cost factors 4 through 31
const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

/// Upper bound for configured lifetimes and retry delays
pub const MAX_CONFIGURED_SECS: i64 = 30 * 24 * 60 * 60;

/// Per-transaction and daily ceilings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitConfig {
    pub single_transaction_limit: Money,
    pub daily_limit: Money,
    /// Offset of the local day boundary from UTC
    pub utc_offset_minutes: i32,
}

impl LimitConfig {
    /// Start of the local day containing `now`, as a UTC instant
    pub fn day_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::minutes(i64::from(self.utc_offset_minutes));
        let local_midnight = (now + offset).date_naive().and_time(NaiveTime::MIN).and_utc();
        local_midnight - offset
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        LimitConfig {
            single_transaction_limit: Money::from_minor(DEFAULT_SINGLE_TRANSACTION_LIMIT),
            daily_limit: Money::from_minor(DEFAULT_DAILY_LIMIT),
            utc_offset_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinConfig {
    pub token_ttl: Duration,
    /// bcrypt cost factor
    pub hash_cost: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        PinConfig {
            token_ttl: Duration::seconds(300),
            hash_cost: 10,
        }
    }
}

/// Exponential backoff for gateway retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl RetryConfig {
    /// Delay before the retry following `retry_count` earlier attempts:
    /// `base * 2^retry_count`, capped at the maximum
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let secs = 2u64
            .checked_pow(retry_count)
            .and_then(|factor| self.base_delay_secs.checked_mul(factor))
            .unwrap_or(u64::MAX)
            .min(self.max_delay_secs)
            .max(1);
        i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or_else(|| Duration::seconds(MAX_CONFIGURED_SECS))
            .min(Duration::seconds(MAX_CONFIGURED_SECS))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            base_delay_secs: 60,
            max_delay_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout: StdDuration,
    /// Lifetime of a deposit checkout session
    pub checkout_ttl: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            base_url: "https://api.paystack.co".to_string(),
            secret_key: String::new(),
            timeout: StdDuration::from_secs(30),
            checkout_ttl: Duration::seconds(1800),
        }
    }
}

/// Complete ledger configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub currency: String,
    pub limits: LimitConfig,
    pub pin: PinConfig,
    pub retry: RetryConfig,
    pub gateway: GatewayConfig,
    /// Shared secret for inbound webhook signatures
    pub webhook_secret: String,
    /// Settlement delay applied to savings wallets at provisioning; 0 disables it
    pub savings_settlement_delay_minutes: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            currency: "NGN".to_string(),
            limits: LimitConfig::default(),
            pin: PinConfig::default(),
            retry: RetryConfig::default(),
            gateway: GatewayConfig::default(),
            webhook_secret: String::new(),
            savings_settlement_delay_minutes: 0,
        }
    }
}

impl LedgerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, LedgerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration from a map, for tests and embedding
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self, LedgerError> {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, LedgerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LedgerConfig::default();

        let secret_key = lookup("GATEWAY_SECRET_KEY").unwrap_or_default();
        let webhook_secret = lookup("WEBHOOK_SECRET").unwrap_or_else(|| secret_key.clone());

        let config = LedgerConfig {
            currency: lookup("LEDGER_CURRENCY").unwrap_or(defaults.currency),
            limits: LimitConfig {
                single_transaction_limit: Money::from_minor(parse_var(
                    &lookup,
                    "LEDGER_SINGLE_TRANSACTION_LIMIT",
                    defaults.limits.single_transaction_limit.minor_units(),
                )?),
                daily_limit: Money::from_minor(parse_var(
                    &lookup,
                    "LEDGER_DAILY_LIMIT",
                    defaults.limits.daily_limit.minor_units(),
                )?),
                utc_offset_minutes: parse_var(
                    &lookup,
                    "LEDGER_UTC_OFFSET_MINUTES",
                    defaults.limits.utc_offset_minutes,
                )?,
            },
            pin: PinConfig {
                token_ttl: seconds_var(&lookup, "PIN_TOKEN_TTL_SECS", defaults.pin.token_ttl)?,
                hash_cost: parse_var(&lookup, "PIN_HASH_COST", defaults.pin.hash_cost)?,
            },
            retry: RetryConfig {
                base_delay_secs: parse_var(&lookup, "RETRY_BASE_DELAY_SECS", defaults.retry.base_delay_secs)?,
                max_delay_secs: parse_var(&lookup, "RETRY_MAX_DELAY_SECS", defaults.retry.max_delay_secs)?,
            },
            gateway: GatewayConfig {
                base_url: lookup("GATEWAY_BASE_URL").unwrap_or(defaults.gateway.base_url),
                secret_key,
                timeout: StdDuration::from_secs(parse_var(
                    &lookup,
                    "GATEWAY_TIMEOUT_SECS",
                    defaults.gateway.timeout.as_secs(),
                )?),
                checkout_ttl: seconds_var(&lookup, "GATEWAY_CHECKOUT_TTL_SECS", defaults.gateway.checkout_ttl)?,
            },
            webhook_secret,
            savings_settlement_delay_minutes: parse_var(
                &lookup,
                "SAVINGS_SETTLEMENT_DELAY_MINUTES",
                defaults.savings_settlement_delay_minutes,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot work
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.limits.single_transaction_limit.is_positive() {
            return Err(LedgerError::validation(
                "LEDGER_SINGLE_TRANSACTION_LIMIT",
                "must be positive",
            ));
        }
        if self.limits.daily_limit < self.limits.single_transaction_limit {
            return Err(LedgerError::validation(
                "LEDGER_DAILY_LIMIT",
                "must not be below the single transaction limit",
            ));
        }
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.pin.hash_cost) {
            return Err(LedgerError::validation(
                "PIN_HASH_COST",
                format!("must be within {}..={}", MIN_HASH_COST, MAX_HASH_COST),
            ));
        }
        let max_lifetime = Duration::seconds(MAX_CONFIGURED_SECS);
        if self.pin.token_ttl <= Duration::zero() || self.pin.token_ttl > max_lifetime {
            return Err(LedgerError::validation(
                "PIN_TOKEN_TTL_SECS",
                format!("must be within 1..={}", MAX_CONFIGURED_SECS),
            ));
        }
        if self.gateway.checkout_ttl <= Duration::zero() || self.gateway.checkout_ttl > max_lifetime {
            return Err(LedgerError::validation(
                "GATEWAY_CHECKOUT_TTL_SECS",
                format!("must be within 1..={}", MAX_CONFIGURED_SECS),
            ));
        }
        if self.retry.base_delay_secs == 0 {
            return Err(LedgerError::validation("RETRY_BASE_DELAY_SECS", "must be positive"));
        }
        if self.retry.max_delay_secs > MAX_CONFIGURED_SECS as u64 {
            return Err(LedgerError::validation(
                "RETRY_MAX_DELAY_SECS",
                format!("must not exceed {}", MAX_CONFIGURED_SECS),
            ));
        }
        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(LedgerError::validation(
                "RETRY_MAX_DELAY_SECS",
                "must not be below the base delay",
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, LedgerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| LedgerError::validation(key, format!("'{}': {}", raw, e))),
        _ => Ok(default),
    }
}

/// Parse a whole number of seconds into a duration
fn seconds_var<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, LedgerError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_var(lookup, key, default.num_seconds())?;
    Duration::try_seconds(secs).ok_or_else(|| LedgerError::validation(key, format!("'{}' is out of range", secs)))
}
