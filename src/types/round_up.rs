//! Round-up rule types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::LedgerError;
use super::ids::{RuleId, UserId};
use super::money::Money;

/// How a rule rounds a payment up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncrementType {
    /// Round up to the next multiple of 1 000 minor units
    #[serde(rename = "10")]
    Ten,
    /// Round up to the next multiple of 5 000 minor units
    #[serde(rename = "50")]
    Fifty,
    /// Round up to the next multiple of 10 000 minor units
    #[serde(rename = "100")]
    Hundred,
    /// Increment interpolated from the payment size
    #[serde(rename = "auto")]
    Auto,
    /// Fixed percentage of the payment
    #[serde(rename = "percentage")]
    Percentage,
}

impl IncrementType {
    /// Rounding target in minor units for the fixed increments
    pub fn fixed_target(&self) -> Option<Money> {
        match self {
            IncrementType::Ten => Some(Money::from_minor(1_000)),
            IncrementType::Fifty => Some(Money::from_minor(5_000)),
            IncrementType::Hundred => Some(Money::from_minor(10_000)),
            IncrementType::Auto | IncrementType::Percentage => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IncrementType::Ten => "10",
            IncrementType::Fifty => "50",
            IncrementType::Hundred => "100",
            IncrementType::Auto => "auto",
            IncrementType::Percentage => "percentage",
        }
    }
}

impl fmt::Display for IncrementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncrementType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "10" => Ok(IncrementType::Ten),
            "50" => Ok(IncrementType::Fifty),
            "100" => Ok(IncrementType::Hundred),
            "auto" => Ok(IncrementType::Auto),
            "percentage" => Ok(IncrementType::Percentage),
            other => Err(LedgerError::validation(
                "increment_type",
                format!("unknown increment type '{}'", other),
            )),
        }
    }
}

/// Bounds for the `auto` increment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSettings {
    pub min_increment: Money,
    pub max_increment: Money,
    pub analysis_period_days: u32,
    pub last_analysis_at: Option<DateTime<Utc>>,
}

/// A user's round-up preferences and running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundUpRule {
    pub id: RuleId,
    pub user_id: UserId,
    pub increment_type: IncrementType,
    pub is_enabled: bool,
    pub percentage_value: Option<Decimal>,
    pub auto_settings: Option<AutoSettings>,
    pub total_round_ups_count: u64,
    pub total_amount_saved: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoundUpRule {
    /// An enabled rule with zeroed counters
    pub fn new(user_id: UserId, increment_type: IncrementType, now: DateTime<Utc>) -> Self {
        RoundUpRule {
            id: Uuid::new_v4(),
            user_id,
            increment_type,
            is_enabled: true,
            percentage_value: None,
            auto_settings: None,
            total_round_ups_count: 0,
            total_amount_saved: Money::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_percentage(mut self, value: Decimal) -> Self {
        self.percentage_value = Some(value);
        self
    }

    pub fn with_auto_settings(mut self, min_increment: Money, max_increment: Money) -> Self {
        self.auto_settings = Some(AutoSettings {
            min_increment,
            max_increment,
            analysis_period_days: 30,
            last_analysis_at: None,
        });
        self
    }

    /// Check the rule before it is stored
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] when a percentage rule has no value in
    /// `(0, 100]` or auto settings have `max_increment < min_increment`.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if let Some(value) = self.percentage_value {
            if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(LedgerError::validation(
                    "percentage_value",
                    format!("must be within (0, 100], got {}", value),
                ));
            }
        } else if self.increment_type == IncrementType::Percentage {
            return Err(LedgerError::validation(
                "percentage_value",
                "required for percentage rules",
            ));
        }

        if let Some(settings) = &self.auto_settings {
            if !settings.min_increment.is_positive() {
                return Err(LedgerError::validation(
                    "auto_settings.min_increment",
                    "must be positive",
                ));
            }
            if settings.max_increment < settings.min_increment {
                return Err(LedgerError::validation(
                    "auto_settings.max_increment",
                    format!(
                        "{} is below the minimum increment {}",
                        settings.max_increment, settings.min_increment
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Result of a round-up calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundUpCalculation {
    pub round_up_amount: Money,
    pub total_amount: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rule(increment_type: IncrementType) -> RoundUpRule {
        RoundUpRule::new(Uuid::from_u128(1), increment_type, Utc::now())
    }

    #[rstest]
    #[case::fixed(rule(IncrementType::Ten))]
    #[case::percentage_full(rule(IncrementType::Percentage).with_percentage(Decimal::ONE_HUNDRED))]
    #[case::percentage_fraction(rule(IncrementType::Percentage).with_percentage(Decimal::new(25, 1)))]
    #[case::auto_equal_bounds(rule(IncrementType::Auto).with_auto_settings(Money::from_minor(500), Money::from_minor(500)))]
    fn test_validate_accepts(#[case] rule: RoundUpRule) {
        assert!(rule.validate().is_ok());
    }

    #[rstest]
    #[case::percentage_missing(rule(IncrementType::Percentage), "percentage_value")]
    #[case::percentage_zero(rule(IncrementType::Percentage).with_percentage(Decimal::ZERO), "percentage_value")]
    #[case::percentage_over(rule(IncrementType::Percentage).with_percentage(Decimal::new(101, 0)), "percentage_value")]
    #[case::auto_inverted(
        rule(IncrementType::Auto).with_auto_settings(Money::from_minor(900), Money::from_minor(100)),
        "auto_settings.max_increment"
    )]
    fn test_validate_rejects(#[case] rule: RoundUpRule, #[case] expected_field: &str) {
        match rule.validate() {
            Err(LedgerError::Validation { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_increment_type_serde_values() {
        assert_eq!(serde_json::to_string(&IncrementType::Fifty).unwrap(), "\"50\"");
        let parsed: IncrementType = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(parsed, IncrementType::Auto);
    }
}
