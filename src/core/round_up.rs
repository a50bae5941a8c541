//! Round-up calculator
//!
//! Pure functions turning a payment amount and a user's rule into the
//! micro-savings amount moved from the main wallet to savings. The result is
//! never negative; a missing or disabled rule yields zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{AutoSettings, IncrementType, Money, RoundUpCalculation, RoundUpRule};

/// Payments at or below this amount get the minimum auto increment
pub const AUTO_LOW_ANCHOR: Money = Money::from_minor(10_000);

/// Payments at or above this amount round to the maximum auto increment
pub const AUTO_HIGH_ANCHOR: Money = Money::from_minor(100_000);

/// Target used when an auto rule has no settings
const AUTO_FALLBACK_TARGET: Money = Money::from_minor(1_000);

/// Compute the round-up for `amount` under `rule`
///
/// # Arguments
///
/// * `amount` - Base payment amount in minor units
/// * `rule` - The user's rule, if any
///
/// # Returns
///
/// The round-up amount and the base amount plus round-up.
pub fn calculate_round_up(amount: Money, rule: Option<&RoundUpRule>) -> RoundUpCalculation {
    let round_up_amount = match rule {
        Some(rule) if rule.is_enabled && amount.is_positive() => match rule.increment_type {
            IncrementType::Ten | IncrementType::Fifty | IncrementType::Hundred => rule
                .increment_type
                .fixed_target()
                .map(|target| fixed_round_up(amount, target))
                .unwrap_or(Money::ZERO),
            IncrementType::Percentage => percentage_round_up(amount, rule.percentage_value),
            IncrementType::Auto => auto_round_up(amount, rule.auto_settings.as_ref()),
        },
        _ => Money::ZERO,
    }
    .non_negative();

    RoundUpCalculation {
        round_up_amount,
        total_amount: amount.checked_add(round_up_amount).unwrap_or(amount),
    }
}

/// Whether `available_balance` covers the payment plus its round-up
pub fn can_apply_round_up(amount: Money, round_up_amount: Money, available_balance: Money) -> bool {
    match amount.checked_add(round_up_amount) {
        Some(total) => available_balance >= total,
        None => false,
    }
}

/// Distance from `amount` up to the next multiple of `target`
pub fn fixed_round_up(amount: Money, target: Money) -> Money {
    if !target.is_positive() {
        return Money::ZERO;
    }
    let remainder = amount.minor_units().rem_euclid(target.minor_units());
    if remainder == 0 {
        Money::ZERO
    } else {
        Money::from_minor(target.minor_units() - remainder)
    }
}

fn percentage_round_up(amount: Money, percentage: Option<Decimal>) -> Money {
    let Some(percentage) = percentage else {
        return Money::ZERO;
    };
    if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        return Money::ZERO;
    }
    let raw = Decimal::from(amount.minor_units()) * percentage / Decimal::ONE_HUNDRED;
    raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .map(Money::from_minor)
        .unwrap_or(Money::ZERO)
}

fn auto_round_up(amount: Money, settings: Option<&AutoSettings>) -> Money {
    let Some(settings) = settings else {
        return fixed_round_up(amount, AUTO_FALLBACK_TARGET);
    };
    let min = settings.min_increment;
    let max = settings.max_increment;
    if !min.is_positive() || max < min {
        return fixed_round_up(amount, AUTO_FALLBACK_TARGET);
    }

    if amount <= AUTO_LOW_ANCHOR {
        return min;
    }
    if amount >= AUTO_HIGH_ANCHOR {
        return fixed_round_up(amount, max).min(max);
    }

    let span = i128::from(max.minor_units() - min.minor_units());
    let offset = i128::from(amount.minor_units() - AUTO_LOW_ANCHOR.minor_units());
    let range = i128::from(AUTO_HIGH_ANCHOR.minor_units() - AUTO_LOW_ANCHOR.minor_units());
    // span * offset stays well inside i128 for any i64 inputs
    let step = i64::try_from(span * offset / range).unwrap_or(0);
    let increment = Money::from_minor(min.minor_units() + step);
    fixed_round_up(amount, increment)
}
