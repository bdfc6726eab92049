//! Fee and bonus calculation.
//!
//! All percentages are in basis points (1 bps = 0.01 %) and every result is rounded half away from zero to the minor
//! unit. [`price`] is a pure function of its inputs.
use serde::{Deserialize, Serialize};
use sfp_common::Money;
use thiserror::Error;

fn active_by_default() -> bool {
    true
}

/// The processing fee a gateway adds on top of the base amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeRule {
    #[default]
    None,
    Fixed {
        amount: Money,
        #[serde(default = "active_by_default")]
        active: bool,
    },
    Percentage {
        bps: i64,
        #[serde(default = "active_by_default")]
        active: bool,
    },
}

impl FeeRule {
    /// The fee for `base`, or `None` if it cannot be represented.
    pub fn fee_for(&self, base: Money) -> Option<Money> {
        match self {
            FeeRule::Fixed { amount, active: true } => Some(*amount),
            FeeRule::Percentage { bps, active: true } => base.percent_bps(*bps),
            _ => Some(Money::default()),
        }
    }
}

/// A promotional credit for deposits of at least `min_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusRule {
    pub min_amount: Money,
    pub bps: i64,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_amount: Money,
    pub fee_amount: Money,
    /// `base_amount + fee_amount`, the amount the gateway charges
    pub total_charged: Money,
    pub bonus_amount: Money,
    /// `base_amount + bonus_amount`, the amount a completed deposit adds to the balance
    pub effective_credit: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Amount {0} is too large to be charged")]
pub struct PriceOverflow(pub Money);

/// Prices a charge of `base`.
///
/// When several bonus rules apply, the one with the highest threshold wins. Equal thresholds go to the higher rate.
/// Fails if the fee, the total or the credit does not fit in a [`Money`].
pub fn price(base: Money, fee_rule: &FeeRule, bonus_rules: &[BonusRule]) -> Result<PriceBreakdown, PriceOverflow> {
    let overflow = || PriceOverflow(base);
    let fee_amount = fee_rule.fee_for(base).ok_or_else(overflow)?;
    let bonus_amount = match bonus_rules
        .iter()
        .filter(|r| r.active && base >= r.min_amount)
        .max_by_key(|r| (r.min_amount, r.bps))
    {
        Some(rule) => base.percent_bps(rule.bps).ok_or_else(overflow)?,
        None => Money::default(),
    };
    Ok(PriceBreakdown {
        base_amount: base,
        fee_amount,
        total_charged: base.checked_add(fee_amount).ok_or_else(overflow)?,
        bonus_amount,
        effective_credit: base.checked_add(bonus_amount).ok_or_else(overflow)?,
    })
}
