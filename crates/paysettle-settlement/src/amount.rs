//! Conversions between rail-native integer amounts and decimal amounts.

use paysettle_core::types::Currency;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::SettlementError;

/// Significant digits a `Decimal` holds without overflow.
const MAX_DIGITS: usize = 28;

/// Scale a raw integer token amount by `10^decimals`.
///
/// The decimal point is placed on the digit string, so the division is exact
/// for any magnitude. The result is then narrowed to a `Decimal`, truncating
/// fractional digits that do not fit.
pub fn scale_token_amount(raw: &str, decimals: u32) -> Result<Decimal, SettlementError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SettlementError::InvalidAmount(format!(
            "token amount {:?} is not an unsigned integer",
            raw
        )));
    }

    let digits = raw.trim_start_matches('0');
    let scale = decimals as usize;
    let (int_part, frac_part) = if digits.len() > scale {
        digits.split_at(digits.len() - scale)
    } else {
        ("", digits)
    };
    let frac_full = format!("{:0>width$}", frac_part, width = scale);

    if int_part.len() > MAX_DIGITS {
        return Err(SettlementError::InvalidAmount(format!(
            "token amount {} with {} decimals exceeds decimal range",
            raw, decimals
        )));
    }

    let keep = frac_full.len().min(MAX_DIGITS - int_part.len());
    let frac = frac_full[..keep].trim_end_matches('0');
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let text = if frac.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac)
    };

    Decimal::from_str(&text).map_err(|err| {
        SettlementError::InvalidAmount(format!("token amount {}: {}", raw, err))
    })
}

/// Convert a major-unit amount into the currency's minor units.
///
/// Amounts carrying precision below the minor unit are rejected rather than
/// rounded.
pub fn to_minor_units(amount: Decimal, currency: Currency) -> Result<i64, SettlementError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(SettlementError::InvalidAmount(format!(
            "negative amount {} {}",
            amount, currency
        )));
    }
    let factor = Decimal::from(10u64.pow(currency.decimals()));
    let minor = amount.checked_mul(factor).ok_or_else(|| {
        SettlementError::InvalidAmount(format!("amount {} {} overflows", amount, currency))
    })?;
    if !minor.fract().is_zero() {
        return Err(SettlementError::InvalidAmount(format!(
            "amount {} has more precision than {} allows",
            amount, currency
        )));
    }
    minor.to_i64().ok_or_else(|| {
        SettlementError::InvalidAmount(format!("amount {} {} overflows", amount, currency))
    })
}
