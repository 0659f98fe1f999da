//! Conversion between wei and ether-denominated decimal amounts.

use std::str::FromStr;

use bigdecimal::{num_bigint::BigInt, BigDecimal, ToPrimitive};
use thiserror::Error;

/// Fractional digits of one ether.
pub const ETHER_DECIMALS: u32 = 18;
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UnitsError {
    #[error("{0:?} is not a decimal amount")]
    Malformed(String),
    #[error("{0:?} has more than 18 fractional digits")]
    TooPrecise(String),
    #[error("{0:?} does not fit into 128 bits of wei")]
    Overflow(String),
}

fn wei_per_ether() -> BigDecimal {
    BigDecimal::from(u64::pow(10, ETHER_DECIMALS))
}

/// Plain digits with at most one decimal point between them, no sign or exponent.
fn is_plain_decimal(value: &str) -> bool {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, "0"));
    !whole.is_empty()
        && !fraction.is_empty()
        && whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
}

/// Parses a decimal ether amount such as `"1.5"` into wei.
pub fn parse_ether(value: &str) -> Result<u128, UnitsError> {
    let trimmed = value.trim();
    if !is_plain_decimal(trimmed) {
        return Err(UnitsError::Malformed(value.to_string()));
    }
    let ether = BigDecimal::from_str(trimmed).map_err(|_| UnitsError::Malformed(value.to_string()))?;

    let wei = ether * wei_per_ether();
    if !wei.is_integer() {
        return Err(UnitsError::TooPrecise(value.to_string()));
    }
    let (digits, _) = wei.with_scale(0).into_bigint_and_exponent();
    digits.to_u128().ok_or_else(|| UnitsError::Overflow(value.to_string()))
}

/// The exact ether value of `wei`.
pub fn to_ether(wei: u128) -> BigDecimal {
    BigDecimal::new(BigInt::from(wei), i64::from(ETHER_DECIMALS))
}

/// Formats wei as a decimal ether amount without trailing zeros.
pub fn format_ether(wei: u128) -> String {
    to_ether(wei).normalized().to_plain_string()
}

/// The human-readable amount stored in a ledger record for a wei value.
pub fn wei_to_amount(wei: u128) -> f64 {
    // The decimal string rounds once, a float division of the parts would not
    format_ether(wei).parse().unwrap_or(f64::INFINITY)
}
