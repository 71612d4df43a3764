//! Monetary amounts in the ledger's smallest unit.
//!
//! All engine arithmetic is unsigned integer math over micro-units, widened
//! to `u128` for ratio computations so products never overflow. Division
//! truncates toward zero, which gives the floor semantics the settlement
//! rules require. `rust_decimal` is used only at the boundary, for parsing
//! whole-unit decimal strings and for fixed six-place display.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// Micro-units per whole currency unit.
pub const CURRENCY_UNIT: u64 = 1_000_000;

/// Minimum fee per ledger transaction, in micro-units.
///
/// A caller's declared fee budget must cover this for every ledger action
/// an invocation plans to issue.
pub const MIN_TXN_FEE: u64 = 1_000;

/// A non-negative monetary amount in micro-units.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use escrow_engine::Amount;
///
/// let amount = Amount::from_str("10.5").unwrap();
/// assert_eq!(amount.micro(), 10_500_000);
/// assert_eq!(amount.to_string(), "10.500000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(u64);

impl Amount {
    /// Decimal places when formatting whole-unit strings.
    pub const SCALE: u32 = 6;

    /// Zero value.
    pub const ZERO: Self = Amount(0);

    /// Creates an amount from a raw micro-unit count.
    pub const fn from_micro(micro: u64) -> Self {
        Amount(micro)
    }

    /// Creates an amount from whole currency units.
    ///
    /// Returns `None` if the conversion overflows.
    pub fn from_whole(units: u64) -> Option<Self> {
        units.checked_mul(CURRENCY_UNIT).map(Amount)
    }

    /// Raw micro-unit count.
    pub const fn micro(self) -> u64 {
        self.0
    }

    /// Returns `true` if this amount is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// `floor(self * pct / 100)`, computed without intermediate overflow.
    pub fn percent_floor(self, pct: u64) -> Self {
        Amount((self.0 as u128 * pct as u128 / 100) as u64)
    }

    /// `ceil(self * pct / 100)`, computed without intermediate overflow.
    pub fn percent_ceil(self, pct: u64) -> Self {
        Amount(((self.0 as u128 * pct as u128 + 99) / 100) as u64)
    }

    /// Splits this amount into `(floor(self / 2), remainder)`.
    ///
    /// The second half carries the odd micro-unit, if any.
    pub fn split_half(self) -> (Self, Self) {
        let half = self.0 / 2;
        (Amount(half), Amount(self.0 - half))
    }

    /// Tokens owed for this contribution at `rate` tokens per whole unit:
    /// `floor(micro * rate / CURRENCY_UNIT)`. Fractional tokens are
    /// truncated, never rounded up.
    ///
    /// Returns `None` when the quotient does not fit a `u64`, so an
    /// oversized rate rejects the invocation instead of wrapping.
    pub fn tokens_at_rate(self, rate: u64) -> Option<u64> {
        let owed = self.0 as u128 * rate as u128 / CURRENCY_UNIT as u128;
        u64::try_from(owed).ok()
    }
}

/// Parse error for whole-unit decimal strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAmountError(String);

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid amount: {}", self.0)
    }
}

impl std::error::Error for ParseAmountError {}

impl FromStr for Amount {
    type Err = ParseAmountError;

    /// Parses a whole-unit decimal string ("10.5") into micro-units.
    ///
    /// Rejects negative values and anything finer than micro-unit precision.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal =
            Decimal::from_str(trimmed).map_err(|e| ParseAmountError(format!("{trimmed}: {e}")))?;
        if decimal.is_sign_negative() {
            return Err(ParseAmountError(format!("{trimmed}: negative")));
        }
        let scaled = decimal
            .checked_mul(Decimal::from(CURRENCY_UNIT))
            .ok_or_else(|| ParseAmountError(format!("{trimmed}: out of range")))?;
        if !scaled.fract().is_zero() {
            return Err(ParseAmountError(format!(
                "{trimmed}: finer than micro-unit precision"
            )));
        }
        scaled
            .to_u64()
            .map(Amount)
            .ok_or_else(|| ParseAmountError(format!("{trimmed}: out of range")))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimal = Decimal::from_i128_with_scale(self.0 as i128, Self::SCALE);
        write!(f, "{decimal}")
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}
