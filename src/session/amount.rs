//! Amount - ledger amount, a decimal with at most 7 places.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Smallest ledger unit is 10^-7.
pub const DECIMALS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount {0:?}")]
pub struct ParseAmountError(String);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// From the ledger's integer unit (10^-7).
    pub fn from_stroops(stroops: i64) -> Self {
        Self(Decimal::new(stroops, DECIMALS))
    }

    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, ParseAmountError> {
        if value.scale() > DECIMALS {
            return Err(ParseAmountError(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    fn rescaled(&self) -> Decimal {
        let mut value = self.0;
        value.rescale(DECIMALS);
        value
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAmountError(s.to_string());
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('-').unwrap_or(trimmed);
        // Plain decimal notation only; no exponents, separators or second sign.
        if !body.bytes().any(|b| b.is_ascii_digit())
            || !body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        {
            return Err(err());
        }
        let value = Decimal::from_str(trimmed).map_err(|_| err())?;
        Self::from_decimal(value).map_err(|_| err())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rescaled())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::str::serialize(&self.rescaled(), serializer)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = rust_decimal::serde::str::deserialize(deserializer)?;
        Self::from_decimal(value).map_err(serde::de::Error::custom)
    }
}
