use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AmountError {
    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("{0} is not a finite amount")]
    NotFinite(f64),

    #[error("{0} is out of range")]
    OutOfRange(f64),
}

/// Fixed-point decimal with 4 decimal places, stored as a scaled integer.
///
/// Used for copay amounts (dollars) and coinsurance percentages (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 10_000;

    /// Rejects NaN, infinities and anything the scaled integer cannot hold.
    pub fn from_float(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotFinite(value));
        }
        let scaled = (value * Self::SCALE as f64).round();
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        if scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
            return Err(AmountError::OutOfRange(value));
        }
        Ok(Amount(scaled as i64))
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    pub fn whole(value: i64) -> Self {
        Amount(value * Self::SCALE)
    }

    pub fn to_float(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Amount {
    /// Prints at least two decimals, trailing zeros beyond that are trimmed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let mut frac = format!("{:04}", abs % Self::SCALE);
        while frac.len() > 2 && frac.ends_with('0') {
            frac.pop();
        }
        write!(f, "{sign}{whole}.{frac}")
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<f64>()
            .map_err(|_| AmountError::NotANumber(s.trim().to_string()))?;
        Amount::from_float(value)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_float())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Amount::from_float(value).map_err(serde::de::Error::custom)
    }
}
