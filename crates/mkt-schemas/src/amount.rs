//! Integer-micros monetary amounts.
//!
//! Amounts are held as `i64` micros (1 unit = 1_000_000 micros) so that totals
//! compare exactly. The JSON representation is a plain number in major units;
//! the conversion happens only in the serde impls below.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Scale factor: 1 currency unit = 1_000_000 micros.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Errors returned when a wire value cannot become an [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// Input was `NaN` or infinite.
    NotFinite,
    /// Input would overflow `i64` after scaling.
    OutOfRange,
    /// Monetary amounts are never negative.
    Negative,
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::NotFinite => write!(f, "amount is not finite (NaN or Inf)"),
            AmountError::OutOfRange => write!(f, "amount out of range"),
            AmountError::Negative => write!(f, "amount must not be negative"),
        }
    }
}

impl std::error::Error for AmountError {}

/// A non-negative monetary amount in integer micros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_micros(micros: i64) -> Result<Self, AmountError> {
        if micros < 0 {
            return Err(AmountError::Negative);
        }
        Ok(Self(micros))
    }

    /// Convert a major-unit wire value (e.g. `19.99`), rounding to the
    /// nearest micro.
    pub fn from_major(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotFinite);
        }
        let scaled = value * MICROS_PER_UNIT as f64;
        if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
            return Err(AmountError::OutOfRange);
        }
        Self::from_micros(scaled.round() as i64)
    }

    pub fn micros(&self) -> i64 {
        self.0
    }

    pub fn to_major(&self) -> f64 {
        self.0 as f64 / MICROS_PER_UNIT as f64
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.0 / MICROS_PER_UNIT;
        let frac = self.0 % MICROS_PER_UNIT;
        write!(f, "{units}.{frac:06}")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Amount::from_major(raw).map_err(serde::de::Error::custom)
    }
}
