//! Scalar native types with no direct Rust primitive: currency, date,
//! error codes, and the by-reference wrappers

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::ConversionError;

use super::Value;

/// Scale of the currency type: four implied decimal digits.
pub const CURRENCY_SCALE: i64 = 10_000;

/// Fixed-point currency: a 64-bit integer scaled by 10,000.
///
/// `$5.25` is stored as `52500`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Currency(pub i64);

impl Currency {
    /// Build from whole units and ten-thousandths. Amounts beyond the
    /// representable range saturate; see [`Currency::checked_new`].
    pub fn new(units: i64, fraction: u16) -> Self {
        Self::checked_new(units, fraction).unwrap_or(if units < 0 {
            Currency(i64::MIN)
        } else {
            Currency(i64::MAX)
        })
    }

    /// Build from whole units and ten-thousandths, or `None` if the amount
    /// does not fit.
    pub fn checked_new(units: i64, fraction: u16) -> Option<Self> {
        let fraction = i64::from(fraction.min(9_999));
        let scaled = units.checked_mul(CURRENCY_SCALE)?;
        let total = if units < 0 {
            scaled.checked_sub(fraction)?
        } else {
            scaled.checked_add(fraction)?
        };
        Some(Currency(total))
    }

    /// Round a float to the nearest ten-thousandth.
    pub fn from_f64(value: f64) -> Self {
        Currency((value * CURRENCY_SCALE as f64).round() as i64)
    }

    /// The scaled integer
    pub fn scaled(self) -> i64 {
        self.0
    }

    /// As a float (may lose precision for very large amounts)
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / CURRENCY_SCALE as f64
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = CURRENCY_SCALE as u64;
        write!(f, "{}{}.{:04}", sign, abs / scale, abs % scale)
    }
}

/// Smallest representable date: January 1, 100.
pub const MIN_DATE: f64 = -657_434.0;

/// Largest representable date: December 31, 9999, one tick before midnight.
pub const MAX_DATE: f64 = 2_958_465.999_999_99;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// An automation date: whole days since 1899-12-30 plus the time of day as
/// a fraction of a day.
///
/// For negative values the fraction still counts forward from midnight, so
/// `-1.25` is 1899-12-29 06:00.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Date(pub f64);

impl Date {
    /// One hour as a fraction of a day
    pub const HOUR: f64 = 1.0 / 24.0;
    /// One minute as a fraction of a day
    pub const MINUTE: f64 = 1.0 / (24.0 * 60.0);
    /// One second as a fraction of a day
    pub const SECOND: f64 = 1.0 / (24.0 * 60.0 * 60.0);

    /// The epoch, 1899-12-30 00:00:00.
    pub fn epoch() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1899, 12, 30)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default()
    }

    /// The raw day offset
    pub fn days(self) -> f64 {
        self.0
    }

    /// Check the value is inside the representable range
    pub fn is_valid(self) -> bool {
        self.0.is_finite() && (MIN_DATE..=MAX_DATE).contains(&self.0)
    }

    /// Convert a calendar timestamp, rounded to the millisecond.
    pub fn from_datetime(dt: NaiveDateTime) -> Result<Self, ConversionError> {
        let millis = dt.signed_duration_since(Self::epoch()).num_milliseconds();
        let days = millis.div_euclid(MILLIS_PER_DAY);
        let fraction = millis.rem_euclid(MILLIS_PER_DAY) as f64 / MILLIS_PER_DAY as f64;
        let value = if days >= 0 {
            days as f64 + fraction
        } else {
            days as f64 - fraction
        };
        let date = Date(value);
        if date.is_valid() {
            Ok(date)
        } else {
            Err(ConversionError::DateOutOfRange { value })
        }
    }

    /// Convert to a calendar timestamp, rounded to the millisecond.
    pub fn to_datetime(self) -> Result<NaiveDateTime, ConversionError> {
        if !self.is_valid() {
            return Err(ConversionError::DateOutOfRange { value: self.0 });
        }
        let days = self.0.trunc();
        let fraction = (self.0 - days).abs();
        let millis = days as i64 * MILLIS_PER_DAY + (fraction * MILLIS_PER_DAY as f64).round() as i64;
        TimeDelta::try_milliseconds(millis)
            .and_then(|delta| Self::epoch().checked_add_signed(delta))
            .ok_or(ConversionError::DateOutOfRange { value: self.0 })
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Ok(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            Err(_) => write!(f, "<invalid date {}>", self.0),
        }
    }
}

impl TryFrom<NaiveDateTime> for Date {
    type Error = ConversionError;

    fn try_from(dt: NaiveDateTime) -> Result<Self, Self::Error> {
        Date::from_datetime(dt)
    }
}

/// A status code carried as a value (the error tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

/// The "parameter omitted" marker used for optional arguments.
pub const PARAM_NOT_FOUND: ErrorCode = ErrorCode(0x8002_0004);

/// The native counterpart of the empty tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Empty;

/// Pass a value by reference: the callee receives the address of a slot
/// holding `T` and may overwrite it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ByRef<T>(pub T);

/// Pass a whole tagged value by reference (the nested variant form).
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRef(pub Value);

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_currency_display() {
        assert_eq!(Currency(52_500).to_string(), "5.2500");
        assert_eq!(Currency(-1).to_string(), "-0.0001");
        assert_eq!(Currency::new(-3, 5000).to_string(), "-3.5000");
    }

    #[test]
    fn test_currency_out_of_range_saturates() {
        assert_eq!(Currency::checked_new(i64::MAX, 0), None);
        assert_eq!(Currency::checked_new(i64::MIN / CURRENCY_SCALE, 9_999), None);
        assert_eq!(Currency::new(i64::MAX, 1), Currency(i64::MAX));
        assert_eq!(Currency::new(i64::MIN, 1), Currency(i64::MIN));
        let largest = i64::MAX / CURRENCY_SCALE;
        assert_eq!(
            Currency::checked_new(largest, 5_807),
            Some(Currency(i64::MAX))
        );
        assert_eq!(Currency::checked_new(largest, 5_808), None);
    }

    #[test]
    fn test_currency_from_f64() {
        assert_eq!(Currency::from_f64(5.25), Currency(52_500));
        assert_eq!(Currency::from_f64(-1.5), Currency(-15_000));
        assert_eq!(Currency(52_500).to_f64(), 5.25);
    }

    #[test]
    fn test_date_epoch_is_zero() {
        assert_eq!(Date::from_datetime(dt(1899, 12, 30, 0, 0, 0)).unwrap(), Date(0.0));
    }

    #[test]
    fn test_date_fraction_is_time_of_day() {
        let date = Date::from_datetime(dt(1900, 1, 1, 6, 0, 0)).unwrap();
        assert_eq!(date, Date(2.25));
        assert_eq!(date.to_datetime().unwrap(), dt(1900, 1, 1, 6, 0, 0));
    }

    #[test]
    fn test_negative_date_keeps_positive_fraction() {
        let date = Date::from_datetime(dt(1899, 12, 29, 6, 0, 0)).unwrap();
        assert_eq!(date, Date(-1.25));
        assert_eq!(Date(-1.25).to_datetime().unwrap(), dt(1899, 12, 29, 6, 0, 0));
    }

    #[test]
    fn test_date_round_trip_seconds() {
        let original = dt(2024, 2, 29, 23, 59, 59);
        let date = Date::from_datetime(original).unwrap();
        assert_eq!(date.to_datetime().unwrap(), original);
    }

    #[test]
    fn test_date_out_of_range() {
        assert!(Date(MAX_DATE + 1.0).to_datetime().is_err());
        assert!(Date(f64::NAN).to_datetime().is_err());
        assert!(Date::from_datetime(dt(50, 1, 1, 0, 0, 0)).is_err());
    }
}
