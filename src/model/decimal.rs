//! Exact arbitrary-precision decimals.
//!
//! Quantity amounts and bounds are compared for equality, never ordered or
//! rounded, so a decimal is kept as its digit string plus a scale. The
//! representation is normalized on construction: `1.50`, `+1.5` and `15e-1`
//! are the same value and hash identically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Largest accepted exponent magnitude in `1.5e3` forms. Keeps the digit
/// string bounded for hostile input.
pub const MAX_EXPONENT: i64 = 4096;

/// `digits * 10^-scale`, negated when `negative`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    negative: bool,
    /// ASCII digits without leading zeros; `"0"` for zero.
    digits: String,
    scale: u32,
}

impl Decimal {
    pub fn zero() -> Self {
        Self { negative: false, digits: "0".into(), scale: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.digits == "0"
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Number of digits after the decimal point in normalized form.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    fn normalized(negative: bool, mut digits: String, mut scale: u32) -> Self {
        while scale > 0 && digits.ends_with('0') {
            digits.pop();
            scale -= 1;
        }
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            return Self::zero();
        }
        Self { negative, digits: trimmed.to_string(), scale }
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Argument(format!("invalid decimal literal: {s:?}"));
        let text = s.trim();
        let (negative, rest) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match rest.find(['e', 'E']) {
            Some(i) => {
                let exp: i64 = rest[i + 1..].parse().map_err(|_| invalid())?;
                if !(-MAX_EXPONENT..=MAX_EXPONENT).contains(&exp) {
                    return Err(Error::Argument(format!("decimal exponent out of range: {s:?}")));
                }
                (&rest[..i], exp)
            }
            None => (rest, 0),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut digits = String::with_capacity(int_part.len() + frac_part.len());
        digits.push_str(int_part);
        digits.push_str(frac_part);
        let scale = i64::try_from(frac_part.len())
            .ok()
            .and_then(|len| len.checked_sub(exponent))
            .ok_or_else(invalid)?;
        if scale < 0 {
            let zeros = usize::try_from(-scale).map_err(|_| invalid())?;
            digits.extend(std::iter::repeat_n('0', zeros));
            Ok(Self::normalized(negative, digits, 0))
        } else {
            let scale = u32::try_from(scale).map_err(|_| invalid())?;
            Ok(Self::normalized(negative, digits, scale))
        }
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Self::normalized(v < 0, v.unsigned_abs().to_string(), 0)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}", self.digits);
        }
        let padded = if self.digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - self.digits.len()), self.digits)
        } else {
            self.digits.clone()
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{int_part}.{frac_part}")
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
