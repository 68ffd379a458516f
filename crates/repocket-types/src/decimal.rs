//! Exact decimal numbers.
//!
//! [`Decimal`] keeps the value as canonical decimal text, so persisting and
//! reloading never goes through binary floating point. Canonical form has no
//! leading `+`, no redundant leading zeros, no trailing fractional zeros, no
//! exponent, and renders negative zero as `0`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Largest exponent accepted when expanding scientific notation.
const MAX_EXPONENT: i64 = 1024;

/// An exact decimal number in canonical text form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Decimal {
    negative: bool,
    /// Integer digits without leading zeros (`"0"` when zero).
    int: String,
    /// Fractional digits without trailing zeros (may be empty).
    frac: String,
}

impl Decimal {
    pub fn zero() -> Self {
        Self {
            negative: false,
            int: "0".into(),
            frac: String::new(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.int == "0" && self.frac.is_empty()
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Parse decimal text such as `"-12.50"`, `"+3"`, `".5"` or `"1.2e3"`.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidDecimal(text.to_string());
        let s = text.trim();

        let (negative, s) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        let (mantissa, exponent) = match s.find(['e', 'E']) {
            Some(pos) => {
                let exp: i64 = s[pos + 1..].parse().map_err(|_| invalid())?;
                if exp.abs() > MAX_EXPONENT {
                    return Err(invalid());
                }
                (&s[..pos], exp)
            }
            None => (s, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(invalid());
        }

        // Shift the decimal point by the exponent over the combined digits.
        let digits: String = [int_part, frac_part].concat();
        let point = int_part.len() as i64 + exponent;
        let (int, frac) = if point <= 0 {
            let zeros = "0".repeat((-point) as usize);
            (String::new(), format!("{zeros}{digits}"))
        } else if point as usize >= digits.len() {
            let zeros = "0".repeat(point as usize - digits.len());
            (format!("{digits}{zeros}"), String::new())
        } else {
            let (i, f) = digits.split_at(point as usize);
            (i.to_string(), f.to_string())
        };

        Ok(Self::from_parts(negative, &int, &frac))
    }

    fn from_parts(negative: bool, int: &str, frac: &str) -> Self {
        let int = int.trim_start_matches('0');
        let frac = frac.trim_end_matches('0');
        let int = if int.is_empty() { "0" } else { int };
        let zero = int == "0" && frac.is_empty();
        Self {
            negative: negative && !zero,
            int: int.to_string(),
            frac: frac.to_string(),
        }
    }

    /// Closest `f64` to this value.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Integer part, truncated toward zero. `None` on overflow.
    pub fn trunc_i64(&self) -> Option<i64> {
        let magnitude: i128 = self.int.parse().ok()?;
        let value = if self.negative { -magnitude } else { magnitude };
        i64::try_from(value).ok()
    }

    /// Convert a finite float using its shortest round-trip representation.
    pub fn from_f64(value: f64) -> Result<Self, TypeError> {
        if !value.is_finite() {
            return Err(TypeError::InvalidDecimal(value.to_string()));
        }
        Self::parse(&value.to_string())
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::from_parts(value < 0, &value.unsigned_abs().to_string(), "")
    }
}

impl FromStr for Decimal {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Decimal {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Decimal> for String {
    fn from(value: Decimal) -> Self {
        value.to_string()
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let magnitude = |d: &Decimal| (d.int.len(), d.int.clone(), d.frac.clone());
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => magnitude(self).cmp(&magnitude(other)),
            (true, true) => magnitude(other).cmp(&magnitude(self)),
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str(&self.int)?;
        if !self.frac.is_empty() {
            write!(f, ".{}", self.frac)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({self})")
    }
}
