//! Resource quantities (`500m`, `16Gi`, `1.5k`, `2e3`).
//!
//! Quantities are compared numerically: `1k == 1000` and `1Ki > 1k`. The
//! canonical value is kept in nano-units; anything finer is rounded up.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ApiError, ApiResult};

const NANO_EXPONENT: i32 = 9;
const MAX_FRACTION_DIGITS: usize = 18;

/// A parsed resource quantity.
#[derive(Debug, Clone)]
pub struct Quantity {
    nanos: i128,
    text: String,
}

impl Quantity {
    /// Parse a quantity string.
    pub fn parse(text: &str) -> ApiResult<Self> {
        let nanos = parse_nanos(text).map_err(|reason| ApiError::InvalidQuantity {
            value: text.to_string(),
            reason,
        })?;
        Ok(Self {
            nanos,
            text: text.trim().to_string(),
        })
    }

    /// The zero quantity, used as the default for absent attributes.
    pub fn zero() -> Self {
        Self {
            nanos: 0,
            text: "0".to_string(),
        }
    }

    pub fn from_int(value: i64) -> Self {
        Self {
            nanos: i128::from(value) * 10i128.pow(NANO_EXPONENT as u32),
            text: value.to_string(),
        }
    }

    /// Value in nano-units.
    pub fn as_nanos(&self) -> i128 {
        self.nanos
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    /// The text the quantity was parsed from.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

fn parse_nanos(text: &str) -> Result<i128, String> {
    let s = text.trim();
    if s.is_empty() {
        return Err("empty quantity".to_string());
    }

    let (negative, rest) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let number_end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_end);
    if number.is_empty() || number == "." {
        return Err("missing numeric part".to_string());
    }

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if frac_part.contains('.') {
        return Err("more than one decimal point".to_string());
    }
    if frac_part.len() > MAX_FRACTION_DIGITS {
        return Err(format!(
            "more than {MAX_FRACTION_DIGITS} fractional digits"
        ));
    }

    let digits = format!("{int_part}{frac_part}");
    let mantissa: i128 = digits
        .parse()
        .map_err(|_| "numeric part out of range".to_string())?;

    let (exp10, exp2) = suffix_scale(suffix)?;
    let out_of_range = || "quantity out of range".to_string();

    let mut value = mantissa
        .checked_mul(1i128 << exp2)
        .ok_or_else(out_of_range)?;
    let shift = exp10 + NANO_EXPONENT - frac_part.len() as i32;
    if shift >= 0 {
        let factor = 10i128.checked_pow(shift as u32).ok_or_else(out_of_range)?;
        value = value.checked_mul(factor).ok_or_else(out_of_range)?;
    } else {
        let divisor = 10i128
            .checked_pow((-shift) as u32)
            .ok_or_else(out_of_range)?;
        // Sub-nano precision rounds up.
        value = value / divisor + i128::from(value % divisor != 0);
    }

    Ok(if negative { -value } else { value })
}

/// (decimal exponent, binary exponent) for a suffix.
fn suffix_scale(suffix: &str) -> Result<(i32, u32), String> {
    let scale = match suffix {
        "" => (0, 0),
        "n" => (-9, 0),
        "u" => (-6, 0),
        "m" => (-3, 0),
        "k" => (3, 0),
        "M" => (6, 0),
        "G" => (9, 0),
        "T" => (12, 0),
        "P" => (15, 0),
        "E" => (18, 0),
        "Ki" => (0, 10),
        "Mi" => (0, 20),
        "Gi" => (0, 30),
        "Ti" => (0, 40),
        "Pi" => (0, 50),
        "Ei" => (0, 60),
        s if s.starts_with('e') || s.starts_with('E') => {
            let exp: i32 = s[1..]
                .parse()
                .map_err(|_| format!("invalid exponent {s:?}"))?;
            if exp.unsigned_abs() > 30 {
                return Err(format!("exponent {exp} out of range"));
            }
            (exp, 0)
        }
        other => return Err(format!("unknown suffix {other:?}")),
    };
    Ok(scale)
}

impl FromStr for Quantity {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nanos.hash(state);
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuantityVisitor;

        impl Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a quantity string such as \"16Gi\" or an integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
                Quantity::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
                Ok(Quantity::from_int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
                i64::try_from(v)
                    .map(Quantity::from_int)
                    .map_err(|_| E::custom("quantity out of range"))
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}
