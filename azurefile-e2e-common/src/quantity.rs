//! Kubernetes resource quantity parsing
//!
//! Accepts the quantity grammar the API server accepts: an optional `+`, a
//! decimal number with an optional fraction, then a binary suffix (Ki..Ei), a
//! decimal suffix (n, u, m, k..E) or a decimal exponent (`e3`, `E-2`).
//! Values are reported in whole units, rounded up like the API server does.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity '{0}'")]
    Invalid(String),

    #[error("quantity '{0}' overflows")]
    Overflow(String),
}

/// Scale applied to the numeric part, as numerator / denominator
struct Scale {
    numerator: u128,
    denominator: u128,
}

impl Scale {
    fn times(numerator: u128) -> Self {
        Scale {
            numerator,
            denominator: 1,
        }
    }

    fn divided_by(denominator: u128) -> Self {
        Scale {
            numerator: 1,
            denominator,
        }
    }
}

/// Parse a quantity such as `10Gi` or `1.5Gi` into bytes
pub fn parse_quantity(value: &str) -> Result<u128, QuantityError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(QuantityError::Empty);
    }
    let invalid = || QuantityError::Invalid(value.to_string());
    let overflow = || QuantityError::Overflow(value.to_string());

    let unsigned = value.strip_prefix('+').unwrap_or(value);

    let number_end = unsigned
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.contains('.') {
        return Err(invalid());
    }

    let digits = format!("{}{}", whole, fraction);
    let mantissa: u128 = digits.parse().map_err(|_| overflow())?;
    let fraction_scale = pow10(fraction.len()).ok_or_else(overflow)?;

    let scale = parse_suffix(suffix).ok_or_else(invalid)?.ok_or_else(overflow)?;

    let numerator = mantissa.checked_mul(scale.numerator).ok_or_else(overflow)?;
    let denominator = fraction_scale
        .checked_mul(scale.denominator)
        .ok_or_else(overflow)?;

    Ok(numerator.div_ceil(denominator))
}

/// `None` when the suffix is not part of the grammar, `Some(None)` when the
/// scale it names does not fit
fn parse_suffix(suffix: &str) -> Option<Option<Scale>> {
    let scale = match suffix {
        "" => Scale::times(1),
        "Ki" => Scale::times(1 << 10),
        "Mi" => Scale::times(1 << 20),
        "Gi" => Scale::times(1 << 30),
        "Ti" => Scale::times(1 << 40),
        "Pi" => Scale::times(1 << 50),
        "Ei" => Scale::times(1 << 60),
        "n" => Scale::divided_by(1_000_000_000),
        "u" => Scale::divided_by(1_000_000),
        "m" => Scale::divided_by(1_000),
        "k" => Scale::times(1_000),
        "M" => Scale::times(1_000_000),
        "G" => Scale::times(1_000_000_000),
        "T" => Scale::times(1_000_000_000_000),
        "P" => Scale::times(1_000_000_000_000_000),
        "E" => Scale::times(1_000_000_000_000_000_000),
        _ => return parse_exponent(suffix),
    };

    Some(Some(scale))
}

fn parse_exponent(suffix: &str) -> Option<Option<Scale>> {
    let exponent = suffix.strip_prefix(['e', 'E'])?;
    let (negative, digits) = match exponent.as_bytes().first().copied()? {
        b'-' => (true, &exponent[1..]),
        b'+' => (false, &exponent[1..]),
        _ => (false, exponent),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let power = digits.parse::<usize>().ok().and_then(pow10);
    Some(power.map(|power| {
        if negative {
            Scale::divided_by(power)
        } else {
            Scale::times(power)
        }
    }))
}

fn pow10(exponent: usize) -> Option<u128> {
    10u128.checked_pow(u32::try_from(exponent).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_and_decimal_suffixes() {
        assert_eq!(parse_quantity("10Gi"), Ok(10 * 1024 * 1024 * 1024));
        assert_eq!(parse_quantity("10737418240"), parse_quantity("10Gi"));
        assert_eq!(parse_quantity("100k"), Ok(100_000));
        assert_eq!(parse_quantity("1Ti"), Ok(1 << 40));
        assert_eq!(parse_quantity("+5G"), Ok(5_000_000_000));
    }

    #[test]
    fn test_fractions() {
        assert_eq!(parse_quantity("1.5Gi"), parse_quantity("1536Mi"));
        assert_eq!(parse_quantity("0.5Ki"), Ok(512));
        assert_eq!(parse_quantity(".5k"), Ok(500));
        assert_eq!(parse_quantity("2."), Ok(2));
        assert_eq!(parse_quantity("1.5"), Ok(2));
    }

    #[test]
    fn test_exponents() {
        assert_eq!(parse_quantity("1e9"), Ok(1_000_000_000));
        assert_eq!(parse_quantity("1E3"), Ok(1_000));
        assert_eq!(parse_quantity("12e+2"), Ok(1_200));
        assert_eq!(parse_quantity("25e-1"), Ok(3));
    }

    #[test]
    fn test_sub_unit_suffixes_round_up() {
        assert_eq!(parse_quantity("500m"), Ok(1));
        assert_eq!(parse_quantity("2000m"), Ok(2));
        assert_eq!(parse_quantity("1000000000n"), Ok(1));
        assert_eq!(parse_quantity("0m"), Ok(0));
    }

    #[test]
    fn test_invalid_quantities() {
        assert_eq!(parse_quantity(""), Err(QuantityError::Empty));
        assert!(matches!(parse_quantity("Gi"), Err(QuantityError::Invalid(_))));
        assert!(matches!(parse_quantity("10Qi"), Err(QuantityError::Invalid(_))));
        assert!(matches!(parse_quantity("."), Err(QuantityError::Invalid(_))));
        assert!(matches!(parse_quantity("1.2.3"), Err(QuantityError::Invalid(_))));
        assert!(matches!(parse_quantity("-1Gi"), Err(QuantityError::Invalid(_))));
        assert!(matches!(parse_quantity("1e"), Err(QuantityError::Invalid(_))));
        assert!(matches!(parse_quantity("1e-"), Err(QuantityError::Invalid(_))));
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(parse_quantity("1e99"), Err(QuantityError::Overflow(_))));
    }
}
