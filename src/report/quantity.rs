use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Parsed quantity: `mantissa * 10^exponent * 1024^binary`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Parsed {
    mantissa: i128,
    exponent: i32,
    binary: u32,
}

/// Digits of a plain decimal number as an integer plus a power-of-ten exponent
fn parse_decimal(number: &str) -> Option<(i128, i32)> {
    let (negative, digits) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let mut mantissa: i128 = 0;
    for c in whole.chars().chain(fraction.chars()) {
        let digit = c.to_digit(10)?;
        mantissa = mantissa.checked_mul(10)?.checked_add(i128::from(digit))?;
    }
    let exponent = -i32::try_from(fraction.len()).ok()?;
    Some((if negative { -mantissa } else { mantissa }, exponent))
}

fn parse(raw: &str) -> Option<Parsed> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let (mantissa, exponent) = parse_decimal(number)?;

    let (scale, binary) = match suffix {
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
        "Ki" => (0, 1),
        "Mi" => (0, 2),
        "Gi" => (0, 3),
        "Ti" => (0, 4),
        "Pi" => (0, 5),
        "Ei" => (0, 6),
        _ => {
            let power = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            (power.parse().ok()?, 0)
        }
    };

    Some(Parsed {
        mantissa,
        exponent: exponent.checked_add(scale)?,
        binary,
    })
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// Quantity value multiplied by `10^shift`, rounded up and saturated to `i64`
fn scaled(raw: &str, shift: i32) -> Option<i64> {
    let parsed = parse(raw)?;
    let mut numerator = parsed.mantissa;
    for _ in 0..parsed.binary {
        numerator = numerator.saturating_mul(1024);
    }

    let exponent = parsed.exponent.saturating_add(shift);
    if exponent >= 0 {
        let factor = u32::try_from(exponent).ok().and_then(|e| 10_i128.checked_pow(e));
        return Some(match factor {
            Some(factor) => saturate(numerator.saturating_mul(factor)),
            None if numerator == 0 => 0,
            None => saturate(numerator.signum() * i128::MAX),
        });
    }

    let divisor = u32::try_from(-i64::from(exponent))
        .ok()
        .and_then(|e| 10_i128.checked_pow(e));
    Some(match divisor {
        Some(divisor) => {
            let quotient = numerator.div_euclid(divisor);
            saturate(if numerator.rem_euclid(divisor) == 0 {
                quotient
            } else {
                quotient + 1
            })
        }
        // Smaller than any representable unit
        None => i64::from(numerator > 0),
    })
}

/// Parse a Kubernetes quantity (`250m`, `1.5Gi`, `2e3`, ...) into its base
/// value, rounded up
#[must_use]
pub fn parse_quantity(raw: &str) -> Option<i64> {
    scaled(raw, 0)
}

/// Value in thousandths, rounded up
#[must_use]
pub fn milli_value(quantity: &Quantity) -> i64 {
    scaled(&quantity.0, 3).unwrap_or(0)
}

/// Whole value, rounded up
#[must_use]
pub fn value(quantity: &Quantity) -> i64 {
    scaled(&quantity.0, 0).unwrap_or(0)
}

/// Milli-cores of the `cpu` entry, 0 when absent
#[must_use]
pub fn cpu_millis(resources: Option<&BTreeMap<String, Quantity>>) -> i64 {
    resources
        .and_then(|r| r.get("cpu"))
        .map_or(0, milli_value)
}

/// Bytes of the `memory` entry, 0 when absent
#[must_use]
pub fn memory_bytes(resources: Option<&BTreeMap<String, Quantity>>) -> i64 {
    resources.and_then(|r| r.get("memory")).map_or(0, value)
}
