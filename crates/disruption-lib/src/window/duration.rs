//! Duration strings in the `1h30m` / `2.5h` / `90m` style.
//!
//! A duration is an optionally signed sequence of decimal numbers, each with
//! an optional fraction and a mandatory unit: `ns`, `us` (or `µs`), `ms`, `s`,
//! `m`, `h`. A bare `0` is accepted.

use chrono::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a duration string, returning a human-readable reason on failure
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let mut s = input;
    let mut negative = false;

    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(Duration::zero());
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total: u128 = 0;
    while !s.is_empty() {
        // Integer part
        let int_len = s.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, rest) = s.split_at(int_len);
        s = rest;

        // Fraction
        let mut frac_digits = "";
        if let Some(rest) = s.strip_prefix('.') {
            let frac_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            frac_digits = &rest[..frac_len];
            s = &rest[frac_len..];
        }

        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(format!("invalid duration {input:?}"));
        }

        // Unit runs until the next digit or '.'
        let unit_len = s
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        let (unit, rest) = s.split_at(unit_len);
        s = rest;

        if unit.is_empty() {
            return Err(format!("missing unit in duration {input:?}"));
        }
        let scale = unit_nanos(unit).ok_or_else(|| format!("unknown unit {unit:?} in duration {input:?}"))?;

        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits
                .parse()
                .map_err(|_| format!("invalid duration {input:?}"))?
        };

        // Digits beyond nanosecond precision of an hour cannot contribute
        let frac_digits = &frac_digits[..frac_digits.len().min(18)];
        let fraction = if frac_digits.is_empty() {
            0
        } else {
            let numerator: u128 = frac_digits
                .parse()
                .map_err(|_| format!("invalid duration {input:?}"))?;
            numerator * scale / 10u128.pow(frac_digits.len() as u32)
        };

        total = whole
            .checked_mul(scale)
            .and_then(|v| v.checked_add(fraction))
            .and_then(|v| v.checked_add(total))
            .filter(|v| *v <= i64::MAX as u128)
            .ok_or_else(|| format!("invalid duration {input:?}"))?;
    }

    let nanos = total as i64;
    Ok(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}
