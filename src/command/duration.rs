//! Duration arguments
//!
//! Accepts the `<number><unit>` sequences used for TTLs: `300ms`, `1.5h`,
//! `2h45m`, `10s`. Units are `ns`, `us` (or `µs`/`μs`), `ms`, `s`, `m`
//! and `h`; a bare `0` is also accepted. Signs other than `+` are rejected
//! since a TTL cannot be negative.

use std::time::Duration;

use crate::error::{FlatError, Result};

const NANOS_PER_UNIT: [(&str, u128); 8] = [
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Largest representable duration, matching a signed 64-bit nanosecond count
const MAX_NANOS: u128 = i64::MAX as u128;

pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || FlatError::Argument(format!("invalid duration '{}'", input));

    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() || rest.starts_with('-') {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        let (frac_digits, after_num) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid());
        }

        // Longest match, so "ms" is never read as "m" followed by "s"
        let (unit, scale) = NANOS_PER_UNIT
            .iter()
            .filter(|(unit, _)| after_num.starts_with(unit))
            .max_by_key(|(unit, _)| unit.len())
            .ok_or_else(invalid)?;
        rest = &after_num[unit.len()..];

        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(*scale).ok_or_else(invalid)?;

        // Fractional part, truncated past nanosecond precision
        let mut place = *scale;
        for digit in frac_digits.bytes() {
            place /= 10;
            if place == 0 {
                break;
            }
            nanos += u128::from(digit - b'0') * place;
        }

        total = total.checked_add(nanos).ok_or_else(invalid)?;
        if total > MAX_NANOS {
            return Err(invalid());
        }
    }

    Ok(Duration::from_nanos(total as u64))
}
