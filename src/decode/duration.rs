//! Human-friendly durations: `"1h30m"`, `"250ms"`, `"1.5h"`, `"7d"`.
//!
//! Accepts a sequence of `<number><unit>` terms. Units: `ns`, `us`/`µs`,
//! `ms`, `s`, `m`, `h`, `d`. A bare number is a count of seconds.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", NANOS_PER_SEC),
    ("m", 60 * NANOS_PER_SEC),
    ("h", 3_600 * NANOS_PER_SEC),
    ("d", 86_400 * NANOS_PER_SEC),
];

pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }
    if s.starts_with('-') {
        return Err(format!("negative duration '{input}'"));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    let invalid = || format!("invalid duration '{input}'");

    if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return to_duration(scaled(s, NANOS_PER_SEC).ok_or_else(invalid)?, input);
    }

    let mut total: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{input}'"))?;
        if num_len == 0 {
            return Err(invalid());
        }
        let number = &rest[..num_len];
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| format!("unknown unit '{unit}' in duration '{input}'"))?;
        total = scaled(number, scale)
            .and_then(|n| total.checked_add(n))
            .ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }
    to_duration(total, input)
}

/// `number * scale` in nanoseconds, with any fraction truncated at 1ns.
fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;
    let mut place = scale;
    for digit in frac.chars() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos += u128::from(digit.to_digit(10)?) * place;
    }
    Some(nanos)
}

fn to_duration(nanos: u128, input: &str) -> Result<Duration, String> {
    let secs = u64::try_from(nanos / NANOS_PER_SEC)
        .map_err(|_| format!("duration '{input}' out of range"))?;
    Ok(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}

/// Render the way [`parse_duration`] reads it back, e.g. `1h0m0s`, `1m30s`,
/// `250ms`, `0s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let nanos = d.subsec_nanos();

    if secs == 0 {
        return match nanos {
            0 => "0s".into(),
            n if n % 1_000_000 == 0 => format!("{}ms", n / 1_000_000),
            n if n % 1_000 == 0 => format!("{}us", n / 1_000),
            n => format!("{n}ns"),
        };
    }

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&(secs % 60).to_string());
    if nanos > 0 {
        let frac = format!("{nanos:09}");
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('s');
    out
}
