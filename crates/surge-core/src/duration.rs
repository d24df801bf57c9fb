//! Human-readable duration strings for traffic plans
//!
//! Plans express time the way operators write it: `"30s"`, `"5m"`, `"3m30s"`,
//! `"250ms"`, `"1h"`. This module parses and formats that syntax and plugs
//! into serde via `#[serde(with = "surge_core::duration")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

use crate::error::{Result, SurgeError};

/// Parse a duration string such as `"3m30s"` into a [`Duration`].
///
/// Accepted units, largest to smallest: `h`, `m`, `s`, `ms`. Units may be
/// chained but must appear at most once each and in descending order.
/// A bare `"0"` is accepted as zero.
pub fn parse(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(SurgeError::InvalidDuration(input.to_string()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    // unit ranks, descending; each unit may appear once
    const UNITS: &[(&str, u64)] = &[("h", 3_600_000), ("m", 60_000), ("s", 1_000), ("ms", 1)];

    let mut total_ms: u64 = 0;
    // units must appear in strictly descending order, once each
    let mut next_min_rank = 0usize;
    let mut rest = s;

    while !rest.is_empty() {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(SurgeError::InvalidDuration(input.to_string()));
        }
        rest = &rest[digits.len()..];

        // "m" must not swallow the "m" of "ms"
        let unit = if rest.starts_with("ms") {
            "ms"
        } else if let Some(c) = rest.chars().next() {
            match c {
                'h' | 'm' | 's' => &rest[..1],
                _ => return Err(SurgeError::InvalidDuration(input.to_string())),
            }
        } else {
            return Err(SurgeError::InvalidDuration(input.to_string()));
        };
        rest = &rest[unit.len()..];

        let rank = UNITS
            .iter()
            .position(|(u, _)| *u == unit)
            .ok_or_else(|| SurgeError::InvalidDuration(input.to_string()))?;
        if rank < next_min_rank {
            return Err(SurgeError::InvalidDuration(input.to_string()));
        }

        let value: u64 = digits
            .parse()
            .map_err(|_| SurgeError::InvalidDuration(input.to_string()))?;
        total_ms = total_ms
            .checked_add(value.checked_mul(UNITS[rank].1).ok_or_else(|| {
                SurgeError::InvalidDuration(input.to_string())
            })?)
            .ok_or_else(|| SurgeError::InvalidDuration(input.to_string()))?;
        next_min_rank = rank + 1;
    }

    Ok(Duration::from_millis(total_ms))
}

/// Format a [`Duration`] back into plan syntax (`"3m30s"`).
pub fn format(d: Duration) -> String {
    let mut ms = d.as_millis() as u64;
    if ms == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, unit_ms) in [("h", 3_600_000u64), ("m", 60_000), ("s", 1_000), ("ms", 1)] {
        let n = ms / unit_ms;
        if n > 0 {
            out.push_str(&n.to_string());
            out.push_str(unit);
            ms -= n * unit_ms;
        }
    }
    out
}

/// serde glue: serialize a [`Duration`] as plan syntax
pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*d))
}

/// serde glue: deserialize a [`Duration`] from plan syntax
pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}
