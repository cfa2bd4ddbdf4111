//! Decisions as handed over by the decision feed, and address families.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::Display;

/// Address family a decision or table is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Ipv4,
    Ipv6,
}

impl Family {
    /// Classifies an address by syntax alone: anything containing `:` is IPv6.
    pub fn of(value: &str) -> Self {
        if value.contains(':') {
            Family::Ipv6
        } else {
            Family::Ipv4
        }
    }
}

/// A ban directive for one address or range.
///
/// Only `value` reaches the firewall; `duration` and `scenario` feed the
/// log lines emitted for each applied decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub value: String,
    pub duration: String,
    pub scenario: String,
}

impl Decision {
    pub fn new(
        value: impl Into<String>,
        duration: impl Into<String>,
        scenario: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            duration: duration.into(),
            scenario: scenario.into(),
        }
    }

    pub fn family(&self) -> Family {
        Family::of(&self.value)
    }

    /// Parses the decision duration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDuration` when the string is not a duration.
    pub fn ban_duration(&self) -> Result<BanDuration> {
        BanDuration::parse(&self.duration)
    }
}

/// Remaining ban time. Expired decisions arrive with a negative duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanDuration {
    pub negative: bool,
    pub magnitude: Duration,
}

impl BanDuration {
    /// Parses feed durations such as `4h`, `1h30m` or `-3h59m58.958245327s`.
    ///
    /// Fractional parts are truncated to whole units before parsing; the
    /// value is only ever reported in whole seconds.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidDuration {
            value: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        if body.is_empty() {
            return Err(invalid("empty duration".to_string()));
        }

        let magnitude = humantime::parse_duration(&truncate_fractions(body))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            negative,
            magnitude,
        })
    }

    /// Signed whole seconds, as written into ban/unban log lines.
    pub fn as_secs(&self) -> i64 {
        let secs = i64::try_from(self.magnitude.as_secs()).unwrap_or(i64::MAX);
        if self.negative { -secs } else { secs }
    }
}

/// Drops the `.digits` part of every numeric component (`58.95s` -> `58s`).
fn truncate_fractions(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_fraction = false;
    for c in input.chars() {
        if in_fraction {
            if c.is_ascii_digit() {
                continue;
            }
            in_fraction = false;
        }
        if c == '.' {
            in_fraction = true;
            continue;
        }
        out.push(c);
    }
    out
}
