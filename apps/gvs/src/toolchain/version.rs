//! Go release version numbers.
//!
//! Go versions are dotted numbers with two or three components (`1.21`,
//! `1.21.0`). They are not semver and must be ordered numerically:
//! `1.10.1` is newer than `1.9.10`, which plain string comparison gets wrong.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::GvsError;

/// A parsed Go release version.
///
/// Parsing accepts an optional `go` or `v` prefix. Pre-release names such as
/// `1.22rc1` are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GoVersion {
    parts: Vec<u64>,
}

impl FromStr for GoVersion {
    type Err = GvsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GvsError::InvalidVersion {
            value: s.to_string(),
        };
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("go")
            .or_else(|| trimmed.strip_prefix('v'))
            .unwrap_or(trimmed);

        let parts = body
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                part.parse::<u64>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        if !(2..=3).contains(&parts.len()) {
            return Err(invalid());
        }
        Ok(Self { parts })
    }
}

impl Ord for GoVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.parts.len().max(other.parts.len());
        for i in 0..width {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        // `1.21` and `1.21.0` are distinct releases; the shorter one sorts first.
        self.parts.len().cmp(&other.parts.len())
    }
}

impl PartialOrd for GoVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for GoVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GoVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
