//! Dotted numeric version newtype.
//!
//! Versions are parsed once into integer segments so comparisons never
//! re-read the original text. A shorter version compares as though it were
//! padded with trailing zero segments, which makes `2` and `2.0` equal.

use super::error::{Result, ValidationError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A validated, totally ordered version such as `1.0` or `2.0.1`.
///
/// # Examples
///
/// ```
/// use selfupdate::package::version::Version;
///
/// let old: Version = "1.9".parse().expect("valid version");
/// let new: Version = "2.0".parse().expect("valid version");
/// assert!(old < new);
/// assert_eq!(new, "2".parse::<Version>().expect("valid version"));
/// ```
#[derive(Debug, Clone)]
pub struct Version {
    text: String,
    segments: Vec<u64>,
}

impl Version {
    /// Return the version exactly as it was written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Return the numeric segments.
    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Segments with trailing zeros removed; equal versions share this form.
    fn significant(&self) -> &[u64] {
        let len = self
            .segments
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |index| index + 1);
        self.segments.get(..len).unwrap_or_default()
    }
}

impl FromStr for Version {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(invalid(value, "version is empty"));
        }
        let segments = trimmed
            .split('.')
            .map(|segment| parse_segment(value, segment))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            text: trimmed.to_owned(),
            segments,
        })
    }
}

impl TryFrom<&str> for Version {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

fn parse_segment(version: &str, segment: &str) -> Result<u64> {
    if segment.is_empty() {
        return Err(invalid(version, "empty segment"));
    }
    if let Some(bad) = segment.chars().find(|c| !c.is_ascii_digit()) {
        return Err(invalid(version, &format!("non-numeric character '{bad}'")));
    }
    segment
        .parse::<u64>()
        .map_err(|_| invalid(version, "segment out of range"))
}

fn invalid(value: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidVersion {
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.segments.len().max(other.segments.len());
        (0..width)
            .map(|index| {
                let left = self.segments.get(index).copied().unwrap_or(0);
                let right = other.segments.get(index).copied().unwrap_or(0);
                left.cmp(&right)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = super::scalar::ScalarText::deserialize(deserializer)?;
        text.as_str().parse().map_err(serde::de::Error::custom)
    }
}
