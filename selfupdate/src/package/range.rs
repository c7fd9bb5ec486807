//! Version range expressions.
//!
//! The textual form is `[lower,upper)`: square brackets are inclusive,
//! parentheses exclusive, and either endpoint may be left empty to mean
//! unbounded. `[,2.0)` therefore reads "any version strictly below 2.0".
//! A bare version such as `1.5` is shorthand for `[1.5,1.5]`.

use super::error::{Result, ValidationError};
use super::version::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One endpoint of a [`RangeExpr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    /// No limit on this side.
    Unbounded,
    /// The endpoint is part of the range.
    Inclusive(Version),
    /// The endpoint is excluded from the range.
    Exclusive(Version),
}

impl Bound {
    fn version(&self) -> Option<&Version> {
        match self {
            Self::Unbounded => None,
            Self::Inclusive(version) | Self::Exclusive(version) => Some(version),
        }
    }
}

/// An interval over [`Version`] with independently inclusive, exclusive, or
/// unbounded endpoints.
///
/// # Examples
///
/// ```
/// use selfupdate::package::range::RangeExpr;
/// use selfupdate::package::version::Version;
///
/// let range: RangeExpr = "[,2.0)".parse().expect("valid range");
/// assert!(range.contains(&"1.9".parse::<Version>().expect("valid version")));
/// assert!(!range.contains(&"2.0".parse::<Version>().expect("valid version")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeExpr {
    lower: Bound,
    upper: Bound,
}

impl RangeExpr {
    /// Build a range from explicit bounds, rejecting empty intervals.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidRange`] when the lower endpoint
    /// exceeds the upper one, or when they coincide and either side is
    /// exclusive.
    pub fn new(lower: Bound, upper: Bound) -> Result<Self> {
        let range = Self { lower, upper };
        range.ensure_non_empty()?;
        Ok(range)
    }

    /// Return the lower bound.
    #[must_use]
    pub fn lower(&self) -> &Bound {
        &self.lower
    }

    /// Return the upper bound.
    #[must_use]
    pub fn upper(&self) -> &Bound {
        &self.upper
    }

    /// Return whether `version` lies inside the range.
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Inclusive(lo) => version >= lo,
            Bound::Exclusive(lo) => version > lo,
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Inclusive(hi) => version <= hi,
            Bound::Exclusive(hi) => version < hi,
        };
        above_lower && below_upper
    }

    fn ensure_non_empty(&self) -> Result<()> {
        let (Some(lo), Some(hi)) = (self.lower.version(), self.upper.version()) else {
            return Ok(());
        };
        let both_inclusive = matches!(
            (&self.lower, &self.upper),
            (Bound::Inclusive(_), Bound::Inclusive(_))
        );
        if lo > hi || (lo == hi && !both_inclusive) {
            return Err(ValidationError::InvalidRange {
                value: self.to_string(),
                reason: "range is empty".to_owned(),
            });
        }
        Ok(())
    }
}

impl FromStr for RangeExpr {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self> {
        let text = value.trim();
        let invalid = |reason: &str| ValidationError::InvalidRange {
            value: value.to_owned(),
            reason: reason.to_owned(),
        };

        if text.is_empty() {
            return Err(invalid("expression is empty"));
        }
        if !text.starts_with(['[', '(']) {
            let exact: Version = text.parse().map_err(|_| {
                invalid("expected '[' or '(' to open the range, or a bare version")
            })?;
            return Self::new(Bound::Inclusive(exact.clone()), Bound::Inclusive(exact));
        }

        let mut chars = text.chars();
        let (Some(open), Some(close)) = (chars.next(), chars.next_back()) else {
            return Err(invalid("expected ']' or ')' to close the range"));
        };
        if !matches!(close, ']' | ')') {
            return Err(invalid("expected ']' or ')' to close the range"));
        }

        let (lower_text, upper_text) = chars
            .as_str()
            .split_once(',')
            .ok_or_else(|| invalid("expected a ',' between the endpoints"))?;
        if upper_text.contains(',') {
            return Err(invalid("expected exactly one ',' between the endpoints"));
        }

        let lower = parse_bound(lower_text, open == '[', value)?;
        let upper = parse_bound(upper_text, close == ']', value)?;
        Self::new(lower, upper)
    }
}

fn parse_bound(text: &str, inclusive: bool, expression: &str) -> Result<Bound> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Bound::Unbounded);
    }
    let version: Version = text.parse().map_err(|err| ValidationError::InvalidRange {
        value: expression.to_owned(),
        reason: format!("{err}"),
    })?;
    Ok(if inclusive {
        Bound::Inclusive(version)
    } else {
        Bound::Exclusive(version)
    })
}

impl fmt::Display for RangeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Unbounded => f.write_str("[")?,
            Bound::Inclusive(v) => write!(f, "[{v}")?,
            Bound::Exclusive(v) => write!(f, "({v}")?,
        }
        f.write_str(",")?;
        match &self.upper {
            Bound::Unbounded => f.write_str(")"),
            Bound::Inclusive(v) => write!(f, "{v}]"),
            Bound::Exclusive(v) => write!(f, "{v})"),
        }
    }
}

impl Serialize for RangeExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RangeExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = super::scalar::ScalarText::deserialize(deserializer)?;
        text.as_str().parse().map_err(serde::de::Error::custom)
    }
}
