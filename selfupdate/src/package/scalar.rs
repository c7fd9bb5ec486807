//! Scalar-as-text deserialization.
//!
//! YAML manifests commonly write versions unquoted (`2.0:` or `target: 2.0`),
//! which YAML reads as numbers. This helper accepts strings and numbers
//! alike and hands back the text for the version parser.

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;

/// Text recovered from a string or numeric scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ScalarText(String);

impl ScalarText {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn into_inner(self) -> String {
        self.0
    }
}

struct ScalarTextVisitor;

impl Visitor<'_> for ScalarTextVisitor {
    type Value = ScalarText;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a version string or number")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(ScalarText(value.to_owned()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(ScalarText(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(ScalarText(value.to_string()))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(ScalarText(value.to_string()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        if !value.is_finite() {
            return Err(E::custom(format!("version {value} is not finite")));
        }
        // 2.0 renders as "2" through Display; keep the written form.
        if value.fract() == 0.0 {
            Ok(ScalarText(format!("{value:.1}")))
        } else {
            Ok(ScalarText(value.to_string()))
        }
    }
}

impl<'de> Deserialize<'de> for ScalarText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarTextVisitor)
    }
}
