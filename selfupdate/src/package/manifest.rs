//! Manifest model: available versions and the policies choosing among them.
//!
//! A [`Manifest`] is immutable once built and only exists in validated
//! form. Every rule that could fail at resolution time is checked here
//! instead, so [`resolve`](super::policy::resolve) is infallible.

use super::error::{Result, ValidationError};
use super::package_info::{PackageInfo, RawPackageInfo, validate_package_name};
use super::policy::{Policy, validate_policies};
use super::scalar::ScalarText;
use super::version::Version;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Version entries in document order, duplicates preserved for validation.
#[derive(Debug, Clone, Default)]
pub struct RawVersions(pub Vec<(String, RawPackageInfo)>);

impl<'de> Deserialize<'de> for RawVersions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawVersions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of version to package info")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) =
                    access.next_entry::<ScalarText, RawPackageInfo>()?
                {
                    entries.push((key.into_inner(), value));
                }
                Ok(RawVersions(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// An unvalidated manifest document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    /// Package name.
    pub package: String,
    /// Version key to package fields, in document order.
    pub versions: RawVersions,
    /// Policies in precedence order.
    #[serde(default)]
    pub policies: Vec<Policy>,
}

/// A validated manifest.
///
/// # Examples
///
/// ```
/// use selfupdate::package::manifest_parser::{DocumentFormat, parse_manifest};
///
/// let json = concat!(
///     r#"{"package":"example","versions":{"2.0":{"#,
///     r#""url":"http://localhost:8080/example.zip","size":10,"format":"zip","#,
///     r#""hash":{"md5":"d41d8cd98f00b204e9800998ecf8427e"}}},"#,
///     r#""policies":[{"matches":["[,2.0)"],"target":"2.0"}]}"#,
/// );
/// let manifest = parse_manifest(json, DocumentFormat::Json).expect("valid manifest");
/// assert_eq!(manifest.package_name(), "example");
/// assert_eq!(manifest.policies().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    package_name: String,
    versions: BTreeMap<Version, PackageInfo>,
    policies: Vec<Policy>,
}

impl Manifest {
    /// Validate a raw document into a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found: a package name unfit for
    /// a file name, a malformed or duplicate version key, a per-version rule violation, an empty policy, or a
    /// policy targeting an undeclared version.
    pub fn from_raw(raw: RawManifest) -> Result<Self> {
        validate_package_name(&raw.package)?;
        let mut versions = BTreeMap::new();
        for (key, raw_info) in raw.versions.0 {
            let version: Version = key.parse()?;
            if versions.contains_key(&version) {
                return Err(ValidationError::DuplicateVersion { version: key });
            }
            let info = PackageInfo::from_raw(&raw.package, version.clone(), raw_info)?;
            versions.insert(version, info);
        }
        validate_policies(&raw.policies, |target| versions.contains_key(target))?;
        Ok(Self {
            package_name: raw.package,
            versions,
            policies: raw.policies,
        })
    }

    /// Return the package name.
    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Return all declared versions, ascending.
    #[must_use]
    pub fn versions(&self) -> &BTreeMap<Version, PackageInfo> {
        &self.versions
    }

    /// Return the package info declared for `version`.
    #[must_use]
    pub fn package(&self, version: &Version) -> Option<&PackageInfo> {
        self.versions.get(version)
    }

    /// Return the policies in precedence order.
    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Return the highest declared version.
    #[must_use]
    pub fn latest(&self) -> Option<&Version> {
        self.versions.keys().next_back()
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
