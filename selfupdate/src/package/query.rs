//! Server query documents.
//!
//! A server that resolves policies on behalf of its clients answers a query
//! for `/<package>/<current-version>` with a flat [`QueryResponse`]. The
//! same type parses that answer on the client into an [`UpdatePlan`],
//! applying the validation rules a manifest entry would go through.

use super::error::{Result, ValidationError};
use super::manifest::Manifest;
use super::package_info::{PackageInfo, RawPackageInfo};
use super::policy::UpdateDecision;
use super::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resolved update: the package to install and whether it is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    package: PackageInfo,
    force_update: bool,
}

impl UpdatePlan {
    /// Build a plan for `package`.
    #[must_use]
    pub fn new(package: PackageInfo, force_update: bool) -> Self {
        Self {
            package,
            force_update,
        }
    }

    /// Look up the package a decision targets.
    ///
    /// Returns `None` when the decision is up to date. Manifest validation
    /// guarantees every policy target is declared, so a targeted version is
    /// always present.
    #[must_use]
    pub fn from_decision(manifest: &Manifest, decision: &UpdateDecision) -> Option<Self> {
        let target = decision.target()?;
        let package = manifest.package(target)?;
        Some(Self::new(package.clone(), decision.force_update()))
    }

    /// Return the package to install.
    #[must_use]
    pub fn package(&self) -> &PackageInfo {
        &self.package
    }

    /// Return the version being installed.
    #[must_use]
    pub fn version(&self) -> &Version {
        self.package.version()
    }

    /// Return whether the update is mandatory.
    #[must_use]
    pub fn force_update(&self) -> bool {
        self.force_update
    }
}

/// The document a server returns for a version query.
///
/// # Examples
///
/// ```
/// use selfupdate::package::query::QueryResponse;
///
/// let json = r#"{"package_name":"example","has_new_version":false}"#;
/// let plan = QueryResponse::parse(json).expect("valid response");
/// assert!(plan.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Package name.
    pub package_name: String,
    /// Whether a different version should be installed.
    pub has_new_version: bool,
    /// Whether the update is mandatory.
    #[serde(default)]
    pub force_update: bool,
    /// Target version text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    /// Retrieval URL of the target package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_url: Option<String>,
    /// Byte length of the target package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_size: Option<u64>,
    /// Packing format of the target package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_format: Option<String>,
    /// Algorithm name to hex digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_hash: Option<BTreeMap<String, String>>,
    /// Short human-readable update title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_title: Option<String>,
    /// Longer human-readable update description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_description: Option<String>,
}

impl QueryResponse {
    /// Render the answer a server gives for `decision`.
    #[must_use]
    pub fn from_decision(manifest: &Manifest, decision: &UpdateDecision) -> Self {
        let Some(plan) = UpdatePlan::from_decision(manifest, decision) else {
            return Self {
                package_name: manifest.package_name().to_owned(),
                ..Self::default()
            };
        };
        let package = plan.package();
        Self {
            package_name: manifest.package_name().to_owned(),
            has_new_version: true,
            force_update: plan.force_update(),
            package_version: Some(package.version().to_string()),
            package_url: Some(package.url().to_owned()),
            package_size: Some(package.size()),
            package_format: Some(package.format().to_string()),
            package_hash: Some(
                package
                    .hashes()
                    .iter()
                    .map(|(algorithm, digest)| (algorithm.to_string(), digest.to_string()))
                    .collect(),
            ),
            update_title: Some(package.title().to_owned()),
            update_description: Some(package.description().to_owned()),
        }
    }

    /// Serialise the response as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Document`] if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| ValidationError::Document {
            reason: err.to_string(),
        })
    }

    /// Parse and validate a query response.
    ///
    /// Returns `Ok(None)` when the server reports no new version.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Document`] for malformed JSON or a missing
    /// field, and the per-version [`ValidationError`]s a manifest entry
    /// would raise for the package fields.
    pub fn parse(json: &str) -> Result<Option<UpdatePlan>> {
        let response: Self =
            serde_json::from_str(json).map_err(|err| ValidationError::Document {
                reason: err.to_string(),
            })?;
        response.into_plan()
    }

    /// Validate the response into a plan.
    ///
    /// # Errors
    ///
    /// See [`QueryResponse::parse`].
    pub fn into_plan(self) -> Result<Option<UpdatePlan>> {
        if !self.has_new_version {
            return Ok(None);
        }
        let version: Version = required(self.package_version, "package_version")?.parse()?;
        let raw = RawPackageInfo {
            url: required(self.package_url, "package_url")?,
            size: required(self.package_size, "package_size")?,
            format: required(self.package_format, "package_format")?,
            hash: required(self.package_hash, "package_hash")?,
            title: self.update_title.unwrap_or_default(),
            description: self.update_description.unwrap_or_default(),
        };
        let package = PackageInfo::from_raw(&self.package_name, version, raw)?;
        Ok(Some(UpdatePlan::new(package, self.force_update)))
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| ValidationError::Document {
        reason: format!("missing field `{field}` in query response"),
    })
}
