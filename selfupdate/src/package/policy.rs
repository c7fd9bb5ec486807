//! Delivery policies and version resolution.
//!
//! Policies are consulted top to bottom and each policy's expressions left
//! to right; the first policy with any expression containing the current
//! version decides the target. Earlier policies deliberately shadow later
//! ones.

use super::error::{Result, ValidationError};
use super::manifest::Manifest;
use super::range::RangeExpr;
use super::version::Version;
use serde::{Deserialize, Serialize};

/// A rule mapping a set of version ranges to one target version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    matches: Vec<RangeExpr>,
    target: Version,
    #[serde(default)]
    force_update: bool,
}

impl Policy {
    /// Build a policy from its match expressions and target.
    #[must_use]
    pub fn new(matches: Vec<RangeExpr>, target: Version) -> Self {
        Self {
            matches,
            target,
            force_update: false,
        }
    }

    /// Mark the update delivered by this policy as mandatory.
    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force_update = true;
        self
    }

    /// Return the match expressions in declared order.
    #[must_use]
    pub fn matches(&self) -> &[RangeExpr] {
        &self.matches
    }

    /// Return the version this policy delivers.
    #[must_use]
    pub fn target(&self) -> &Version {
        &self.target
    }

    /// Return whether clients should treat the update as mandatory.
    #[must_use]
    pub fn force_update(&self) -> bool {
        self.force_update
    }

    /// Return the first expression (in declared order) containing `version`.
    #[must_use]
    pub fn matching_expression(&self, version: &Version) -> Option<&RangeExpr> {
        self.matches.iter().find(|expr| expr.contains(version))
    }
}

/// The outcome of resolving a current version against a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDecision {
    current: Version,
    target: Option<Version>,
    force_update: bool,
}

impl UpdateDecision {
    /// A decision that no update applies to `current`.
    #[must_use]
    pub fn up_to_date(current: Version) -> Self {
        Self {
            current,
            target: None,
            force_update: false,
        }
    }

    /// A decision to move `current` to `target`.
    ///
    /// Collapses to [`UpdateDecision::up_to_date`] when the two are equal.
    #[must_use]
    pub fn update(current: Version, target: Version, force_update: bool) -> Self {
        if target == current {
            return Self::up_to_date(current);
        }
        Self {
            current,
            target: Some(target),
            force_update,
        }
    }

    /// Return the version the decision was made for.
    #[must_use]
    pub fn current(&self) -> &Version {
        &self.current
    }

    /// Return the target version, or `None` when already up to date.
    #[must_use]
    pub fn target(&self) -> Option<&Version> {
        self.target.as_ref()
    }

    /// Return whether the update is mandatory. Always false when up to date.
    #[must_use]
    pub fn force_update(&self) -> bool {
        self.force_update
    }

    /// Return true when no update applies.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.target.is_none()
    }
}

/// Resolve which version `current` should be moved to.
///
/// # Examples
///
/// ```
/// use selfupdate::package::manifest_parser::{DocumentFormat, parse_manifest};
/// use selfupdate::package::policy::resolve;
///
/// let yaml = concat!(
///     "package: example\n",
///     "versions:\n",
///     "  \"2.0\":\n",
///     "    url: http://localhost:8080/example.zip\n",
///     "    size: 10\n",
///     "    format: zip\n",
///     "    hash: { md5: d41d8cd98f00b204e9800998ecf8427e }\n",
///     "policies:\n",
///     "  - matches: [\"[,2.0)\"]\n",
///     "    target: \"2.0\"\n",
/// );
/// let manifest = parse_manifest(yaml, DocumentFormat::Yaml).expect("valid manifest");
/// let decision = resolve(&manifest, &"1.0".parse().expect("valid version"));
/// assert_eq!(decision.target().map(ToString::to_string), Some("2.0".to_owned()));
/// ```
#[must_use]
pub fn resolve(manifest: &Manifest, current: &Version) -> UpdateDecision {
    let matched = manifest
        .policies()
        .iter()
        .enumerate()
        .find_map(|(index, policy)| {
            policy
                .matching_expression(current)
                .map(|expr| (index, expr, policy))
        });

    let Some((index, expr, policy)) = matched else {
        log::debug!("no policy matches version {current}");
        return UpdateDecision::up_to_date(current.clone());
    };
    log::debug!(
        "policy {index} matches version {current} via {expr}; target {}",
        policy.target()
    );
    UpdateDecision::update(current.clone(), policy.target().clone(), policy.force_update())
}

/// Parse `current` and resolve it against `manifest`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidVersion`] if `current` is malformed;
/// no comparison is attempted in that case.
pub fn resolve_str(manifest: &Manifest, current: &str) -> Result<UpdateDecision> {
    let version: Version = current.parse()?;
    Ok(resolve(manifest, &version))
}

pub(crate) fn validate_policies(
    policies: &[Policy],
    is_declared: impl Fn(&Version) -> bool,
) -> Result<()> {
    for (index, policy) in policies.iter().enumerate() {
        if policy.matches.is_empty() {
            return Err(ValidationError::EmptyPolicy { index });
        }
        if !is_declared(&policy.target) {
            return Err(ValidationError::UnknownTarget {
                index,
                target: policy.target.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
