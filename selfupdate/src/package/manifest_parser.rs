//! Manifest document deserialization.
//!
//! Manifests may be authored as JSON or YAML; both decode into the same
//! [`RawManifest`] and then run through identical validation. Parsing
//! happens once per update attempt and is free of side effects.

use super::error::{Result, ValidationError};
use super::manifest::{Manifest, RawManifest};
use camino::Utf8Path;

/// Serialization syntax of a manifest document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// JSON document.
    Json,
    /// YAML document.
    Yaml,
}

impl DocumentFormat {
    /// Choose a format from a file extension (`.json`, `.yaml`, `.yml`).
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        match path.extension()?.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Guess the format from the document text: JSON documents open with
    /// `{`, anything else is read as YAML.
    #[must_use]
    pub fn sniff(document: &str) -> Self {
        if document.trim_start().starts_with('{') {
            Self::Json
        } else {
            Self::Yaml
        }
    }
}

/// Parse and validate a manifest document.
///
/// # Errors
///
/// Returns [`ValidationError::Document`] for syntax errors or missing
/// fields, and any other [`ValidationError`] raised by validation.
///
/// # Examples
///
/// ```
/// use selfupdate::package::manifest_parser::{DocumentFormat, parse_manifest};
///
/// let result = parse_manifest("{not valid json", DocumentFormat::Json);
/// assert!(result.is_err());
/// ```
pub fn parse_manifest(document: &str, format: DocumentFormat) -> Result<Manifest> {
    let raw: RawManifest = match format {
        DocumentFormat::Json => serde_json::from_str(document).map_err(document_error)?,
        DocumentFormat::Yaml => serde_yaml::from_str(document).map_err(document_error)?,
    };
    let manifest = Manifest::from_raw(raw)?;
    log::debug!(
        "parsed manifest for {} with {} version(s) and {} polic(ies)",
        manifest.package_name(),
        manifest.versions().len(),
        manifest.policies().len()
    );
    Ok(manifest)
}

/// Parse a manifest whose format is sniffed from its contents.
///
/// # Errors
///
/// See [`parse_manifest`].
pub fn parse_manifest_auto(document: &str) -> Result<Manifest> {
    parse_manifest(document, DocumentFormat::sniff(document))
}

fn document_error(err: impl std::fmt::Display) -> ValidationError {
    ValidationError::Document {
        reason: err.to_string(),
    }
}
