//! Per-version package metadata.
//!
//! A [`PackageInfo`] says where one version's package lives, how large it
//! is, how it is packed, and which digests it must hash to. Instances are
//! only built through [`PackageInfo::from_raw`], which enforces every
//! manifest rule that concerns a single version.

use super::error::{Result, ValidationError};
use super::hash::{HashAlgorithm, HexDigest};
use super::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How a package is packed on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// A zip archive holding exactly one replacement file.
    Zip,
    /// The replacement file itself, not archived.
    Raw,
}

impl PackageFormat {
    const ACCEPTED: &'static str = "zip, raw";

    /// Return the lowercase name used in manifests and cache filenames.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Raw => "raw",
        }
    }
}

impl FromStr for PackageFormat {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "raw" => Ok(Self::Raw),
            _ => Err(ValidationError::UnsupportedFormat {
                value: value.to_owned(),
                expected: Self::ACCEPTED.to_owned(),
            }),
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated per-version fields as they appear in a manifest document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPackageInfo {
    /// Retrieval location.
    pub url: String,
    /// Declared byte length of the resource at `url`.
    pub size: u64,
    /// Packing format name.
    pub format: String,
    /// Algorithm name to hex digest.
    pub hash: BTreeMap<String, String>,
    /// Short human-readable update title.
    #[serde(default)]
    pub title: String,
    /// Longer human-readable update description.
    #[serde(default)]
    pub description: String,
}

/// Validated metadata for one deliverable version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    name: String,
    version: Version,
    url: String,
    size: u64,
    format: PackageFormat,
    hashes: BTreeMap<HashAlgorithm, HexDigest>,
    title: String,
    description: String,
}

impl PackageInfo {
    /// Validate raw fields for `version` of package `name`.
    ///
    /// Hash entries naming an algorithm this build does not know are skipped
    /// with a warning; at least one recognised algorithm must remain.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a package name that is not a plain
    /// file name, a zero size, an unsupported format, a non-`http(s)` URL, a
    /// malformed or repeated digest, or when no recognised algorithm is
    /// declared.
    pub fn from_raw(name: &str, version: Version, raw: RawPackageInfo) -> Result<Self> {
        validate_package_name(name)?;
        if raw.size == 0 {
            return Err(ValidationError::ZeroSize {
                version: version.to_string(),
            });
        }
        let format = raw.format.parse()?;
        validate_url(&raw.url)?;
        let hashes = recognised_hashes(&version, &raw.hash)?;
        Ok(Self {
            name: name.to_owned(),
            version,
            url: raw.url,
            size: raw.size,
            format,
            hashes,
            title: raw.title,
            description: raw.description,
        })
    }

    /// Return the package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the version this package delivers.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Return the retrieval URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the exact byte length of the package.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Return the packing format.
    #[must_use]
    pub fn format(&self) -> PackageFormat {
        self.format
    }

    /// Return the expected digests keyed by algorithm; never empty.
    #[must_use]
    pub fn hashes(&self) -> &BTreeMap<HashAlgorithm, HexDigest> {
        &self.hashes
    }

    /// Return the update title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Return the update description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Return the cache filename `<name>-<version>.<format>`.
    #[must_use]
    pub fn cache_filename(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, self.format)
    }
}

/// Check that `name` can serve as a single cache file name component.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPackageName`] for an empty name, a
/// leading dot, a path separator, or a `..` sequence.
pub fn validate_package_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ValidationError::InvalidPackageName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("name starts with a dot"));
    }
    if name.contains(['/', '\\']) {
        return Err(invalid("name contains a path separator"));
    }
    if name.contains("..") {
        return Err(invalid("name contains \"..\""));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let invalid = |reason: &str| ValidationError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };
    let uri: ureq::http::Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("URI must be absolute")),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(invalid("URI has no host"));
    }
    Ok(())
}

fn recognised_hashes(
    version: &Version,
    declared: &BTreeMap<String, String>,
) -> Result<BTreeMap<HashAlgorithm, HexDigest>> {
    let mut hashes = BTreeMap::new();
    for (name, value) in declared {
        match name.parse::<HashAlgorithm>() {
            Ok(algorithm) => {
                let digest = HexDigest::new(algorithm, value)?;
                if hashes.insert(algorithm, digest).is_some() {
                    return Err(ValidationError::DuplicateHash {
                        version: version.to_string(),
                        algorithm: algorithm.to_string(),
                    });
                }
            }
            Err(unknown) => {
                log::warn!("version {version}: ignoring unrecognised hash algorithm \"{unknown}\"");
            }
        }
    }
    if hashes.is_empty() {
        return Err(ValidationError::NoRecognisedHash {
            version: version.to_string(),
        });
    }
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn raw() -> RawPackageInfo {
        RawPackageInfo {
            url: "http://localhost:8080/example.zip".to_owned(),
            size: 1024,
            format: "zip".to_owned(),
            hash: BTreeMap::from([("sha256".to_owned(), "a".repeat(64))]),
            title: "Example 2.0".to_owned(),
            description: "New features".to_owned(),
        }
    }

    fn version() -> Version {
        "2.0".parse().expect("valid version")
    }

    #[rstest]
    fn accepts_valid_fields(raw: RawPackageInfo) {
        let info = PackageInfo::from_raw("example", version(), raw).expect("valid");
        assert_eq!(info.name(), "example");
        assert_eq!(info.size(), 1024);
        assert_eq!(info.format(), PackageFormat::Zip);
        assert_eq!(info.hashes().len(), 1);
        assert_eq!(info.cache_filename(), "example-2.0.zip");
    }

    #[rstest]
    fn rejects_zero_size(mut raw: RawPackageInfo) {
        raw.size = 0;
        let result = PackageInfo::from_raw("example", version(), raw);
        assert!(matches!(result, Err(ValidationError::ZeroSize { .. })));
    }

    #[rstest]
    fn skips_unknown_algorithms_when_one_is_known(mut raw: RawPackageInfo) {
        raw.hash.insert("blake3".to_owned(), "00".to_owned());
        let info = PackageInfo::from_raw("example", version(), raw).expect("valid");
        assert_eq!(info.hashes().len(), 1);
        assert!(info.hashes().contains_key(&HashAlgorithm::Sha256));
    }

    #[rstest]
    fn rejects_only_unknown_algorithms(mut raw: RawPackageInfo) {
        raw.hash = BTreeMap::from([("crc32".to_owned(), "deadbeef".to_owned())]);
        let result = PackageInfo::from_raw("example", version(), raw);
        assert!(matches!(result, Err(ValidationError::NoRecognisedHash { .. })));
    }

    #[rstest]
    fn rejects_empty_hash_map(mut raw: RawPackageInfo) {
        raw.hash.clear();
        let result = PackageInfo::from_raw("example", version(), raw);
        assert!(matches!(result, Err(ValidationError::NoRecognisedHash { .. })));
    }

    #[rstest]
    #[case::relative("/example.zip")]
    #[case::ftp("ftp://example.test/example.zip")]
    #[case::garbage("not a url")]
    fn rejects_bad_urls(mut raw: RawPackageInfo, #[case] url: &str) {
        raw.url = url.to_owned();
        let result = PackageInfo::from_raw("example", version(), raw);
        assert!(
            matches!(result, Err(ValidationError::InvalidUrl { .. })),
            "expected InvalidUrl for {url}, got {result:?}"
        );
    }

    #[rstest]
    fn rejects_case_variant_duplicate_hashes(mut raw: RawPackageInfo) {
        raw.hash.insert("SHA256".to_owned(), "b".repeat(64));
        let result = PackageInfo::from_raw("example", version(), raw);
        assert_eq!(
            result,
            Err(ValidationError::DuplicateHash {
                version: "2.0".to_owned(),
                algorithm: "sha256".to_owned(),
            })
        );
    }

    #[rstest]
    #[case::empty("")]
    #[case::parent("..")]
    #[case::hidden(".example")]
    #[case::slash("bin/example")]
    #[case::backslash("bin\\example")]
    #[case::embedded_parent("a..b")]
    fn rejects_names_unfit_for_a_file(raw: RawPackageInfo, #[case] name: &str) {
        let result = PackageInfo::from_raw(name, version(), raw);
        assert!(
            matches!(result, Err(ValidationError::InvalidPackageName { .. })),
            "expected InvalidPackageName for {name:?}, got {result:?}"
        );
    }

    #[rstest]
    fn rejects_unknown_format(mut raw: RawPackageInfo) {
        raw.format = "tar.gz".to_owned();
        let result = PackageInfo::from_raw("example", version(), raw);
        assert!(matches!(result, Err(ValidationError::UnsupportedFormat { .. })));
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("ZIP".parse::<PackageFormat>(), Ok(PackageFormat::Zip));
        assert_eq!("raw".parse::<PackageFormat>(), Ok(PackageFormat::Raw));
    }
}
