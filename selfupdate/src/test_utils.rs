//! Shared test utilities for the selfupdate crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! integration suites under `tests/`.

use crate::fetch::{DocumentFetcher, FetchError, PackageFetcher, ProbeInfo};
use sha2::Digest;
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Computes the lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(bytes))
}

/// Computes the lowercase hex MD5 digest of `bytes`.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(md5::Md5::digest(bytes))
}

/// Returns the URL [`ManifestBuilder::version`] assigns to a zip package.
pub fn package_url(name: &str, version: &str) -> String {
    format!("http://localhost:8080/{name}-{version}.zip")
}

/// Builds an in-memory zip archive holding `entries`.
///
/// Names ending in `/` are added as directories.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let options = zip::write::SimpleFileOptions::default();
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(contents).expect("write entry");
        }
    }
    writer.finish().expect("finish archive").into_inner()
}

/// One version entry of a manifest under construction.
#[derive(Debug, Clone)]
pub struct VersionEntry {
    /// Retrieval URL.
    pub url: String,
    /// Declared size.
    pub size: u64,
    /// Format name.
    pub format: String,
    /// Algorithm name and digest pairs.
    pub hashes: Vec<(String, String)>,
    /// Update title.
    pub title: String,
}

impl VersionEntry {
    /// Describes `payload` as a zip package with a SHA-256 digest.
    pub fn for_payload(name: &str, version: &str, payload: &[u8]) -> Self {
        Self {
            url: package_url(name, version),
            size: payload.len() as u64,
            format: "zip".to_owned(),
            hashes: vec![("sha256".to_owned(), sha256_hex(payload))],
            title: format!("{name} {version}"),
        }
    }

    /// Replaces the format name.
    #[must_use]
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = format.to_owned();
        self
    }

    /// Adds or replaces one declared digest.
    #[must_use]
    pub fn with_hash(mut self, algorithm: &str, digest: &str) -> Self {
        self.hashes.retain(|(existing, _)| existing != algorithm);
        self.hashes.push((algorithm.to_owned(), digest.to_owned()));
        self
    }
}

#[derive(Debug, Clone)]
struct PolicyEntry {
    matches: Vec<String>,
    target: String,
    force_update: bool,
}

/// Fluent builder for manifest documents in JSON or YAML form.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    package: String,
    versions: Vec<(String, VersionEntry)>,
    policies: Vec<PolicyEntry>,
}

impl ManifestBuilder {
    /// Starts a manifest for `package` with no versions or policies.
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_owned(),
            versions: Vec::new(),
            policies: Vec::new(),
        }
    }

    /// Declares `version` as a zip package whose bytes are `payload`.
    #[must_use]
    pub fn version(self, version: &str, payload: &[u8]) -> Self {
        let entry = VersionEntry::for_payload(&self.package, version, payload);
        self.entry(version, entry)
    }

    /// Declares `version` with an explicit entry.
    #[must_use]
    pub fn entry(mut self, version: &str, entry: VersionEntry) -> Self {
        self.versions.push((version.to_owned(), entry));
        self
    }

    /// Appends a policy delivering `target` to versions in `matches`.
    #[must_use]
    pub fn policy(self, matches: &[&str], target: &str) -> Self {
        self.push_policy(matches, target, false)
    }

    /// Appends a mandatory-update policy.
    #[must_use]
    pub fn forced_policy(self, matches: &[&str], target: &str) -> Self {
        self.push_policy(matches, target, true)
    }

    fn push_policy(mut self, matches: &[&str], target: &str, force_update: bool) -> Self {
        self.policies.push(PolicyEntry {
            matches: matches.iter().map(|m| (*m).to_owned()).collect(),
            target: target.to_owned(),
            force_update,
        });
        self
    }

    /// Renders the manifest as JSON.
    pub fn to_json(&self) -> String {
        let versions: serde_json::Map<String, serde_json::Value> = self
            .versions
            .iter()
            .map(|(version, entry)| {
                let hash: serde_json::Map<String, serde_json::Value> = entry
                    .hashes
                    .iter()
                    .map(|(name, digest)| (name.clone(), serde_json::Value::from(digest.clone())))
                    .collect();
                let value = serde_json::json!({
                    "url": entry.url,
                    "size": entry.size,
                    "format": entry.format,
                    "hash": hash,
                    "title": entry.title,
                });
                (version.clone(), value)
            })
            .collect();
        let policies: Vec<serde_json::Value> = self
            .policies
            .iter()
            .map(|policy| {
                serde_json::json!({
                    "matches": policy.matches,
                    "target": policy.target,
                    "force_update": policy.force_update,
                })
            })
            .collect();
        serde_json::json!({
            "package": self.package,
            "versions": versions,
            "policies": policies,
        })
        .to_string()
    }

    /// Renders the manifest as YAML with quoted version keys.
    pub fn to_yaml(&self) -> String {
        let quote = |text: &str| serde_json::Value::from(text).to_string();
        let mut lines = vec![format!("package: {}", quote(&self.package))];
        if self.versions.is_empty() {
            lines.push("versions: {}".to_owned());
        } else {
            lines.push("versions:".to_owned());
        }
        for (version, entry) in &self.versions {
            lines.push(format!("  {}:", quote(version)));
            lines.push(format!("    url: {}", quote(&entry.url)));
            lines.push(format!("    size: {}", entry.size));
            lines.push(format!("    format: {}", quote(&entry.format)));
            lines.push("    hash:".to_owned());
            for (name, digest) in &entry.hashes {
                lines.push(format!("      {name}: {}", quote(digest)));
            }
            lines.push(format!("    title: {}", quote(&entry.title)));
        }
        if self.policies.is_empty() {
            lines.push("policies: []".to_owned());
        } else {
            lines.push("policies:".to_owned());
        }
        for policy in &self.policies {
            if policy.matches.is_empty() {
                lines.push("  - matches: []".to_owned());
            } else {
                lines.push("  - matches:".to_owned());
                for expr in &policy.matches {
                    lines.push(format!("      - {}", quote(expr)));
                }
            }
            lines.push(format!("    target: {}", quote(&policy.target)));
            lines.push(format!("    force_update: {}", policy.force_update));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

/// An in-memory [`PackageFetcher`] and [`DocumentFetcher`].
///
/// Packages are served by URL. The stream can be cut short, padded, or made
/// to fail part-way; the probe reports the registered payload length unless
/// overridden with [`StubFetcher::report_size`].
#[derive(Debug, Default)]
pub struct StubFetcher {
    packages: HashMap<String, Vec<u8>>,
    documents: HashMap<String, String>,
    truncate_to: Option<usize>,
    extra: Vec<u8>,
    reported_size: Option<Option<u64>>,
    fail_after: Option<usize>,
    streams: AtomicUsize,
}

impl StubFetcher {
    /// Creates a fetcher serving nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `payload` at `url`.
    #[must_use]
    pub fn with_package(mut self, url: &str, payload: &[u8]) -> Self {
        self.packages.insert(url.to_owned(), payload.to_vec());
        self
    }

    /// Serves `text` at `location`.
    #[must_use]
    pub fn with_document(mut self, location: &str, text: &str) -> Self {
        self.documents.insert(location.to_owned(), text.to_owned());
        self
    }

    /// Ends every stream after `len` bytes.
    #[must_use]
    pub fn truncate_to(mut self, len: usize) -> Self {
        self.truncate_to = Some(len);
        self
    }

    /// Appends `bytes` to every stream.
    #[must_use]
    pub fn append_bytes(mut self, bytes: &[u8]) -> Self {
        self.extra = bytes.to_vec();
        self
    }

    /// Makes probes report `size` instead of the payload length.
    #[must_use]
    pub fn report_size(mut self, size: Option<u64>) -> Self {
        self.reported_size = Some(size);
        self
    }

    /// Fails every stream with a connection reset after `len` bytes.
    #[must_use]
    pub fn fail_after(mut self, len: usize) -> Self {
        self.fail_after = Some(len);
        self
    }

    /// Returns how many streams have been opened.
    pub fn stream_count(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }

    fn payload(&self, url: &str) -> Result<&Vec<u8>, FetchError> {
        self.packages.get(url).ok_or_else(|| FetchError::NotFound {
            url: url.to_owned(),
        })
    }
}

impl PackageFetcher for StubFetcher {
    fn probe(&self, url: &str) -> Result<ProbeInfo, FetchError> {
        let payload = self.payload(url)?;
        Ok(ProbeInfo {
            size: self
                .reported_size
                .unwrap_or(Some(payload.len() as u64)),
            content_type: Some("application/octet-stream".to_owned()),
        })
    }

    fn stream(&self, url: &str) -> Result<Box<dyn Read>, FetchError> {
        let mut data = self.payload(url)?.clone();
        self.streams.fetch_add(1, Ordering::SeqCst);
        if let Some(len) = self.truncate_to {
            data.truncate(len);
        }
        data.extend_from_slice(&self.extra);
        match self.fail_after {
            Some(len) => {
                data.truncate(len);
                Ok(Box::new(ResettingReader {
                    inner: Cursor::new(data),
                }))
            }
            None => Ok(Box::new(Cursor::new(data))),
        }
    }
}

impl DocumentFetcher for StubFetcher {
    fn fetch_document(&self, location: &str) -> Result<String, FetchError> {
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                url: location.to_owned(),
            })
    }
}

/// Yields its bytes, then fails instead of reporting end of stream.
struct ResettingReader {
    inner: Cursor<Vec<u8>>,
}

impl Read for ResettingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            read => Ok(read),
        }
    }
}
