//! Package and document retrieval.
//!
//! The fetch layer is trait-based so the orchestrator can be driven by an
//! in-memory stub in tests. [`HttpFetcher`] is the production
//! implementation over `ureq`; [`download`] turns a fetcher into a
//! size-checked, hash-verified file in the cache directory.

use crate::package::package_info::PackageInfo;
use crate::verify::{IntegrityError, VerifiedDigests, Verifier, verify};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

const CHUNK_SIZE: usize = 64 * 1024;

/// Metadata reported by a probe request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Content length, when the server reports one.
    pub size: Option<u64>,
    /// Content type, when the server reports one.
    pub content_type: Option<String>,
}

/// Errors arising from package and document retrieval.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request failed.
    #[error("request failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The resource does not exist (HTTP 404 or missing file).
    #[error("not found: {url}")]
    NotFound {
        /// The location that was requested.
        url: String,
    },

    /// The resource is not the size the manifest declares.
    #[error("size mismatch for {url}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The URL that was requested.
        url: String,
        /// The declared size.
        expected: u64,
        /// The size reported by the server or observed in transfer.
        actual: u64,
    },

    /// The transfer ended before the declared size was received.
    #[error("incomplete transfer from {url}: received {received} of {expected} bytes ({reason})")]
    IncompleteTransfer {
        /// The URL that was requested.
        url: String,
        /// Bytes received before the transfer stopped.
        received: u64,
        /// The declared size.
        expected: u64,
        /// Why the transfer stopped.
        reason: String,
    },

    /// Local I/O failed while storing the transfer.
    #[error("I/O error storing download: {0}")]
    Io(#[from] io::Error),
}

/// Trait for retrieving packages, enabling test doubles.
#[cfg_attr(test, mockall::automock)]
pub trait PackageFetcher {
    /// Request metadata for `url` without transferring the body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] or [`FetchError::Http`].
    fn probe(&self, url: &str) -> Result<ProbeInfo, FetchError>;

    /// Open a fresh, non-restartable transfer of `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] or [`FetchError::Http`].
    fn stream(&self, url: &str) -> Result<Box<dyn Read>, FetchError>;
}

/// Trait for retrieving text documents such as manifests and query answers.
#[cfg_attr(test, mockall::automock)]
pub trait DocumentFetcher {
    /// Return the full text at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] or [`FetchError::Http`].
    fn fetch_document(&self, location: &str) -> Result<String, FetchError>;
}

/// HTTP fetcher using a shared `ureq` agent.
///
/// # Examples
///
/// ```
/// use selfupdate::fetch::HttpFetcher;
/// use std::time::Duration;
///
/// let fetcher = HttpFetcher::new("example-updater/1.0", Duration::from_secs(10));
/// // Use fetcher.probe(url) and fetcher.stream(url) in production
/// ```
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    #[must_use]
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            user_agent: user_agent.to_owned(),
        }
    }
}

impl PackageFetcher for HttpFetcher {
    fn probe(&self, url: &str) -> Result<ProbeInfo, FetchError> {
        let response = self
            .agent
            .head(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        Ok(parse_probe_headers(response.headers()))
    }

    fn stream(&self, url: &str) -> Result<Box<dyn Read>, FetchError> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        Ok(Box::new(response.into_body().into_reader()))
    }
}

impl DocumentFetcher for HttpFetcher {
    fn fetch_document(&self, location: &str) -> Result<String, FetchError> {
        let response = self
            .agent
            .get(location)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| map_ureq_error(location, &e))?;
        response
            .into_body()
            .read_to_string()
            .map_err(|e| FetchError::Http {
                url: location.to_owned(),
                reason: e.to_string(),
            })
    }
}

/// Reads documents from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDocumentFetcher;

impl DocumentFetcher for FileDocumentFetcher {
    fn fetch_document(&self, location: &str) -> Result<String, FetchError> {
        std::fs::read_to_string(location).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound {
                url: location.to_owned(),
            },
            _ => FetchError::Io(err),
        })
    }
}

/// Extract probe metadata from response headers.
fn parse_probe_headers(headers: &ureq::http::HeaderMap) -> ProbeInfo {
    let text = |name: ureq::http::header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_owned())
    };
    ProbeInfo {
        size: text(ureq::http::header::CONTENT_LENGTH).and_then(|len| len.parse().ok()),
        content_type: text(ureq::http::header::CONTENT_TYPE),
    }
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(404) => FetchError::NotFound {
            url: url.to_owned(),
        },
        other => FetchError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Errors from [`download`]: either the transfer or its verification failed.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Retrieval failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The received bytes do not match the declared digests.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// A package that was received in full and matched every declared digest.
#[derive(Debug)]
pub struct DownloadedPackage {
    path: Utf8PathBuf,
    digests: VerifiedDigests,
}

impl DownloadedPackage {
    /// Return where the package was stored.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Return the verified digests.
    #[must_use]
    pub fn digests(&self) -> &VerifiedDigests {
        &self.digests
    }

    /// Delete the stored package.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than the file already being gone.
    pub fn discard(self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

/// Download `package` into `dir`, checking size and digests in one pass.
///
/// A file already at `dir/<name>-<version>.<format>` that has the declared
/// size and matches every digest is reused without contacting the server;
/// any other file there is deleted first. The probe's content length, when present, must equal the declared size
/// before any body byte is requested. The body is written to a temporary
/// file in `dir` and moved to `dir/<name>-<version>.<format>` only once it
/// is complete and verified; on any failure the temporary file is removed.
/// `progress` receives `(received, total)` after every chunk.
///
/// # Errors
///
/// - [`FetchError::SizeMismatch`] when the probe or the transfer disagrees
///   with the declared size.
/// - [`FetchError::IncompleteTransfer`] when the stream ends early, fails
///   mid-transfer, or `deadline` passes.
/// - [`IntegrityError`] when a digest does not match.
pub fn download(
    fetcher: &dyn PackageFetcher,
    package: &PackageInfo,
    dir: &Utf8Path,
    deadline: Option<Instant>,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<DownloadedPackage, DownloadError> {
    let url = package.url();
    let expected = package.size();
    let path = dir.join(package.cache_filename());

    if let Some(cached) = reuse_cached(&path, package)? {
        progress(expected, expected);
        return Ok(cached);
    }

    let probe = fetcher.probe(url)?;
    match probe.size {
        Some(actual) if actual != expected => {
            return Err(FetchError::SizeMismatch {
                url: url.to_owned(),
                expected,
                actual,
            }
            .into());
        }
        Some(_) => log::debug!("probe confirms {expected} bytes at {url}"),
        None => log::info!("{url} reported no content length; relying on transfer size"),
    }

    std::fs::create_dir_all(dir).map_err(FetchError::Io)?;
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", package.cache_filename()))
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(FetchError::Io)?;

    let mut verifier = Verifier::new(package.hashes())?;
    let mut stream = fetcher.stream(url)?;
    let incomplete = |received: u64, reason: String| FetchError::IncompleteTransfer {
        url: url.to_owned(),
        received,
        expected,
        reason,
    };

    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut received = 0_u64;
    loop {
        // Once every byte is in, only the end-of-stream read remains.
        let owed = received < expected;
        if owed && deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(incomplete(received, "deadline elapsed".to_owned()).into());
        }
        let read = match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(incomplete(received, err.to_string()).into()),
        };
        let total = received + read as u64;
        if total > expected {
            return Err(FetchError::SizeMismatch {
                url: url.to_owned(),
                expected,
                actual: total,
            }
            .into());
        }
        let chunk = &buffer[..read];
        temp.write_all(chunk).map_err(FetchError::Io)?;
        verifier.update(chunk);
        received = total;
        progress(received, expected);
    }

    if received < expected {
        return Err(incomplete(received, "stream ended early".to_owned()).into());
    }

    temp.as_file().sync_all().map_err(FetchError::Io)?;
    let digests = verifier.finish()?;

    temp.persist(&path).map_err(|err| FetchError::Io(err.error))?;
    log::info!("downloaded {} ({expected} bytes) to {path}", package.cache_filename());
    Ok(DownloadedPackage { path, digests })
}

/// Return the package cached at `path` if it is complete and verified.
fn reuse_cached(
    path: &Utf8Path,
    package: &PackageInfo,
) -> Result<Option<DownloadedPackage>, DownloadError> {
    let size = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(FetchError::Io(err).into()),
    };
    if size == package.size() {
        let mut file = std::fs::File::open(path).map_err(FetchError::Io)?;
        match verify(&mut file, package.hashes()) {
            Ok(digests) => {
                log::info!("reusing verified package {path}");
                return Ok(Some(DownloadedPackage {
                    path: path.to_owned(),
                    digests,
                }));
            }
            Err(IntegrityError::Io(err)) => return Err(FetchError::Io(err).into()),
            Err(err) => log::warn!("discarding cached {path}: {err}"),
        }
    } else {
        log::info!(
            "discarding cached {path}: {size} bytes, expected {}",
            package.size()
        );
    }
    std::fs::remove_file(path).map_err(FetchError::Io)?;
    Ok(None)
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
