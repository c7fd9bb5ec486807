//! Update orchestration.
//!
//! One attempt runs recover → plan → download and verify → extract →
//! install. Every stage either succeeds or returns its specific error; the
//! installed file is only ever replaced by the installer's atomic swap, so a
//! failure at any point leaves the previous version in place.

use crate::error::{Result, UpdateError};
use crate::extraction::PackageExtractor;
use crate::fetch::{DocumentFetcher, PackageFetcher, download};
use crate::install::{CommitCheck, InstallLock, install, recover};
use crate::package::error::ValidationError;
use crate::package::manifest::Manifest;
use crate::package::manifest_parser::{DocumentFormat, parse_manifest};
use crate::package::policy::resolve;
use crate::package::query::{QueryResponse, UpdatePlan};
use crate::package::version::Version;
use camino::{Utf8Path, Utf8PathBuf};
use std::time::Instant;

/// Decides which package, if any, the current version should move to.
#[cfg_attr(test, mockall::automock)]
pub trait UpdateSource {
    /// Return the plan for `current`, or `None` when it is up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be fetched or is invalid.
    fn plan(&self, current: &Version) -> Result<Option<UpdatePlan>>;
}

/// Resolves updates locally from a manifest document.
pub struct ManifestUpdateSource<'a> {
    fetcher: &'a dyn DocumentFetcher,
    location: String,
}

impl<'a> ManifestUpdateSource<'a> {
    /// Read the manifest at `location` through `fetcher`.
    #[must_use]
    pub fn new(fetcher: &'a dyn DocumentFetcher, location: &str) -> Self {
        Self {
            fetcher,
            location: location.to_owned(),
        }
    }

    /// Fetch and parse the manifest.
    ///
    /// The format follows the location's extension, ignoring any query
    /// string, and is sniffed from the document otherwise.
    ///
    /// # Errors
    ///
    /// Returns a fetch error or a validation error for an invalid document.
    pub fn manifest(&self) -> Result<Manifest> {
        let document = self.fetcher.fetch_document(&self.location)?;
        let manifest = parse_manifest(&document, self.format(&document))?;
        log::debug!(
            "manifest {} lists {} versions and {} policies",
            self.location,
            manifest.versions().len(),
            manifest.policies().len()
        );
        Ok(manifest)
    }

    fn format(&self, document: &str) -> DocumentFormat {
        let path = self.location.split(['?', '#']).next().unwrap_or_default();
        DocumentFormat::from_path(Utf8Path::new(path))
            .unwrap_or_else(|| DocumentFormat::sniff(document))
    }
}

impl UpdateSource for ManifestUpdateSource<'_> {
    fn plan(&self, current: &Version) -> Result<Option<UpdatePlan>> {
        let manifest = self.manifest()?;
        let decision = resolve(&manifest, current);
        Ok(UpdatePlan::from_decision(&manifest, &decision))
    }
}

/// Asks a server to resolve the update for this package.
pub struct QueryUpdateSource<'a> {
    fetcher: &'a dyn DocumentFetcher,
    base_url: String,
    package: String,
}

impl<'a> QueryUpdateSource<'a> {
    /// Query `<base_url>/<package>/<current>` through `fetcher`.
    #[must_use]
    pub fn new(fetcher: &'a dyn DocumentFetcher, base_url: &str, package: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_owned(),
            package: package.to_owned(),
        }
    }

    /// Return the query location for `current`.
    #[must_use]
    pub fn location(&self, current: &Version) -> String {
        format!("{}/{}/{current}", self.base_url, self.package)
    }
}

impl UpdateSource for QueryUpdateSource<'_> {
    fn plan(&self, current: &Version) -> Result<Option<UpdatePlan>> {
        let document = self.fetcher.fetch_document(&self.location(current))?;
        let Some(plan) = QueryResponse::parse(&document)? else {
            return Ok(None);
        };
        if plan.package().name() != self.package {
            return Err(ValidationError::Document {
                reason: format!(
                    "query for {} answered for package {}",
                    self.package,
                    plan.package().name()
                ),
            }
            .into());
        }
        if plan.version() == current {
            log::debug!("server offered the installed version {current}");
            return Ok(None);
        }
        Ok(Some(plan))
    }
}

/// Inputs for one update attempt.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// The version currently installed.
    pub current: Version,
    /// The file to replace.
    pub target: Utf8PathBuf,
    /// Where packages are downloaded.
    pub cache_dir: Utf8PathBuf,
    /// When the download must have finished.
    pub deadline: Option<Instant>,
}

/// The result of a successful update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No policy moves the current version.
    UpToDate,
    /// The target now holds `version`.
    Installed {
        /// The version installed.
        version: Version,
        /// Whether the update was mandatory.
        force_update: bool,
    },
}

/// Ask `source` for a plan without downloading anything.
///
/// # Errors
///
/// Returns the source's error.
pub fn check(source: &dyn UpdateSource, current: &Version) -> Result<Option<UpdatePlan>> {
    let plan = source.plan(current)?;
    match &plan {
        Some(plan) => log::info!("update available: {current} -> {}", plan.version()),
        None => log::info!("{current} is up to date"),
    }
    Ok(plan)
}

/// Run one complete update attempt.
///
/// Takes the install lock, restores any install a previous run left
/// half-done, then plans, downloads, verifies, extracts, and installs.
/// `progress` receives `(received, total)` download byte counts.
///
/// # Errors
///
/// Returns the first stage error. The target keeps its previous contents
/// whenever an error is returned.
pub fn run_update(
    request: &UpdateRequest,
    source: &dyn UpdateSource,
    fetcher: &dyn PackageFetcher,
    extractor: &dyn PackageExtractor,
    commit_check: &dyn CommitCheck,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<UpdateOutcome> {
    let _lock = InstallLock::acquire(&request.target)?;
    let recovered = recover(&request.target)?;
    if !recovered.is_clean() {
        log::warn!("{}: {recovered}", request.target);
    }

    let Some(plan) = check(source, &request.current)? else {
        return Ok(UpdateOutcome::UpToDate);
    };

    let package = plan.package();
    let downloaded = download(
        fetcher,
        package,
        &request.cache_dir,
        request.deadline,
        progress,
    )?;

    let installed = extract_and_install(
        downloaded.path(),
        &plan,
        &request.cache_dir,
        &request.target,
        extractor,
        commit_check,
    );
    if let Err(err @ UpdateError::Install(_)) = &installed {
        log::info!(
            "keeping verified package {} for the next attempt after: {err}",
            downloaded.path()
        );
    } else if let Err(err) = downloaded.discard() {
        log::warn!("could not remove downloaded package: {err}");
    }
    installed?;

    Ok(UpdateOutcome::Installed {
        version: plan.version().clone(),
        force_update: plan.force_update(),
    })
}

fn extract_and_install(
    package_path: &Utf8Path,
    plan: &UpdatePlan,
    cache_dir: &Utf8Path,
    target: &Utf8Path,
    extractor: &dyn PackageExtractor,
    commit_check: &dyn CommitCheck,
) -> Result<()> {
    let workdir = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(cache_dir)?;
    let workdir_path = Utf8PathBuf::try_from(workdir.path().to_path_buf())
        .map_err(|err| err.into_io_error())?;

    let payload = extractor.extract(package_path, plan.package().format(), &workdir_path)?;
    let outcome = install(&payload, target, commit_check)?;
    log::info!(
        "installed version {} at {}",
        plan.version(),
        outcome.target
    );
    Ok(())
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
