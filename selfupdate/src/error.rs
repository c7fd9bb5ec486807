//! Error type for a complete update attempt.
//!
//! Each stage keeps its own error enum; [`UpdateError`] gathers them so the
//! orchestrator and the CLI can report any failure with a stable tag from
//! [`UpdateError::kind`].

use crate::extraction::ExtractionError;
use crate::fetch::{DownloadError, FetchError};
use crate::install::InstallError;
use crate::package::error::ValidationError;
use crate::verify::IntegrityError;
use thiserror::Error;

/// Errors that can end an update attempt.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The manifest, query response, or a version string is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Retrieving a document or the package failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The package does not match its declared digests.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The replacement file could not be taken from the package.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Replacing the installed file failed or was rolled back.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// A local I/O operation outside the stages above failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DownloadError> for UpdateError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Fetch(err) => Self::Fetch(err),
            DownloadError::Integrity(err) => Self::Integrity(err),
        }
    }
}

impl UpdateError {
    /// Return a stable, lowercase tag naming the failure class.
    ///
    /// # Examples
    ///
    /// ```
    /// use selfupdate::error::UpdateError;
    /// use selfupdate::verify::IntegrityError;
    ///
    /// let err = UpdateError::from(IntegrityError::NoDigests);
    /// assert_eq!(err.kind(), "integrity");
    /// ```
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Fetch(FetchError::NotFound { .. }) => "not-found",
            Self::Fetch(FetchError::Http { .. }) => "http",
            Self::Fetch(FetchError::SizeMismatch { .. }) => "size-mismatch",
            Self::Fetch(FetchError::IncompleteTransfer { .. }) => "incomplete-transfer",
            Self::Fetch(FetchError::Io(_)) | Self::Io(_) => "io",
            Self::Integrity(_) => "integrity",
            Self::Extraction(_) => "extraction",
            Self::Install(_) => "install",
        }
    }
}

/// Result type for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
