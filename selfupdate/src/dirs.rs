//! Directory resolution abstraction for platform-specific paths.
//!
//! [`BaseDirs`] lets configuration loading and cache placement be tested
//! against temporary directories; [`SystemBaseDirs`] answers from the
//! platform conventions via `directories-next`.

use std::path::PathBuf;

/// Base directories used by the updater.
pub trait BaseDirs {
    /// The per-user configuration root, e.g. `~/.config`.
    fn config_dir(&self) -> Option<PathBuf>;

    /// The per-user cache root, e.g. `~/.cache`.
    fn cache_dir(&self) -> Option<PathBuf>;
}

/// Platform base directories.
#[derive(Debug, Clone)]
pub struct SystemBaseDirs {
    inner: directories_next::BaseDirs,
}

impl SystemBaseDirs {
    /// Resolve the platform directories, or `None` when no home directory
    /// can be determined.
    #[must_use]
    pub fn new() -> Option<Self> {
        directories_next::BaseDirs::new().map(|inner| Self { inner })
    }
}

impl BaseDirs for SystemBaseDirs {
    fn config_dir(&self) -> Option<PathBuf> {
        Some(self.inner.config_dir().to_path_buf())
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        Some(self.inner.cache_dir().to_path_buf())
    }
}
