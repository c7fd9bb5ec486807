//! Updater configuration loaded from TOML.
//!
//! Settings live in `<config dir>/<app_name>/selfupdate.toml`, or in the file
//! named by `--config`. Every field has a default, so a missing default file
//! is not an error and a partial file only overrides what it names. Command
//! line flags are applied on top by the binary.

use crate::dirs::BaseDirs;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Application name used when the configuration does not name one.
pub const DEFAULT_APP_NAME: &str = "selfupdate";

/// File name looked up inside the per-application configuration directory.
pub const CONFIG_FILE_NAME: &str = "selfupdate.toml";

/// Errors raised while loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// The file that failed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`UpdaterConfig`].
    #[error("invalid configuration {path}: {source}")]
    Parse {
        /// The file that failed.
        path: Utf8PathBuf,
        /// The parser's error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A setting holds a value outside its accepted range.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        /// The offending setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// No directory was configured and the platform offers none.
    #[error("could not determine the {purpose} directory")]
    NoDirectory {
        /// Which directory was wanted.
        purpose: &'static str,
    },

    /// A platform directory is not valid UTF-8.
    #[error("{purpose} directory is not valid UTF-8: {}", .path.display())]
    NonUtf8Path {
        /// Which directory was wanted.
        purpose: &'static str,
        /// The directory as reported by the platform.
        path: PathBuf,
    },
}

/// Settings for one updater installation.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Name used for the platform cache directory and default package name.
    pub app_name: String,
    /// `User-Agent` header override. Defaults to `<app_name>/<version>`.
    pub user_agent: Option<String>,
    /// Seconds allowed for fetching a manifest or query response.
    pub query_timeout_secs: u64,
    /// Seconds allowed for the whole package download.
    pub download_timeout_secs: u64,
    /// Download directory override.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Manifest location used when no source is given on the command line.
    pub manifest_url: Option<String>,
    /// Query service base URL used when no source is given on the command line.
    pub query_url: Option<String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_owned(),
            user_agent: None,
            query_timeout_secs: 10,
            download_timeout_secs: 300,
            cache_dir: None,
            manifest_url: None,
            query_url: None,
        }
    }
}

impl UpdaterConfig {
    /// Parse configuration from TOML text.
    ///
    /// `origin` names the source in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
    /// [`ConfigError::Invalid`] for out-of-range values.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use selfupdate::config::UpdaterConfig;
    ///
    /// let config = UpdaterConfig::from_toml("app_name = \"demo\"\n", Utf8Path::new("inline"))?;
    /// assert_eq!(config.app_name, "demo");
    /// assert_eq!(config.query_timeout_secs, 10);
    /// # Ok::<(), selfupdate::config::ConfigError>(())
    /// ```
    pub fn from_toml(source: &str, origin: &Utf8Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|err| ConfigError::Parse {
            path: origin.to_owned(),
            source: Box::new(err),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or any error
    /// from [`Self::from_toml`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&source, path)
    }

    /// Load the explicit file when given, otherwise the default file when it
    /// exists, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::load`]. A missing default file is not
    /// an error; a missing explicit file is.
    pub fn discover(explicit: Option<&Utf8Path>, dirs: &dyn BaseDirs) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path(dirs) {
            Some(path) if path.is_file() => {
                log::debug!("loading configuration from {path}");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// The `User-Agent` sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.app_name, env!("CARGO_PKG_VERSION")))
    }

    /// Timeout for manifest and query requests.
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Time budget for one package download.
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Resolve the download directory: the configured one, or the platform
    /// cache directory joined with `app_name`.
    ///
    /// # Errors
    ///
    /// Returns an error when nothing is configured and the platform has no
    /// usable cache directory.
    pub fn cache_dir(&self, dirs: &dyn BaseDirs) -> Result<Utf8PathBuf, ConfigError> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let base = dirs
            .cache_dir()
            .ok_or(ConfigError::NoDirectory { purpose: "cache" })?;
        let base = Utf8PathBuf::try_from(base).map_err(|err| ConfigError::NonUtf8Path {
            purpose: "cache",
            path: err.into_path_buf(),
        })?;
        Ok(base.join(&self.app_name))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "app_name",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.app_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "app_name",
                reason: "must not contain path separators".to_owned(),
            });
        }
        for (field, value) in [
            ("query_timeout_secs", self.query_timeout_secs),
            ("download_timeout_secs", self.download_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least one second".to_owned(),
                });
            }
        }
        Ok(())
    }
}

/// The default configuration file for this platform, if it can be named.
#[must_use]
pub fn default_config_path(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    let base = Utf8PathBuf::try_from(dirs.config_dir()?).ok()?;
    Some(base.join(DEFAULT_APP_NAME).join(CONFIG_FILE_NAME))
}
