//! CLI argument definitions for the updater.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary focused on orchestration.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Check for, download, verify, and install application updates.
#[derive(Parser, Debug)]
#[command(name = "selfupdate")]
#[command(version, about)]
#[command(long_about = concat!(
    "Check for, download, verify, and install application updates.\n\n",
    "A manifest lists the published versions of a package and the policies ",
    "that move installed versions to a target. The first policy whose range ",
    "contains the running version decides the update. Packages are verified ",
    "against every declared digest before the installed file is swapped, and ",
    "a failed or interrupted install is rolled back to the previous file.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Check a manifest for the running version:\n",
    "    $ selfupdate check --current 1.0 --manifest https://example.com/app.yaml\n\n",
    "  Update an installed executable:\n",
    "    $ selfupdate update --current 1.0 --target /usr/local/bin/app \\\n",
    "        --manifest https://example.com/app.yaml\n\n",
    "  Ask a query service instead of reading the manifest locally:\n",
    "    $ selfupdate check --current 1.0 --query https://example.com/updates --package app\n\n",
    "  Answer a query from a manifest file:\n",
    "    $ selfupdate resolve --manifest app.yaml --current 1.0\n\n",
    "  Repair an interrupted install:\n",
    "    $ selfupdate recover --target /usr/local/bin/app",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file [default: platform config dir].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Report whether an update applies to the current version.
    Check(CheckArgs),

    /// Download, verify, and install the update for the current version.
    Update(UpdateArgs),

    /// Print the query response a server would return for a version.
    Resolve(ResolveArgs),

    /// Restore or clean up after an interrupted install.
    Recover(RecoverArgs),
}

/// Where update decisions come from.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceArgs {
    /// Manifest URL or file path [default: `manifest_url` from config].
    #[arg(long, value_name = "LOCATION", conflicts_with = "query")]
    pub manifest: Option<String>,

    /// Query service base URL [default: `query_url` from config].
    #[arg(long, value_name = "URL")]
    pub query: Option<String>,

    /// Package name sent to the query service [default: `app_name`].
    #[arg(long, value_name = "NAME")]
    pub package: Option<String>,
}

/// Arguments for the check command.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// The version currently installed.
    #[arg(short, long, value_name = "VERSION")]
    pub current: String,

    /// Update source.
    #[command(flatten)]
    pub source: SourceArgs,
}

/// Arguments for the update command.
#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// The version currently installed.
    #[arg(short, long, value_name = "VERSION")]
    pub current: String,

    /// The installed file to replace.
    #[arg(short, long, value_name = "PATH")]
    pub target: Utf8PathBuf,

    /// Update source.
    #[command(flatten)]
    pub source: SourceArgs,

    /// Download directory [default: platform cache dir].
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Seconds allowed for the download [default: `download_timeout_secs`].
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Commit without checking that the new file is a non-empty executable.
    #[arg(long)]
    pub skip_exec_check: bool,

    /// Name of the file to take from a zip package with several entries.
    #[arg(long, value_name = "NAME")]
    pub entry: Option<String>,
}

/// Arguments for the resolve command.
#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Manifest URL or file path.
    #[arg(short, long, value_name = "LOCATION")]
    pub manifest: String,

    /// The version to answer for.
    #[arg(short, long, value_name = "VERSION")]
    pub current: String,
}

/// Arguments for the recover command.
#[derive(Args, Debug, Clone)]
pub struct RecoverArgs {
    /// The installed file to inspect.
    #[arg(short, long, value_name = "PATH")]
    pub target: Utf8PathBuf,
}

impl Cli {
    /// Return the `log` level filter selected by `-v`/`-q`.
    #[must_use]
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
