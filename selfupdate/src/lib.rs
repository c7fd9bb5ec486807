//! Policy-driven self-update library.
//!
//! A manifest lists the published versions of one package and an ordered set
//! of policies mapping installed-version ranges to a target version. This
//! crate resolves the target for a running version, downloads the package
//! while hashing it, verifies every declared digest, and atomically replaces
//! the installed file with rollback on failure. It is used by the
//! `selfupdate` CLI binary and can be embedded in applications that update
//! themselves.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - TOML configuration with platform defaults
//! - [`digest`] - Single-pass multi-algorithm hashing
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Aggregate error type with stable failure tags
//! - [`extraction`] - Taking the replacement file out of a package
//! - [`fetch`] - Package probing, streaming, and verified download
//! - [`install`] - Staged, atomic replacement with rollback and recovery
//! - [`orchestrator`] - One complete update attempt
//! - [`output`] - User-facing messages and progress reporting
//! - [`package`] - Manifest model, version ranges, and policy resolution
//! - [`verify`] - Digest comparison against declared values

pub mod cli;
pub mod config;
pub mod digest;
pub mod dirs;
pub mod error;
pub mod extraction;
pub mod fetch;
pub mod install;
pub mod orchestrator;
pub mod output;
pub mod package;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
