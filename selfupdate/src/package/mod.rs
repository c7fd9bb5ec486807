//! Package manifest model and policy resolution.
//!
//! Everything here is pure: documents are parsed into validated values and
//! resolved without touching the network or the filesystem.
//!
//! # Sub-modules
//!
//! - [`error`] - Validation errors for manifest documents.
//! - [`hash`] - Hash algorithm names and the `HexDigest` newtype.
//! - [`manifest`] - Validated manifest (`Manifest`).
//! - [`manifest_parser`] - JSON and YAML manifest deserialization.
//! - [`package_info`] - Per-version package metadata (`PackageInfo`).
//! - [`policy`] - Delivery policies and `resolve`.
//! - [`query`] - Server query responses and `UpdatePlan`.
//! - [`range`] - Version range expressions (`RangeExpr`).
//! - [`version`] - Dotted numeric versions (`Version`).

pub mod error;
pub mod hash;
pub mod manifest;
pub mod manifest_parser;
pub mod package_info;
pub mod policy;
pub mod query;
pub mod range;
mod scalar;
pub mod version;
