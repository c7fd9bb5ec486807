//! Validation errors for manifest documents and their components.
//!
//! Every variant names the offending input and the rule it broke. All of
//! these are raised while a document is parsed, never during resolution.

use thiserror::Error;

/// Errors raised while parsing or validating a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The document is not well-formed JSON or YAML, or misses fields.
    #[error("malformed manifest document: {reason}")]
    Document {
        /// Parser diagnostic.
        reason: String,
    },

    /// A version token is not a dotted sequence of integers.
    #[error("invalid version \"{value}\": {reason}")]
    InvalidVersion {
        /// The rejected token.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// A range expression could not be parsed or denotes an empty interval.
    #[error("invalid range expression \"{value}\": {reason}")]
    InvalidRange {
        /// The rejected expression.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The package name cannot be used as a file name.
    #[error("invalid package name \"{name}\": {reason}")]
    InvalidPackageName {
        /// The rejected name.
        name: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The same version appears more than once in `versions`.
    #[error("duplicate version \"{version}\"")]
    DuplicateVersion {
        /// The repeated version key.
        version: String,
    },

    /// A policy targets a version that `versions` does not declare.
    #[error("policy {index} targets undeclared version \"{target}\"")]
    UnknownTarget {
        /// Zero-based policy position.
        index: usize,
        /// The missing target version.
        target: String,
    },

    /// A policy has no match expressions and can never apply.
    #[error("policy {index} has no match expressions")]
    EmptyPolicy {
        /// Zero-based policy position.
        index: usize,
    },

    /// A version declares no hash algorithm this build recognises.
    #[error("version \"{version}\" declares no recognised hash algorithm")]
    NoRecognisedHash {
        /// The offending version key.
        version: String,
    },

    /// One algorithm is declared twice under differently cased names.
    #[error("version \"{version}\" declares the {algorithm} digest more than once")]
    DuplicateHash {
        /// The offending version key.
        version: String,
        /// The repeated algorithm.
        algorithm: String,
    },

    /// A digest is not hex or has the wrong length for its algorithm.
    #[error("invalid {algorithm} digest: {reason}")]
    InvalidDigest {
        /// Algorithm the digest was declared for.
        algorithm: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// A package size of zero was declared.
    #[error("version \"{version}\" declares a zero package size")]
    ZeroSize {
        /// The offending version key.
        version: String,
    },

    /// A package URL is not an absolute `http`/`https` URI.
    #[error("invalid package url \"{url}\": {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The package format is not one this build can install.
    #[error("unsupported package format \"{value}\"; expected one of: {expected}")]
    UnsupportedFormat {
        /// The rejected format string.
        value: String,
        /// Comma-separated list of accepted formats.
        expected: String,
    },
}

/// Result type alias using [`ValidationError`].
pub type Result<T> = std::result::Result<T, ValidationError>;
