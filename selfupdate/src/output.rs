//! User-facing messages for the updater CLI.
//!
//! Messages are plain strings so the binary, the tests, and embedding
//! applications all print the same wording.

use crate::error::UpdateError;
use crate::install::RecoveryAction;
use crate::orchestrator::UpdateOutcome;
use crate::package::query::UpdatePlan;
use crate::package::version::Version;
use camino::Utf8Path;
use std::io::Write;

/// Message printed when no update applies.
pub const UP_TO_DATE: &str = "up to date";

/// Format the result of a completed update attempt.
///
/// # Example
///
/// ```
/// use selfupdate::orchestrator::UpdateOutcome;
/// use selfupdate::output::outcome_message;
///
/// assert_eq!(outcome_message(&UpdateOutcome::UpToDate), "up to date");
/// ```
#[must_use]
pub fn outcome_message(outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::UpToDate => UP_TO_DATE.to_owned(),
        UpdateOutcome::Installed { version, .. } => format!("update installed, version {version}"),
    }
}

/// Format a failed update attempt as `update failed: <kind>: <detail>`.
#[must_use]
pub fn failure_message(err: &UpdateError) -> String {
    format!("update failed: {}: {err}", err.kind())
}

/// Describe the plan found by a check.
#[must_use]
pub fn plan_message(current: &Version, plan: Option<&UpdatePlan>) -> String {
    let Some(plan) = plan else {
        return UP_TO_DATE.to_owned();
    };
    let package = plan.package();
    let mut message = format!(
        "update available: {current} -> {} ({} bytes)",
        plan.version(),
        package.size()
    );
    if plan.force_update() {
        message.push_str(", mandatory");
    }
    if !package.title().is_empty() {
        message.push_str("\n  ");
        message.push_str(package.title());
    }
    if !package.description().is_empty() {
        message.push_str("\n  ");
        message.push_str(package.description());
    }
    message
}

/// Describe what a recovery pass did to `target`.
#[must_use]
pub fn recovery_message(target: &Utf8Path, action: &RecoveryAction) -> String {
    format!("{target}: {action}")
}

/// Reports download progress in ten percent steps.
#[derive(Debug, Default)]
pub struct ProgressMeter {
    last_step: Option<u64>,
}

impl ProgressMeter {
    /// Create a meter that has reported nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a line to print when `received` crosses the next ten percent
    /// step of `total`.
    ///
    /// # Example
    ///
    /// ```
    /// use selfupdate::output::ProgressMeter;
    ///
    /// let mut meter = ProgressMeter::new();
    /// assert_eq!(meter.advance(0, 200).as_deref(), Some("downloaded 0 of 200 bytes (0%)"));
    /// assert_eq!(meter.advance(10, 200), None);
    /// assert!(meter.advance(20, 200).is_some());
    /// ```
    pub fn advance(&mut self, received: u64, total: u64) -> Option<String> {
        let percent = if total == 0 {
            100
        } else {
            received.saturating_mul(100) / total
        };
        let step = percent.min(100) / 10;
        if self.last_step.is_some_and(|last| last >= step) {
            return None;
        }
        self.last_step = Some(step);
        Some(format!("downloaded {received} of {total} bytes ({percent}%)"))
    }
}

/// Write one line to `out`, ignoring write failures.
pub fn write_line(out: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(out, "{message}").is_err() {
        // Best-effort reporting; ignore write failures.
    }
}
