//! Error types for content validation.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// The kind of scan-level failure that prevented a file from being validated.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScanErrorKind {
    /// An I/O error occurred while reading the file.
    IoError,
    /// The file exceeded the configured maximum size limit.
    FileTooLarge,
    /// The file content could not be parsed as JSON or YAML.
    ParseError,
    /// The file content is not valid UTF-8.
    InvalidEncoding,
    /// The resolved path is outside the scan root (symlink escape).
    OutsideRepository,
    /// The `max_files` limit was reached, truncating the scan.
    LimitExceeded,
    /// A directory traversal error (permission denied, loop detected, etc.).
    WalkError,
    /// An exclude glob pattern could not be parsed.
    InvalidExcludePattern,
}

/// A file that could not be validated at all.
///
/// Distinct from [`ValidationError`], which is a rule that ran and failed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct ScanError {
    pub file: PathBuf,
    pub kind: ScanErrorKind,
    pub message: String,
}

impl ScanError {
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, kind: ScanErrorKind, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn format_human_readable(&self) -> String {
        format!("{}: [scan error] {}", self.file.display(), self.message)
    }
}

/// A single rule failure in a content file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct ValidationError {
    /// File (or pack directory) the rule ran against
    pub file: PathBuf,
    /// Name of the failing check, e.g. `is_valid_cliname`
    pub check: &'static str,
    /// Human-readable error description
    pub message: String,
}

impl ValidationError {
    /// Format as `{file}: [{check}] {message}`.
    #[must_use]
    pub fn format_human_readable(&self) -> String {
        format!("{}: [{}] {}", self.file.display(), self.check, self.message)
    }
}

/// Errors collected by one validator for one file.
#[derive(Debug, Clone, Default)]
pub struct Findings {
    file: PathBuf,
    errors: Vec<ValidationError>,
}

impl Findings {
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            errors: Vec::new(),
        }
    }

    /// Record a failed check. Always returns `false` so callers can
    /// `return findings.fail(..)` from a predicate.
    pub fn fail(&mut self, check: &'static str, message: impl Into<String>) -> bool {
        let message = message.into();
        tracing::debug!(file = %self.file.display(), check, "{message}");
        self.errors.push(ValidationError {
            file: self.file.clone(),
            check,
            message,
        });
        false
    }

    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}
