//! Validation report types.

use serde::Serialize;

use crate::error::{ScanError, ValidationError};

/// Result of a validation run.
///
/// A non-empty `scan_errors` means some files were never validated; callers
/// must treat that as a failure regardless of `validation_errors`.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct ValidationReport {
    /// Number of files (and pack directories) successfully read and checked.
    pub scanned_files: usize,
    /// Number of files that could not be scanned (read/parse failures).
    pub failed_files: usize,
    /// Whether every check passed AND no scan errors occurred.
    pub ok: bool,
    pub validation_errors: Vec<ValidationError>,
    pub scan_errors: Vec<ScanError>,
}

impl ValidationReport {
    /// Total number of files attempted (scanned + failed).
    #[must_use]
    pub fn files_attempted(&self) -> usize {
        self.scanned_files + self.failed_files
    }

    #[must_use]
    pub fn errors_count(&self) -> usize {
        self.validation_errors.len()
    }
}
