//! # contentkit-validator
//!
//! Rule-based validators for content pack files, plus a filesystem strategy
//! that walks a tree and runs the matching validator for each file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use contentkit_validator::{validate_fs, FsSourceConfig, ValidationConfig};
//!
//! let mut fs_config = FsSourceConfig::default();
//! fs_config.paths = vec![PathBuf::from("Packs/HelloWorld")];
//!
//! let report = validate_fs(&fs_config, &ValidationConfig::default()).unwrap();
//! println!("Files scanned: {}", report.scanned_files);
//! println!("Validation errors: {}", report.errors_count());
//! println!("OK: {}", report.ok);
//! ```

mod config;
mod error;
pub mod image;
pub mod incident_field;
pub mod mdx;
pub mod output;
pub mod pack_unique_files;
pub mod readme;
mod report;
mod strategy;


pub use config::{
    DEFAULT_MDX_SERVER_PORT, FsSourceConfig, ReadmeConfig, ReadmeMode, ValidationConfig,
};
pub use error::{Findings, ScanError, ScanErrorKind, ValidationError};
pub use image::{DefaultImages, IMAGE_MAX_SIZE, ImageValidator};
pub use incident_field::{FieldGroup, IncidentFieldValidator};
pub use mdx::{MdxError, MdxSession, RenderOutcome, are_modules_installed_for_verify};
pub use pack_unique_files::PackUniqueFilesValidator;
pub use readme::ReadMeValidator;
pub use report::ValidationReport;

use std::path::Path;

use anyhow::Context;
use contentkit::kind::{PACK_METADATA_FILE_NAME, README_FILE_NAME};
use contentkit::{ContentDocument, ContentKind, DocumentFormat};

use serde_json::{Map, Value};
use strategy::fs::{
    find_files, has_package_yaml, is_integration_image, read_file_bounded, relative_to_root,
    trees_differ,
};

/// Shared state for one `validate_fs` run.
struct Run<'a> {
    fs_config: &'a FsSourceConfig,
    validation_config: &'a ValidationConfig,
    defaults: DefaultImages,
    session: MdxSession,
}

/// Validate content files and packs on disk.
///
/// This is the primary public API.
///
/// # Errors
///
/// Returns an error if `fs_config.paths` is empty, a provided path does not
/// exist, or an extra default image cannot be read. Per-file read and parse
/// failures are reported in `report.scan_errors`, never silently discarded.
pub fn validate_fs(
    fs_config: &FsSourceConfig,
    validation_config: &ValidationConfig,
) -> anyhow::Result<ValidationReport> {
    if fs_config.paths.is_empty() {
        anyhow::bail!("No paths provided for validation");
    }

    for path in &fs_config.paths {
        if !path.exists() {
            anyhow::bail!("Path does not exist: {}", path.display());
        }
    }

    let discovery = find_files(fs_config);
    let mut scan_errors = discovery.scan_errors;
    let mut validation_errors = Vec::new();
    let mut scanned_files: usize = 0;
    // Discovery-stage failures count as failed files upfront.
    let mut failed_files: usize = scan_errors.len();

    let mut run = Run {
        fs_config,
        validation_config,
        defaults: DefaultImages::with_files(&validation_config.extra_default_images)
            .context("Failed to read extra default images")?,
        session: MdxSession::new(validation_config.readme.clone()),
    };

    for pack in &discovery.packs {
        tracing::info!(pack = %pack.display(), "validating pack unique files");
        let mut validator = PackUniqueFilesValidator::new(pack);
        if let Some(previous) = run.previous_pack_metadata(pack) {
            validator = validator.with_previous_metadata(previous);
        }
        validator.validate_pack_unique_files();
        validation_errors.extend(validator.into_errors());
        scanned_files += 1;
    }

    for file_path in &discovery.files {
        if scanned_files + failed_files >= fs_config.max_files {
            scan_errors.push(ScanError::new(
                file_path,
                ScanErrorKind::LimitExceeded,
                format!(
                    "Scan aborted: max_files limit ({}) reached; remaining files not scanned",
                    fs_config.max_files
                ),
            ));
            failed_files += 1;
            break;
        }

        match run.validate_file(file_path) {
            Ok(errors) => {
                scanned_files += 1;
                validation_errors.extend(errors);
            }
            Err(scan_error) => {
                failed_files += 1;
                scan_errors.push(scan_error);
            }
        }
    }

    run.session.shutdown();

    let ok = validation_errors.is_empty() && scan_errors.is_empty();
    Ok(ValidationReport {
        scanned_files,
        failed_files,
        ok,
        validation_errors,
        scan_errors,
    })
}

impl Run<'_> {
    fn validate_file(&mut self, file_path: &Path) -> Result<Vec<ValidationError>, ScanError> {
        let extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "png" => {
                if !is_integration_image(file_path) || has_package_yaml(file_path) {
                    return Ok(Vec::new());
                }
                let mut validator = ImageValidator::new(file_path, &self.defaults);
                validator.is_valid();
                Ok(validator.into_errors())
            }
            "md" => {
                if file_path.file_name().is_none_or(|n| n != README_FILE_NAME) {
                    return Ok(Vec::new());
                }
                let content = read_file_bounded(file_path, self.fs_config.max_file_size)?;
                let mut validator = ReadMeValidator::from_content(file_path, content);
                validator.is_valid_file(&mut self.session);
                Ok(validator.into_errors())
            }
            _ => self.validate_document(file_path),
        }
    }

    fn validate_document(&self, file_path: &Path) -> Result<Vec<ValidationError>, ScanError> {
        let Some(format) = DocumentFormat::for_path(file_path) else {
            return Ok(Vec::new());
        };
        let content = read_file_bounded(file_path, self.fs_config.max_file_size)?;
        let document = ContentDocument::parse(&content, format, file_path).map_err(|e| {
            ScanError::new(file_path, ScanErrorKind::ParseError, e.to_string())
        })?;

        let kind = ContentKind::detect(file_path, Some(&document));
        tracing::debug!(file = %file_path.display(), ?kind, "validating");
        match kind {
            Some(ContentKind::IncidentField) => {
                let previous = self.previous_document(file_path);
                let mut validator = IncidentFieldValidator::new(file_path, document, previous);
                validator.is_valid_file();
                validator.is_backward_compatible();
                Ok(validator.into_errors())
            }
            Some(ContentKind::Integration) if format == DocumentFormat::Yaml => {
                let mut validator = ImageValidator::new(file_path, &self.defaults);
                validator.is_valid();
                Ok(validator.into_errors())
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Metadata of `pack` under `previous_root`, when the pack existed there
    /// and has changed since.
    fn previous_pack_metadata(&self, pack: &Path) -> Option<Map<String, Value>> {
        let previous_root = self.validation_config.previous_root.as_ref()?;
        let root = self.fs_config.paths.iter().find(|root| pack.starts_with(root))?;
        let previous_pack = previous_root.join(pack.strip_prefix(root).ok()?);
        let metadata_path = previous_pack.join(PACK_METADATA_FILE_NAME);
        if !metadata_path.is_file() {
            return None;
        }
        if !trees_differ(pack, &previous_pack) {
            tracing::debug!(pack = %pack.display(), "pack unchanged since the previous revision");
            return None;
        }

        let parsed = std::fs::read_to_string(&metadata_path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(Value::Object(metadata)) => Some(metadata),
            Ok(_) => {
                tracing::warn!(file = %metadata_path.display(), "ignoring previous pack metadata that is not an object");
                None
            }
            Err(e) => {
                tracing::warn!(file = %metadata_path.display(), "ignoring unreadable previous pack metadata: {e}");
                None
            }
        }
    }

    /// The same file under `previous_root`, if it existed there.
    fn previous_document(&self, file_path: &Path) -> Option<ContentDocument> {
        let previous_root = self.validation_config.previous_root.as_ref()?;
        let relative = relative_to_root(file_path, &self.fs_config.paths)?;
        let candidate = previous_root.join(relative);
        if !candidate.is_file() {
            return None;
        }
        match ContentDocument::load(&candidate) {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!(file = %candidate.display(), "ignoring unreadable previous version: {e}");
                None
            }
        }
    }
}
