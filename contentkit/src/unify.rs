//! Merge an integration/script package folder into a single YAML.
//!
//! A package folder holds `<Name>.yml` next to its code file, and for
//! integrations `<Name>_image.png` and `<Name>_description.md`. The server
//! only accepts the unified form, with all of these embedded in the YAML.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use thiserror::Error;

use crate::document::{ContentDocument, DocumentError};
use crate::kind::ContentKind;
use crate::objects::ContentObject;

/// Suffix of unified YAMLs left next to package sources; never a package YAML.
pub const UNIFIED_SUFFIX: &str = "_unified.yml";

const IMAGE_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Error)]
pub enum UnifyError {
    #[error("{kind} objects cannot be unified")]
    NotUnifiable { kind: ContentKind },

    #[error("{} has no usable script type", path.display())]
    UnknownScriptType { path: PathBuf },

    #[error("no {extension} code file found in {}", dir.display())]
    MissingCode { dir: PathBuf, extension: &'static str },

    #[error("{} has a malformed 'script' section", path.display())]
    MalformedScript { path: PathBuf },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Build the unified document for a package YAML.
///
/// # Errors
///
/// Returns an error if the object is not an integration/script, its code
/// file cannot be located, or a package file cannot be read.
pub fn unify(object: &ContentObject) -> Result<ContentDocument, UnifyError> {
    let kind = object.kind();
    if !kind.is_unifiable() {
        return Err(UnifyError::NotUnifiable { kind });
    }

    let yml_path = object.path();
    let package_dir = yml_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = yml_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut document = object.document().clone();
    let script_type = match kind {
        ContentKind::Integration => document
            .get("script")
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str),
        _ => document.get_str("type"),
    };
    let extension = script_type
        .and_then(code_extension)
        .ok_or_else(|| UnifyError::UnknownScriptType {
            path: yml_path.to_path_buf(),
        })?;

    let code_path = find_code_file(package_dir, &stem, extension)?;
    let code = read_to_string(&code_path)?;
    tracing::debug!(code = %code_path.display(), "embedding code file");

    if kind == ContentKind::Integration {
        let Some(Value::Object(script)) = document.get_mut("script") else {
            return Err(UnifyError::MalformedScript {
                path: yml_path.to_path_buf(),
            });
        };
        script.insert("script".to_owned(), Value::String(code));

        let image_path = package_dir.join(format!("{stem}_image.png"));
        if image_path.is_file() {
            let bytes = std::fs::read(&image_path).map_err(|source| UnifyError::Io {
                path: image_path.clone(),
                source,
            })?;
            let encoded = format!("{IMAGE_PREFIX}{}", STANDARD.encode(bytes));
            document.insert("image", Value::String(encoded));
        }

        let description_path = package_dir.join(format!("{stem}_description.md"));
        if description_path.is_file() {
            let description = read_to_string(&description_path)?;
            document.insert("detaileddescription", Value::String(description));
        }
    } else {
        document.insert("script", Value::String(code));
    }

    Ok(document)
}

/// Unify `object` and write the result into `output_dir`.
///
/// The file is named `integration-<Name>.yml` or `script-<Name>.yml`.
///
/// # Errors
///
/// Returns an error if unification fails or the file cannot be written.
pub fn write_unified(object: &ContentObject, output_dir: &Path) -> Result<PathBuf, UnifyError> {
    let document = unify(object)?;
    let prefix = match object.kind() {
        ContentKind::Integration => "integration",
        _ => "script",
    };
    let stem = object
        .path()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = output_dir.join(format!("{prefix}-{stem}.yml"));
    let yaml = document.to_yaml_string()?;
    std::fs::write(&target, yaml).map_err(|source| UnifyError::Io {
        path: target.clone(),
        source,
    })?;
    Ok(target)
}

fn code_extension(script_type: &str) -> Option<&'static str> {
    match script_type {
        "python" | "python2" | "python3" => Some("py"),
        "javascript" => Some("js"),
        "powershell" => Some("ps1"),
        _ => None,
    }
}

fn is_test_file(name: &str) -> bool {
    name.ends_with("_test.py")
        || name.ends_with(".Tests.ps1")
        || name.ends_with("_test.js")
        || name == "conftest.py"
}

/// Prefer `<stem>.<ext>`; otherwise the first non-test file with the extension.
fn find_code_file(dir: &Path, stem: &str, extension: &'static str) -> Result<PathBuf, UnifyError> {
    let preferred = dir.join(format!("{stem}.{extension}"));
    if preferred.is_file() {
        return Ok(preferred);
    }

    let entries = std::fs::read_dir(dir).map_err(|source| UnifyError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !is_test_file(n))
        })
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| UnifyError::MissingCode {
            dir: dir.to_path_buf(),
            extension,
        })
}

fn read_to_string(path: &Path) -> Result<String, UnifyError> {
    std::fs::read_to_string(path).map_err(|source| UnifyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
