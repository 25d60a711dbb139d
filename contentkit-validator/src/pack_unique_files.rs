//! Pack-level files: `.secrets-ignore`, `.pack-ignore`, `README.md` and
//! `pack_metadata.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use contentkit::ContentVersion;
use contentkit::document::is_truthy;
use contentkit::kind::{PACK_METADATA_FILE_NAME, README_FILE_NAME};
use serde_json::{Map, Value};

use crate::error::{Findings, ValidationError};

pub const SECRETS_IGNORE_FILE_NAME: &str = ".secrets-ignore";
pub const PACK_IGNORE_FILE_NAME: &str = ".pack-ignore";

/// Pack whose metadata is generated and never checked.
pub const API_MODULES_PACK: &str = "ApiModules";

/// Fields every `pack_metadata.json` must declare.
pub const PACK_METADATA_FIELDS: &[&str] = &[
    "name",
    "description",
    "support",
    "currentVersion",
    "author",
    "url",
    "categories",
    "tags",
    "useCases",
    "keywords",
];

/// Format of the `created` timestamp.
pub const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const LIST_FIELDS: &[&str] = &["keywords", "tags", "categories", "useCases"];
const ALLOWED_CERTIFICATIONS: &[&str] = &["certified", "verified"];
const SUPPORTED_CONTRIBUTORS: &[&str] = &["partner", "developer"];
const PLACEHOLDER: &str = "fill mandatory field";

/// Version a pack without `currentVersion` is taken to have.
const DEFAULT_PACK_VERSION: &str = "0.0.0";

/// Validates the unique files of one pack directory.
#[derive(Debug)]
pub struct PackUniqueFilesValidator {
    pack_path: PathBuf,
    previous_metadata: Option<Map<String, Value>>,
    findings: Findings,
}

impl PackUniqueFilesValidator {
    #[must_use]
    pub fn new(pack_path: impl Into<PathBuf>) -> Self {
        let pack_path = pack_path.into();
        Self {
            findings: Findings::new(&pack_path),
            pack_path,
            previous_metadata: None,
        }
    }

    /// Metadata of the previous revision of a pack that has changed since.
    /// Its `currentVersion` must be raised.
    #[must_use]
    pub fn with_previous_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.previous_metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn pack_name(&self) -> String {
        self.pack_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        self.findings.errors()
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<ValidationError> {
        self.findings.into_errors()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    /// Run every pack check and return the collected errors.
    pub fn validate_pack_unique_files(&mut self) -> &[ValidationError] {
        self.validate_secrets_file();
        self.validate_pack_ignore_file();
        self.validate_readme_file();
        if self.pack_name().contains(API_MODULES_PACK) {
            tracing::debug!(pack = %self.pack_path.display(), "skipping metadata checks");
        } else {
            self.validate_pack_meta_file();
        }
        self.findings.errors()
    }

    pub fn validate_secrets_file(&mut self) -> bool {
        self.is_readable_pack_file(SECRETS_IGNORE_FILE_NAME)
    }

    pub fn validate_pack_ignore_file(&mut self) -> bool {
        self.is_readable_pack_file(PACK_IGNORE_FILE_NAME)
    }

    pub fn validate_readme_file(&mut self) -> bool {
        if self.pack_path.join(README_FILE_NAME).is_file() {
            return true;
        }
        self.findings.fail(
            "validate_readme_file",
            format!("{README_FILE_NAME} file does not exist, create one in the root of the pack"),
        )
    }

    pub fn validate_pack_meta_file(&mut self) -> bool {
        let Some(content) = self.read_pack_file(PACK_METADATA_FILE_NAME) else {
            return false;
        };
        let metadata = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(metadata)) => metadata,
            Ok(_) => {
                return self.metadata_error(format!(
                    "Pack metadata {PACK_METADATA_FILE_NAME} should be a dictionary."
                ));
            }
            Err(e) => {
                return self.metadata_error(format!(
                    "Could not parse {PACK_METADATA_FILE_NAME} file contents to json format: {e}"
                ));
            }
        };
        let structure_valid = self.is_pack_meta_structure_valid(&metadata);
        let support_valid = self.is_valid_contributor_pack_support_details(&metadata);
        structure_valid && support_valid && self.validate_version_bump(&metadata)
    }

    /// `currentVersion` is higher than in the previous revision, when one
    /// was given.
    pub fn validate_version_bump(&mut self, metadata: &Map<String, Value>) -> bool {
        let Some(previous) = &self.previous_metadata else {
            return true;
        };
        let old_raw = previous
            .get("currentVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PACK_VERSION)
            .to_owned();
        let new_raw = metadata
            .get("currentVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PACK_VERSION);

        if let (Ok(old), Ok(new)) = (ContentVersion::parse(&old_raw), ContentVersion::parse(new_raw))
            && old < new
        {
            return true;
        }
        self.findings.fail(
            "validate_version_bump",
            format!(
                "The pack version (currently: {old_raw}) needs to be raised. Update the \
                 \"currentVersion\" field in {PACK_METADATA_FILE_NAME}."
            ),
        )
    }

    /// Structural rules; stops at the first violation.
    fn is_pack_meta_structure_valid(&mut self, metadata: &Map<String, Value>) -> bool {
        let missing: Vec<&str> = PACK_METADATA_FIELDS
            .iter()
            .copied()
            .filter(|field| !metadata.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return self.metadata_error(format!(
                "{PACK_METADATA_FILE_NAME} - Missing fields in the pack metadata: {}",
                missing.join(", ")
            ));
        }

        if !is_filled(metadata.get("name")) {
            return self.metadata_error(
                "Pack metadata name field is either missing or invalid. Please fill valid pack name.",
            );
        }
        if !is_filled(metadata.get("description")) {
            return self.metadata_error(
                "Pack metadata description field is either missing or invalid.",
            );
        }

        if metadata.get("dependencies").is_some_and(|d| !d.is_object()) {
            return self.metadata_error(format!(
                "{PACK_METADATA_FILE_NAME} - The dependencies field in the pack must be a dictionary."
            ));
        }

        let created = metadata
            .get("created")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if NaiveDateTime::parse_from_str(created, ISO_TIMESTAMP_FORMAT).is_err() {
            let suggestion = suggest_timestamp(created)
                .map(|s| format!("\nSuggested change: {s}"))
                .unwrap_or_default();
            return self.metadata_error(format!(
                "The field \"created\" should be in the following format: \
                 YYYY-MM-DDThh:mm:ssZ, found {created}.{suggestion}"
            ));
        }

        for field in LIST_FIELDS {
            let single_empty = metadata
                .get(*field)
                .and_then(Value::as_array)
                .is_some_and(|values| values.len() == 1 && !is_truthy(&values[0]));
            if single_empty {
                return self.metadata_error(format!(
                    "{PACK_METADATA_FILE_NAME} - Empty value in the {field} field."
                ));
            }
        }

        if let Some(certification) = metadata.get("certification").and_then(Value::as_str)
            && !certification.is_empty()
            && !ALLOWED_CERTIFICATIONS.contains(&certification)
        {
            return self.metadata_error(format!(
                "Pack metadata {PACK_METADATA_FILE_NAME} - certification field should be \
                 'certified' or 'verified'."
            ));
        }

        true
    }

    /// Partner and developer packs need a support URL or email.
    fn is_valid_contributor_pack_support_details(&mut self, metadata: &Map<String, Value>) -> bool {
        let support = metadata.get("support").and_then(Value::as_str).unwrap_or_default();
        if !SUPPORTED_CONTRIBUTORS.contains(&support) {
            return true;
        }
        let has_url = metadata.get("url").is_some_and(is_truthy);
        let has_email = metadata.get("email").is_some_and(is_truthy);
        if has_url || has_email {
            return true;
        }
        self.metadata_error("Contributed packs must include email or url.")
    }

    fn is_readable_pack_file(&mut self, file_name: &str) -> bool {
        self.read_pack_file(file_name).is_some()
    }

    fn read_pack_file(&mut self, file_name: &str) -> Option<String> {
        let path = self.pack_path.join(file_name);
        if !path.is_file() {
            self.findings.fail(
                "pack_file_exists",
                format!("\"{file_name}\" file does not exist, create one in the root of the pack"),
            );
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                self.findings.fail(
                    "pack_file_exists",
                    format!("Couldn't open pack file {file_name}: {e}"),
                );
                None
            }
        }
    }

    fn metadata_error(&mut self, message: impl Into<String>) -> bool {
        self.findings.fail("validate_pack_meta_file", message)
    }

    #[must_use]
    pub fn pack_path(&self) -> &Path {
        &self.pack_path
    }
}

fn is_filled(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty() && !s.to_lowercase().contains(PLACEHOLDER))
}

/// Reformat a timestamp written in another common layout.
fn suggest_timestamp(raw: &str) -> Option<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc().format(ISO_TIMESTAMP_FORMAT).to_string());
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(parsed.format(ISO_TIMESTAMP_FORMAT).to_string());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.format(ISO_TIMESTAMP_FORMAT).to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn metadata() -> Value {
        json!({
            "name": "Echo",
            "description": "Echoes things",
            "support": "xsoar",
            "currentVersion": "1.0.0",
            "author": "Cortex XSOAR",
            "url": "https://www.paloaltonetworks.com/cortex",
            "email": "",
            "created": "2020-04-14T00:00:00Z",
            "categories": ["Utilities"],
            "tags": [],
            "useCases": [],
            "keywords": []
        })
    }

    fn pack(tmp: &TempDir, name: &str, metadata: &Value) -> PathBuf {
        let dir = tmp.path().join("Packs").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SECRETS_IGNORE_FILE_NAME), "").unwrap();
        fs::write(dir.join(PACK_IGNORE_FILE_NAME), "").unwrap();
        fs::write(dir.join(README_FILE_NAME), "# Echo\n").unwrap();
        fs::write(
            dir.join(PACK_METADATA_FILE_NAME),
            serde_json::to_string_pretty(metadata).unwrap(),
        )
        .unwrap();
        dir
    }

    fn with(overrides: &Value) -> Value {
        let mut base = metadata();
        if let (Some(map), Some(extra)) = (base.as_object_mut(), overrides.as_object()) {
            for (k, v) in extra {
                if v.is_null() {
                    map.remove(k);
                } else {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
        base
    }

    #[test]
    fn test_complete_pack_is_valid() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &metadata());
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(v.validate_pack_unique_files().is_empty(), "{:?}", v.errors());
        assert!(v.is_valid());
    }

    #[test]
    fn test_missing_unique_files() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &metadata());
        fs::remove_file(dir.join(SECRETS_IGNORE_FILE_NAME)).unwrap();
        fs::remove_file(dir.join(README_FILE_NAME)).unwrap();

        let mut v = PackUniqueFilesValidator::new(dir);
        let errors = v.validate_pack_unique_files();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains(".secrets-ignore"));
        assert!(errors[1].message.contains("README.md"));
    }

    #[test]
    fn test_missing_metadata_fields() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "keywords": null, "tags": null })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
        assert!(v.errors()[0].message.contains("tags, keywords"));
    }

    #[test]
    fn test_placeholder_name_and_description() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "name": "Fill Mandatory Field" })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
        assert!(v.errors()[0].message.contains("name field"));

        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "description": "" })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
    }

    #[test]
    fn test_metadata_must_be_json_object() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &json!(["not", "a", "dict"]));
        let mut v = PackUniqueFilesValidator::new(&dir);
        assert!(!v.validate_pack_meta_file());
        assert!(v.errors()[0].message.contains("should be a dictionary"));

        fs::write(dir.join(PACK_METADATA_FILE_NAME), "{ nope").unwrap();
        let mut v = PackUniqueFilesValidator::new(&dir);
        assert!(!v.validate_pack_meta_file());
        assert!(v.errors()[0].message.contains("json format"));
    }

    #[test]
    fn test_dependencies_must_be_object() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "dependencies": ["Base"] })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
    }

    #[test]
    fn test_created_timestamp_format_with_suggestion() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(
            &tmp,
            "Echo",
            &with(&json!({ "created": "2020-04-14T00:00:00.123456" })),
        );
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
        assert!(
            v.errors()[0]
                .message
                .contains("Suggested change: 2020-04-14T00:00:00Z")
        );
    }

    #[test]
    fn test_missing_created_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "created": null })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
        assert_eq!(v.errors().len(), 1);
        assert!(v.errors()[0].message.contains("found ."));
        assert!(!v.errors()[0].message.contains("Suggested change"));
    }

    #[test]
    fn test_single_empty_list_value() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "tags": [""] })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
        assert!(v.errors()[0].message.contains("Empty value in the tags field"));

        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "keywords": [0] })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
        assert!(v.errors()[0].message.contains("Empty value in the keywords field"));
    }

    #[test]
    fn test_version_bump_against_previous_metadata() {
        let previous = |version: &str| {
            let mut old = metadata();
            old["currentVersion"] = json!(version);
            old.as_object().unwrap().clone()
        };

        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "currentVersion": "1.0.1" })));
        let mut v = PackUniqueFilesValidator::new(&dir).with_previous_metadata(previous("1.0.0"));
        assert!(v.validate_pack_meta_file(), "{:?}", v.errors());

        let mut v = PackUniqueFilesValidator::new(&dir).with_previous_metadata(previous("1.0.1"));
        assert!(!v.validate_pack_meta_file());
        assert_eq!(v.errors()[0].check, "validate_version_bump");
        assert!(v.errors()[0].message.contains("(currently: 1.0.1)"));

        let mut v = PackUniqueFilesValidator::new(&dir).with_previous_metadata(previous("1.2.0"));
        assert!(!v.validate_pack_meta_file());

        let mut old = previous("1.0.0");
        old.remove("currentVersion");
        let mut v = PackUniqueFilesValidator::new(&dir).with_previous_metadata(old);
        assert!(v.validate_pack_meta_file(), "{:?}", v.errors());
    }

    #[test]
    fn test_version_bump_skipped_when_structure_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "description": "" })));
        let previous = metadata().as_object().unwrap().clone();
        let mut v = PackUniqueFilesValidator::new(dir).with_previous_metadata(previous);
        assert!(!v.validate_pack_meta_file());
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors()[0].check, "validate_pack_meta_file");
    }

    #[test]
    fn test_certification_values() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "certification": "approved" })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());

        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "certification": "verified" })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(v.validate_pack_meta_file());
    }

    #[test]
    fn test_partner_pack_needs_url_or_email() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "Echo", &with(&json!({ "support": "partner", "url": "" })));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(!v.validate_pack_meta_file());
        assert!(v.errors()[0].message.contains("email or url"));

        let tmp = TempDir::new().unwrap();
        let dir = pack(
            &tmp,
            "Echo",
            &with(&json!({ "support": "developer", "url": "", "email": "dev@example.com" })),
        );
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(v.validate_pack_meta_file());
    }

    #[test]
    fn test_api_modules_skips_metadata() {
        let tmp = TempDir::new().unwrap();
        let dir = pack(&tmp, "ApiModules", &json!({}));
        let mut v = PackUniqueFilesValidator::new(dir);
        assert!(v.validate_pack_unique_files().is_empty());
    }
}
