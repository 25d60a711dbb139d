#![allow(clippy::unwrap_used)]
//! Integration tests for the upload and validate commands.
//!
//! The uploader runs against an in-memory `ContentClient` that records every
//! file it receives.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use contentkit::{ContentKind, ContentVersion};
use contentkit_cli::cli::{UploadArgs, ValidateArgs, run_upload, run_validate};
use contentkit_cli::upload::is_locked_rejection;
use contentkit_cli::{ClientError, ContentClient, UploadSummary, Uploader};
use serde_json::json;
use tempfile::TempDir;

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Received {
    kind: ContentKind,
    file_name: String,
    content: String,
}

struct FakeClient {
    version: ContentVersion,
    reject: Vec<&'static str>,
    /// Files refused as locked system items until their id is unlocked.
    locked: Vec<(&'static str, &'static str)>,
    unlocked: RefCell<Vec<String>>,
    received: RefCell<Vec<Received>>,
}

impl FakeClient {
    fn new(version: ContentVersion) -> Self {
        Self {
            version,
            reject: Vec::new(),
            locked: Vec::new(),
            unlocked: RefCell::new(Vec::new()),
            received: RefCell::new(Vec::new()),
        }
    }
}

impl ContentClient for FakeClient {
    fn server_version(&self) -> Result<ContentVersion, ClientError> {
        Ok(self.version.clone())
    }

    fn upload(&self, kind: ContentKind, path: &Path) -> Result<(), ClientError> {
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        if self.reject.iter().any(|r| *r == file_name) {
            return Err(ClientError::Rejected {
                status: 403,
                message: "Forbidden\nTry checking your API key configuration.".to_owned(),
            });
        }
        let unlocked = self.unlocked.borrow();
        let still_locked = self
            .locked
            .iter()
            .any(|(file, id)| *file == file_name && !unlocked.iter().any(|u| u == id));
        drop(unlocked);
        if still_locked {
            return Err(ClientError::Rejected {
                status: 400,
                message: "Item is system and cannot be changed".to_owned(),
            });
        }
        self.received.borrow_mut().push(Received {
            kind,
            file_name,
            content: fs::read_to_string(path).unwrap(),
        });
        Ok(())
    }

    fn unlock(&self, _kind: ContentKind, id: &str) -> Result<(), ClientError> {
        self.unlocked.borrow_mut().push(id.to_owned());
        Ok(())
    }
}

fn write_json(path: &Path, value: &serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// `Packs/Echo` with a package integration, a unified script, a widget and
/// an incident field.
fn make_pack(root: &Path) -> PathBuf {
    let pack = root.join("Packs").join("Echo");
    let integration = pack.join("Integrations").join("Echo");
    write(
        &integration.join("Echo.yml"),
        "commonfields:\n  id: Echo\nname: Echo\ncategory: Utilities\nscript:\n  script: '-'\n  type: python\n",
    );
    write(&integration.join("Echo.py"), "def main():\n    pass\n");
    write(&integration.join("Echo_test.py"), "def test_main():\n    pass\n");
    write(
        &pack.join("Scripts").join("script-Hello.yml"),
        "commonfields:\n  id: Hello\nname: Hello\nscript: print('hello')\ntype: python\n",
    );
    write_json(
        &pack.join("Widgets").join("widget-Echo.json"),
        &json!({"id": "echo-widget", "name": "Echo", "fromVersion": "5.0.0"}),
    );
    write_json(
        &pack.join("IncidentFields").join("incidentfield-Echo_Source.json"),
        &json!({"id": "incident_echosource", "cliName": "echosource", "version": -1}),
    );
    write(&pack.join("README.md"), "# Echo\n");
    pack
}

fn upload(client: &FakeClient, path: &Path) -> (anyhow::Result<UploadSummary>, String) {
    let mut out = Vec::new();
    let result = Uploader::new(client, &mut out).unwrap().upload(path);
    (result, String::from_utf8(out).unwrap())
}

fn server_6() -> FakeClient {
    FakeClient::new(ContentVersion::new(6, 0, 0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Path resolution
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_upload_path_does_not_exist() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("DoesNotExist");
    let client = server_6();

    let mut out = Vec::new();
    let args = UploadArgs {
        input: missing.clone(),
        insecure: false,
        override_locked: false,
    };
    let err = run_upload(&client, &args, &mut out).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Given input path: {} does not exist", missing.display())
    );
}

#[test]
fn test_upload_script_invalid_path() {
    let tmp = TempDir::new().unwrap();
    let invalid = tmp.path().join("Script").join("InvalidScript");
    fs::create_dir_all(&invalid).unwrap();
    let client = server_6();

    let (result, _) = upload(&client, &invalid);
    let msg = result.unwrap_err().to_string();
    assert!(msg.starts_with(&format!(
        "Given input path: {} is not uploadable. Input path should point to one of the following:\n  1. Pack\n  2. A content entity directory",
        invalid.display()
    )));
    assert!(msg.contains("  3. Valid file that can be imported to the server manually."));
    assert!(client.received.borrow().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Uploads
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_upload_pack() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let client = server_6();

    let (result, output) = upload(&client, &pack);
    let summary = result.unwrap();

    assert_eq!(summary.status_code(), 0, "failed: {:?}", summary.failed);
    let uploaded: Vec<(&str, &str)> = summary
        .successful
        .iter()
        .map(|i| (i.name.as_str(), i.kind.as_str()))
        .collect();
    assert_eq!(
        uploaded,
        vec![
            ("Echo.yml", "Integration"),
            ("script-Hello.yml", "Script"),
            ("incidentfield-Echo_Source.json", "IncidentField"),
            ("widget-Echo.json", "Widget"),
        ]
    );
    assert!(output.contains("Uploaded Widget - 'widget-Echo.json': successfully"));

    let received = client.received.borrow();
    assert_eq!(received[0].kind, ContentKind::Integration);
    assert_eq!(received[0].file_name, "integration-Echo.yml");
    assert!(received[0].content.contains("def main()"));
    assert!(!received[0].content.contains("test_main"));
    assert_eq!(received[1].file_name, "script-Hello.yml");
}

#[test]
fn test_upload_single_file() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let client = server_6();

    let widget = pack.join("Widgets").join("widget-Echo.json");
    let (result, _) = upload(&client, &widget);
    let summary = result.unwrap();

    assert_eq!(summary.successful.len(), 1);
    assert_eq!(client.received.borrow()[0].kind, ContentKind::Widget);
}

#[test]
fn test_upload_entity_folder_with_two_ymls_fails() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let folder = pack.join("Integrations").join("Echo");
    write(&folder.join("Other.yml"), "name: Other\n");
    write(&folder.join("Echo_unified.yml"), "name: Echo\n");
    let client = server_6();

    let (result, _) = upload(&client, &folder);
    let summary = result.unwrap();

    assert_eq!(summary.status_code(), 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].kind, "Entity Folder");
    assert!(summary.failed[0].error.contains("more than one `.yml` file"));
    assert!(client.received.borrow().is_empty());
}

#[test]
fn test_upload_entity_folder_without_yml_fails() {
    let tmp = TempDir::new().unwrap();
    let folder = tmp.path().join("Packs").join("Echo").join("Scripts").join("Empty");
    write(&folder.join("Empty.py"), "pass\n");
    let client = server_6();

    let (result, _) = upload(&client, &folder);
    let summary = result.unwrap();

    assert_eq!(summary.failed[0].error, "The folder does not contain a .yml file");
}

#[test]
fn test_upload_version_mismatch() {
    let tmp = TempDir::new().unwrap();
    let widgets = tmp.path().join("Packs").join("Echo").join("Widgets");
    write_json(
        &widgets.join("widget-Old.json"),
        &json!({"id": "old", "fromVersion": "4.1.0", "toVersion": "5.9.9"}),
    );
    write_json(
        &widgets.join("widget-New.json"),
        &json!({"id": "new", "fromVersion": "6.0.0"}),
    );
    let client = server_6();

    let (result, output) = upload(&client, &widgets);
    let summary = result.unwrap();

    assert_eq!(summary.status_code(), 1);
    assert_eq!(summary.successful.len(), 1);
    assert_eq!(summary.successful[0].name, "widget-New.json");
    assert_eq!(summary.version_mismatch.len(), 1);
    let skipped = &summary.version_mismatch[0];
    assert_eq!(skipped.name, "widget-Old.json");
    assert_eq!(skipped.from_version, ContentVersion::new(4, 1, 0));
    assert_eq!(skipped.to_version, ContentVersion::new(5, 9, 9));
    assert!(output.contains("is not uploading due to version mismatch"));
}

#[test]
fn test_upload_unsupported_file() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let client = server_6();

    let (result, output) = upload(&client, &pack.join("Integrations").join("Echo").join("Echo.py"));
    let summary = result.unwrap();

    assert_eq!(summary.status_code(), 1);
    assert_eq!(summary.failed[0].name, "Echo.py");
    assert_eq!(summary.failed[0].error, "Unsupported file path/type");
    assert!(output.contains("is not uploadable"));
}

#[test]
fn test_rejected_upload_does_not_stop_batch() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let mut client = server_6();
    client.reject.push("incidentfield-Echo_Source.json");

    let (result, output) = upload(&client, &pack);
    let summary = result.unwrap();

    assert_eq!(summary.status_code(), 1);
    assert_eq!(summary.successful.len(), 3);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].kind, "IncidentField");
    assert!(summary.failed[0].error.contains("Try checking your API key configuration."));
    assert!(output.contains("Upload IncidentField: incidentfield-Echo_Source.json failed:"));
}

#[test]
fn test_locked_system_item_fails_without_override() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let mut client = server_6();
    client.locked.push(("integration-Echo.yml", "Echo"));

    let (result, _) = upload(&client, &pack);
    let summary = result.unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].kind, "Integration");
    assert!(summary.failed[0].error.contains("Item is system"));
    assert!(client.unlocked.borrow().is_empty());
}

#[test]
fn test_override_unlocks_and_retries_locked_item() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let mut client = server_6();
    client.locked.push(("integration-Echo.yml", "Echo"));

    let mut out = Vec::new();
    let summary = Uploader::new(&client, &mut out)
        .unwrap()
        .override_locked(true)
        .upload(&pack)
        .unwrap();

    assert_eq!(summary.status_code(), 0);
    assert_eq!(summary.successful.len(), 4);
    assert_eq!(*client.unlocked.borrow(), vec!["Echo".to_owned()]);
    assert!(
        client
            .received
            .borrow()
            .iter()
            .any(|r| r.file_name == "integration-Echo.yml")
    );
}

#[test]
fn test_locked_rejection_messages() {
    assert!(is_locked_rejection(
        ContentKind::Integration,
        "Item is system and cannot be changed"
    ));
    assert!(is_locked_rejection(
        ContentKind::Playbook,
        "Can not override system playbook yaml"
    ));
    assert!(is_locked_rejection(
        ContentKind::TestPlaybook,
        "Playbook Echo already exists"
    ));
    assert!(!is_locked_rejection(ContentKind::Integration, "already exists"));
    assert!(!is_locked_rejection(ContentKind::Widget, "Item is system"));
}

#[test]
fn test_override_leaves_other_rejections_alone() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let mut client = server_6();
    client.reject.push("widget-Echo.json");

    let mut out = Vec::new();
    let summary = Uploader::new(&client, &mut out)
        .unwrap()
        .override_locked(true)
        .upload(&pack)
        .unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert!(client.unlocked.borrow().is_empty());
}

#[test]
fn test_run_upload_prints_summary() {
    let tmp = TempDir::new().unwrap();
    let pack = make_pack(tmp.path());
    let client = server_6();

    let mut out = Vec::new();
    let args = UploadArgs {
        input: pack,
        insecure: false,
        override_locked: false,
    };
    let code = run_upload(&client, &args, &mut out).unwrap();
    let output = String::from_utf8(out).unwrap();

    assert_eq!(code, 0);
    assert!(output.contains("UPLOAD SUMMARY:"));
    assert!(output.contains("SUCCESSFUL UPLOADS:"));
    assert!(output.contains("\u{2502} widget-Echo.json"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Validate
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_validate_exit_codes() {
    let tmp = TempDir::new().unwrap();
    let fields = tmp.path().join("IncidentFields");
    let good = json!({
        "id": "incident_echosource",
        "version": -1,
        "name": "Echo Source",
        "cliName": "echosource",
        "type": "shortText",
        "group": 0,
        "content": true,
        "system": false,
        "required": false,
        "fromVersion": "5.0.0"
    });
    write_json(&fields.join("incidentfield-Echo_Source.json"), &good);

    let mut args = ValidateArgs {
        input: vec![tmp.path().to_path_buf()],
        exclude: Vec::new(),
        previous_root: None,
        json: true,
        default_images: Vec::new(),
    };
    let mut out = Vec::new();
    assert_eq!(run_validate(&args, &mut out).unwrap(), 0);
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["ok"], true);

    let mut bad = good;
    bad["cliName"] = json!("Echo_Source");
    write_json(&fields.join("incidentfield-Echo_Bad.json"), &bad);

    args.json = false;
    let mut out = Vec::new();
    assert_eq!(run_validate(&args, &mut out).unwrap(), 1);
    assert!(String::from_utf8(out).unwrap().contains("[is_matching_cliname_regex]"));
}

#[test]
fn test_run_validate_with_extra_default_image() {
    let tmp = TempDir::new().unwrap();
    let package = tmp.path().join("Integrations").join("Echo");
    write(&package.join("Echo.yml"), "commonfields:\n  id: Echo\nname: Echo\n");
    let image = b"\x89PNG\r\n\x1a\nplaceholder".to_vec();
    fs::write(package.join("Echo_image.png"), &image).unwrap();

    let mut args = ValidateArgs {
        input: vec![tmp.path().join("Integrations")],
        exclude: Vec::new(),
        previous_root: None,
        json: false,
        default_images: Vec::new(),
    };
    let mut out = Vec::new();
    assert_eq!(run_validate(&args, &mut out).unwrap(), 0);

    let placeholder = tmp.path().join("placeholder.png");
    fs::write(&placeholder, &image).unwrap();
    args.default_images.push(placeholder);
    let mut out = Vec::new();
    assert_eq!(run_validate(&args, &mut out).unwrap(), 1);
    assert!(String::from_utf8(out).unwrap().contains("[is_not_default_image]"));
}
