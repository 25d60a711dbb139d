//! Upload packs, entity directories and single files to a content server.
//!
//! A path resolves to one of three shapes:
//! 1. a pack (`Packs/<Name>`), whose entity directories are uploaded in
//!    dependency order;
//! 2. an entity directory (`Packs/<Name>/Layouts`) or an integration/script
//!    package folder (`Packs/<Name>/Integrations/<Name>`);
//! 3. a single importable file.
//!
//! Each artifact is uploaded independently; a failure is recorded in the
//! [`UploadSummary`] and never stops the remaining uploads.

pub mod summary;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use contentkit::kind::{CONTENT_ENTITIES_DIRS, PACKS_DIR, UNIFIED_ENTITIES_DIRS};
use contentkit::unify::UNIFIED_SUFFIX;
use contentkit::{ContentKind, ContentObject, ContentVersion, ObjectError, write_unified};

use crate::client::{ClientError, ContentClient};
use summary::{FailedUpload, UploadSummary, UploadedItem, VersionMismatch};

const ENTITY_FOLDER: &str = "Entity Folder";
const UNSUPPORTED: &str = "Unsupported file path/type";

/// Whether the server refused to overwrite `kind` because the existing item
/// is a locked system item.
#[must_use]
pub fn is_locked_rejection(kind: ContentKind, message: &str) -> bool {
    match kind {
        ContentKind::Integration => message.contains("Item is system"),
        ContentKind::Playbook | ContentKind::TestPlaybook => {
            message.contains("Can not override system playbook yaml")
                || message.contains("already exists")
        }
        _ => false,
    }
}

/// The three path shapes `upload` accepts, as shown to the user.
#[must_use]
pub fn uploadable_shapes_help(path: &Path) -> String {
    format!(
        "Given input path: {} is not uploadable. Input path should point to one of the following:\n  \
         1. Pack\n  \
         2. A content entity directory that is inside a pack. For example: an Integrations directory or a Layouts directory\n  \
         3. Valid file that can be imported to the server manually. For example a playbook: helloWorld.yml",
        path.display()
    )
}

fn dir_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn parent_dir_name(path: &Path) -> Option<&str> {
    path.parent().and_then(dir_name)
}

/// Entries of `dir` matching `pattern` (a glob relative to `dir`), sorted.
fn list(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = format!(
        "{}/{pattern}",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let Ok(paths) = glob::glob(&full) else {
        return Vec::new();
    };
    let mut entries: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
    entries.sort();
    entries
}

/// Drives one upload run against a [`ContentClient`].
pub struct Uploader<'a> {
    client: &'a dyn ContentClient,
    out: &'a mut dyn Write,
    server_version: ContentVersion,
    override_locked: bool,
    summary: UploadSummary,
}

impl<'a> Uploader<'a> {
    /// Query the server version and prepare an upload run. Progress messages
    /// go to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server version cannot be fetched.
    pub fn new(client: &'a dyn ContentClient, out: &'a mut dyn Write) -> anyhow::Result<Self> {
        let server_version = client
            .server_version()
            .context("Failed to fetch the server version")?;
        tracing::info!(%server_version, "connected to content server");
        Ok(Self {
            client,
            out,
            server_version,
            override_locked: false,
            summary: UploadSummary::default(),
        })
    }

    /// Unlock and retry uploads the server rejects as locked system items.
    #[must_use]
    pub fn override_locked(mut self, enabled: bool) -> Self {
        self.override_locked = enabled;
        self
    }

    #[must_use]
    pub fn server_version(&self) -> &ContentVersion {
        &self.server_version
    }

    /// Upload everything `path` resolves to and return the per-item outcomes.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not exist, matches none of the
    /// uploadable shapes, or progress output cannot be written. Individual
    /// upload failures are recorded in the summary instead.
    pub fn upload(mut self, path: &Path) -> anyhow::Result<UploadSummary> {
        writeln!(self.out, "Uploading {} ...", path.display())?;
        if !path.exists() {
            anyhow::bail!("Given input path: {} does not exist", path.display());
        }

        if path.is_file() {
            self.upload_file(path)?;
        } else if parent_dir_name(path).is_some_and(|p| UNIFIED_ENTITIES_DIRS.contains(&p)) {
            self.upload_entity_folder(path)?;
        } else if dir_name(path).is_some_and(|d| CONTENT_ENTITIES_DIRS.contains(&d)) {
            self.upload_entity_dir(path)?;
        } else if parent_dir_name(path) == Some(PACKS_DIR) {
            self.upload_pack(path)?;
        } else {
            anyhow::bail!(uploadable_shapes_help(path));
        }

        Ok(self.summary)
    }

    /// Entity directories in dependency order: integrations and scripts
    /// before the playbooks and layouts that reference them.
    fn upload_pack(&mut self, pack: &Path) -> anyhow::Result<()> {
        tracing::info!(pack = %pack.display(), "uploading pack");
        for entity_dir in CONTENT_ENTITIES_DIRS {
            let dir = pack.join(entity_dir);
            if dir.is_dir() {
                self.upload_entity_dir(&dir)?;
            }
        }
        Ok(())
    }

    fn upload_entity_dir(&mut self, dir: &Path) -> anyhow::Result<()> {
        if dir_name(dir).is_some_and(|d| UNIFIED_ENTITIES_DIRS.contains(&d)) {
            for folder in list(dir, "*").into_iter().filter(|p| p.is_dir()) {
                self.upload_entity_folder(&folder)?;
            }
            // Already unified files stored directly in the directory.
            for file in list(dir, "*.yml") {
                self.upload_file(&file)?;
            }
            return Ok(());
        }

        // Only documents are imported; images and readmes are skipped.
        for file in list(dir, "*.yml").into_iter().chain(list(dir, "*.json")) {
            self.upload_file(&file)?;
        }
        Ok(())
    }

    /// An integration/script package folder must hold exactly one YAML,
    /// not counting leftover `_unified.yml` files.
    fn upload_entity_folder(&mut self, folder: &Path) -> anyhow::Result<()> {
        let yml_files: Vec<PathBuf> = list(folder, "*.yml")
            .into_iter()
            .filter(|p| dir_name(p).is_some_and(|n| !n.ends_with(UNIFIED_SUFFIX)))
            .collect();

        match yml_files.as_slice() {
            [yml] => self.upload_file(yml),
            [] => {
                self.fail_folder(folder, "The folder does not contain a .yml file");
                Ok(())
            }
            _ => {
                self.fail_folder(
                    folder,
                    "The folder contains more than one `.yml` file (not including `_unified.yml`)",
                );
                Ok(())
            }
        }
    }

    fn fail_folder(&mut self, folder: &Path, error: &str) {
        tracing::warn!(folder = %folder.display(), "{error}");
        self.summary.failed.push(FailedUpload {
            name: folder.display().to_string(),
            kind: ENTITY_FOLDER.to_owned(),
            error: error.to_owned(),
        });
    }

    fn upload_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let name = dir_name(path).unwrap_or_default().to_owned();

        let object = match ContentObject::from_path(path) {
            Ok(object) if object.kind().is_uploadable() => object,
            Ok(_) | Err(ObjectError::UnknownKind { .. }) => {
                writeln!(
                    self.out,
                    "{}",
                    format!("\nError: {}", uploadable_shapes_help(path)).bright_red()
                )?;
                self.summary.failed.push(FailedUpload {
                    name,
                    kind: "Unknown".to_owned(),
                    error: UNSUPPORTED.to_owned(),
                });
                return Ok(());
            }
            Err(e) => {
                self.record_failure(name, "Unknown", &e.to_string())?;
                return Ok(());
            }
        };

        let kind = object.kind();
        let (from_version, to_version) = match (object.from_version(), object.to_version()) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(e), _) | (_, Err(e)) => {
                self.record_failure(name, kind.as_str(), &e.to_string())?;
                return Ok(());
            }
        };

        let in_window = from_version <= self.server_version && self.server_version < to_version;
        if !in_window {
            writeln!(
                self.out,
                "{}",
                format!(
                    "Input path {} is not uploading due to version mismatch.\n\
                     Server version is: {} while the file's version is {from_version} - {to_version}",
                    path.display(),
                    self.server_version
                )
                .bright_red()
            )?;
            self.summary.version_mismatch.push(VersionMismatch {
                name,
                kind: kind.to_string(),
                server_version: self.server_version.clone(),
                from_version,
                to_version,
            });
            return Ok(());
        }

        match self.push(&object) {
            Ok(()) => {
                writeln!(
                    self.out,
                    "{}",
                    format!("Uploaded {kind} - '{name}': successfully").green()
                )?;
                self.summary.successful.push(UploadedItem {
                    name,
                    kind: kind.to_string(),
                });
            }
            Err(e) => self.record_failure(name, kind.as_str(), &format!("{e:#}"))?,
        }
        Ok(())
    }

    /// Send one object, unifying package YAMLs into a scratch directory first.
    fn push(&self, object: &ContentObject) -> anyhow::Result<()> {
        if object.kind().is_unifiable() && !object.is_unified() {
            let staging = tempfile::tempdir().context("Failed to create a staging directory")?;
            let unified = write_unified(object, staging.path())?;
            tracing::debug!(unified = %unified.display(), "unified package");
            return self.send(object, &unified);
        }
        self.send(object, object.path())
    }

    fn send(&self, object: &ContentObject, path: &Path) -> anyhow::Result<()> {
        let kind = object.kind();
        match self.client.upload(kind, path) {
            Ok(()) => Ok(()),
            Err(ClientError::Rejected { message, .. })
                if self.override_locked && is_locked_rejection(kind, &message) =>
            {
                let id = object
                    .id()
                    .with_context(|| format!("{message}\n{} has no id to unlock", path.display()))?;
                tracing::info!(%kind, %id, "unlocking system item before retrying the upload");
                self.client.unlock(kind, id)?;
                self.client.upload(kind, path)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn record_failure(&mut self, name: String, kind: &str, error: &str) -> anyhow::Result<()> {
        writeln!(
            self.out,
            "{}",
            format!("\nUpload {kind}: {name} failed:\n{error}").bright_red()
        )?;
        self.summary.failed.push(FailedUpload {
            name,
            kind: kind.to_owned(),
            error: error.to_owned(),
        });
        Ok(())
    }
}
