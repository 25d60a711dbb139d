//! Typed content objects.
//!
//! A [`ContentObject`] is a file path tagged with its [`ContentKind`] and the
//! parsed document (empty for images and readmes). Loaders do nothing beyond
//! reading the file and tagging it.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::document::{ContentDocument, DocumentError, DocumentFormat};
use crate::kind::ContentKind;
use crate::version::{ContentVersion, DEFAULT_FROM_VERSION, DEFAULT_TO_VERSION, VersionError};

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("cannot determine the content type of {}", path.display())]
    UnknownKind { path: PathBuf },

    #[error("{} has an invalid {key}: {source}", path.display())]
    Version {
        path: PathBuf,
        key: &'static str,
        #[source]
        source: VersionError,
    },
}

#[derive(Debug, Clone)]
pub struct ContentObject {
    path: PathBuf,
    kind: ContentKind,
    document: ContentDocument,
}

macro_rules! typed_loaders {
    ($($(#[$meta:meta])* $name:ident => $kind:ident),* $(,)?) => {
        impl ContentObject {
            $(
                $(#[$meta])*
                ///
                /// # Errors
                ///
                /// Returns an error if the file cannot be read or parsed.
                pub fn $name(path: impl AsRef<Path>) -> Result<Self, ObjectError> {
                    Self::load(path, ContentKind::$kind)
                }
            )*
        }
    };
}

typed_loaders! {
    /// Load an integration YAML.
    integration => Integration,
    /// Load a script YAML.
    script => Script,
    /// Load a playbook YAML.
    playbook => Playbook,
    /// Load a test playbook YAML.
    test_playbook => TestPlaybook,
    /// Load an incident field JSON.
    incident_field => IncidentField,
    /// Load an indicator field JSON.
    indicator_field => IndicatorField,
    /// Load an incident type JSON.
    incident_type => IncidentType,
    /// Load a classifier JSON.
    classifier => Classifier,
    /// Load an old-format classifier JSON.
    old_classifier => OldClassifier,
    /// Load a mapper JSON.
    mapper => Mapper,
    /// Load a layout JSON.
    layout => Layout,
    /// Load a layouts container JSON.
    layouts_container => LayoutsContainer,
    /// Load a widget JSON.
    widget => Widget,
    /// Load a dashboard JSON.
    dashboard => Dashboard,
}

impl ContentObject {
    /// Load `path` and tag it with `kind`, without any detection.
    ///
    /// # Errors
    ///
    /// Returns an error if a JSON/YAML file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>, kind: ContentKind) -> Result<Self, ObjectError> {
        let path = path.as_ref();
        let document = if DocumentFormat::for_path(path).is_some() {
            ContentDocument::load(path)?
        } else {
            ContentDocument::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            document,
        })
    }

    /// Load `path` and detect its kind from the layout and content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or its kind is unknown.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ObjectError> {
        let path = path.as_ref();
        let document = if DocumentFormat::for_path(path).is_some() {
            Some(ContentDocument::load(path)?)
        } else {
            None
        };
        let kind = ContentKind::detect(path, document.as_ref()).ok_or_else(|| {
            ObjectError::UnknownKind {
                path: path.to_path_buf(),
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            document: document.unwrap_or_default(),
        })
    }

    /// Build an object from an already parsed document.
    #[must_use]
    pub fn from_parts(path: PathBuf, kind: ContentKind, document: ContentDocument) -> Self {
        Self {
            path,
            kind,
            document,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    #[must_use]
    pub fn document(&self) -> &ContentDocument {
        &self.document
    }

    #[must_use]
    pub fn into_document(self) -> ContentDocument {
        self.document
    }

    /// File name of the object's path, lossily converted.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Content ID: `commonfields.id` for integrations and scripts, `id` otherwise.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.document
            .get("commonfields")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .or_else(|| self.document.get_str("id"))
    }

    /// Lowest server version this object supports.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared version does not parse.
    pub fn from_version(&self) -> Result<ContentVersion, ObjectError> {
        self.declared_version(&["fromversion", "fromVersion"], DEFAULT_FROM_VERSION)
    }

    /// First server version this object no longer supports.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared version does not parse.
    pub fn to_version(&self) -> Result<ContentVersion, ObjectError> {
        self.declared_version(&["toversion", "toVersion"], DEFAULT_TO_VERSION)
    }

    fn declared_version(
        &self,
        keys: &[&'static str],
        default: ContentVersion,
    ) -> Result<ContentVersion, ObjectError> {
        for &key in keys {
            // YAML turns `fromversion: 6.0` into a number.
            let raw = match self.document.get(key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            if let Some(raw) = raw {
                return ContentVersion::parse(&raw).map_err(|source| ObjectError::Version {
                    path: self.path.clone(),
                    key,
                    source,
                });
            }
        }
        Ok(default)
    }

    /// Whether an integration or script carries its code inline.
    ///
    /// Other kinds are always considered unified.
    #[must_use]
    pub fn is_unified(&self) -> bool {
        let code = match self.kind {
            ContentKind::Integration => self
                .document
                .get("script")
                .and_then(|s| s.get("script"))
                .and_then(Value::as_str),
            ContentKind::Script => self.document.get_str("script"),
            _ => return true,
        };
        code.is_some_and(|c| !c.trim().is_empty() && c.trim() != "-")
    }
}
