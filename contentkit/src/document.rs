//! Parsed content documents.
//!
//! Every JSON or YAML artifact in a pack is loaded into a [`ContentDocument`]:
//! a mapping of string keys to loosely typed values. YAML is parsed into the
//! same `serde_json::Value` model so validators never care about the source
//! format.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while loading a document from disk.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {} as JSON: {message}", path.display())]
    Json { path: PathBuf, message: String },

    #[error("failed to parse {} as YAML: {message}", path.display())]
    Yaml { path: PathBuf, message: String },

    #[error("{} does not contain a mapping at the top level", path.display())]
    NotAMapping { path: PathBuf },

    #[error("{} is not a JSON or YAML file", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to serialize document as YAML: {message}")]
    Serialize { message: String },
}

/// Source format of a document, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Format for `path`, or `None` when the extension is neither JSON nor YAML.
    #[must_use]
    pub fn for_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(Self::Json),
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                Some(Self::Yaml)
            }
            _ => None,
        }
    }
}

/// One version of a content artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContentDocument {
    fields: Map<String, Value>,
}

impl ContentDocument {
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Wrap a JSON value. Returns `None` unless the value is an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Load a document from a `.json`, `.yml` or `.yaml` file.
    ///
    /// An empty YAML file yields an empty document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unsupported
    /// extension, fails to parse, or its top level is not a mapping.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let format = DocumentFormat::for_path(path).ok_or_else(|| {
            DocumentError::UnsupportedFormat {
                path: path.to_path_buf(),
            }
        })?;
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, format, path)
    }

    /// Parse document text. `path` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the text fails to parse or is not a mapping.
    pub fn parse(content: &str, format: DocumentFormat, path: &Path) -> Result<Self, DocumentError> {
        let value = match format {
            DocumentFormat::Json => {
                serde_json::from_str::<Value>(content).map_err(|e| DocumentError::Json {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
            DocumentFormat::Yaml => {
                if content.trim().is_empty() {
                    return Ok(Self::default());
                }
                serde_saphyr::from_str::<Value>(content).map_err(|e| DocumentError::Yaml {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
        };

        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Ok(Self::default()),
            _ => Err(DocumentError::NotAMapping {
                path: path.to_path_buf(),
            }),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Whether `key` holds a value Python-style truthiness would accept:
    /// present, not null, not `false`, not `0`, not an empty string/list/map.
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(is_truthy)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(key.into(), value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Render the document as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML serializer rejects the value.
    pub fn to_yaml_string(&self) -> Result<String, DocumentError> {
        serde_saphyr::to_string(&self.fields).map_err(|e| DocumentError::Serialize {
            message: e.to_string(),
        })
    }
}

/// Python-style truthiness of a JSON value: `null`, `false`, `0` and empty
/// strings, lists and maps are false.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
