//! Content server client.
//!
//! The uploader talks to the server through [`ContentClient`] so it can be
//! driven by an in-memory fake. [`HttpContentClient`] is the real thing: a
//! blocking `reqwest` client posting each file to its kind's import endpoint.

use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use contentkit::{ContentKind, ContentVersion, VersionError};
use reqwest::StatusCode;
use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("DEMISTO_BASE_URL is not set")]
    MissingBaseUrl,

    #[error(
        "[SSL: CERTIFICATE_VERIFY_FAILED] certificate verify failed: {detail}.\nTry running the command with --insecure flag."
    )]
    Certificate { detail: String },

    #[error(
        "Failed to establish a new connection: Connection refused.\nTry checking your BASE url configuration."
    )]
    Connection,

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response {status} from {url}")]
    Status { status: u16, url: String },

    #[error("the server does not accept {kind} uploads")]
    UnsupportedKind { kind: ContentKind },

    #[error("server response has no usable demistoVersion")]
    MissingVersion,

    #[error("invalid server version: {0}")]
    Version(#[from] VersionError),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(reqwest::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(detail) = certificate_failure(&err) {
            return Self::Certificate { detail };
        }
        if err.is_connect() {
            return Self::Connection;
        }
        Self::Transport(err)
    }
}

/// Walks the source chain looking for a TLS certificate failure.
fn certificate_failure(err: &reqwest::Error) -> Option<String> {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if text.to_ascii_lowercase().contains("certificate") {
            return Some(text);
        }
        source = cause.source();
    }
    None
}

/// Message for a rejected request: the server's `error` field, with a key
/// hint on 403.
#[must_use]
pub fn rejection_message(status: u16, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
    }

    let mut message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| body.trim().to_owned());
    if status == 403 {
        message.push_str("\nTry checking your API key configuration.");
    }
    message
}

/// Import endpoint for each uploadable kind.
#[must_use]
pub fn upload_endpoint(kind: ContentKind) -> Option<&'static str> {
    match kind {
        ContentKind::Integration => Some("/settings/integration-conf/upload"),
        ContentKind::Script => Some("/automation/import"),
        ContentKind::Playbook | ContentKind::TestPlaybook => Some("/playbook/save/yaml"),
        ContentKind::IncidentField => Some("/incidentfields/import"),
        ContentKind::IncidentType => Some("/incidenttypes/import"),
        ContentKind::Classifier | ContentKind::OldClassifier => Some("/classifier/import"),
        ContentKind::Layout | ContentKind::LayoutsContainer => Some("/layouts/import"),
        ContentKind::Widget => Some("/widgets/import"),
        ContentKind::Dashboard => Some("/dashboards/import"),
        ContentKind::IndicatorField
        | ContentKind::Mapper
        | ContentKind::Readme
        | ContentKind::Image
        | ContentKind::PackMetadata => None,
    }
}

/// Endpoint that releases a locked system item of `kind`, or `None` when
/// the server has no lock for it.
#[must_use]
pub fn unlock_endpoint(kind: ContentKind) -> Option<&'static str> {
    match kind {
        ContentKind::Integration => Some("/settings/integration/unlock"),
        ContentKind::Playbook | ContentKind::TestPlaybook => Some("/playbook/unlock"),
        _ => None,
    }
}

/// Remote content server.
pub trait ContentClient {
    /// Version the server reports for itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or reports no version.
    fn server_version(&self) -> Result<ContentVersion, ClientError>;

    /// Import the file at `path` as a `kind` artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects the file.
    fn upload(&self, kind: ContentKind, path: &Path) -> Result<(), ClientError>;

    /// Release the locked system item `id` so it can be overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if `kind` cannot be unlocked or the request fails.
    fn unlock(&self, kind: ContentKind, id: &str) -> Result<(), ClientError>;
}

/// Connection settings for [`HttpContentClient`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header.
    pub api_key: Option<String>,
    pub verify_tls: bool,
}

impl ClientConfig {
    /// Build the config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingBaseUrl`] when `DEMISTO_BASE_URL` is unset.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingBaseUrl`] when `DEMISTO_BASE_URL` is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let base_url = set("DEMISTO_BASE_URL").ok_or(ClientError::MissingBaseUrl)?;
        let verify_tls = set("DEMISTO_VERIFY_SSL")
            .is_none_or(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"));
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: set("DEMISTO_API_KEY"),
            verify_tls,
        })
    }
}

#[derive(Debug, Deserialize)]
struct About {
    #[serde(rename = "demistoVersion")]
    demisto_version: Option<String>,
}

/// Blocking HTTP implementation of [`ContentClient`].
#[derive(Debug)]
pub struct HttpContentClient {
    config: ClientConfig,
    client: Client,
}

impl HttpContentClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .tls_danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.config.base_url)
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match &self.config.api_key {
            Some(key) => request.header(reqwest::header::AUTHORIZATION, key),
            None => request,
        }
    }

    fn check(url: &str, response: reqwest::blocking::Response) -> Result<String, ClientError> {
        let status = response.status();
        let body = response.text()?;
        if status.is_success() {
            return Ok(body);
        }
        tracing::debug!(%url, %status, %body, "request rejected");
        match status {
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN => Err(ClientError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status.as_u16(), &body),
            }),
            _ => Err(ClientError::Status {
                status: status.as_u16(),
                url: url.to_owned(),
            }),
        }
    }
}

impl ContentClient for HttpContentClient {
    fn server_version(&self) -> Result<ContentVersion, ClientError> {
        let url = self.url("/about");
        let response = self.authorize(self.client.get(&url)).send()?;
        let body = Self::check(&url, response)?;
        let about: About =
            serde_json::from_str(&body).map_err(|_| ClientError::MissingVersion)?;
        let raw = about.demisto_version.ok_or(ClientError::MissingVersion)?;
        Ok(ContentVersion::parse(&raw)?)
    }

    fn upload(&self, kind: ContentKind, path: &Path) -> Result<(), ClientError> {
        let endpoint = upload_endpoint(kind).ok_or(ClientError::UnsupportedKind { kind })?;
        let url = self.url(endpoint);
        let form = multipart::Form::new()
            .file("file", path)
            .map_err(|source| ClientError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(%url, file = %path.display(), %kind, "uploading");
        let response = self.authorize(self.client.post(&url)).multipart(form).send()?;
        let body = Self::check(&url, response)?;
        tracing::debug!(%body, "upload response");
        Ok(())
    }

    fn unlock(&self, kind: ContentKind, id: &str) -> Result<(), ClientError> {
        let endpoint = unlock_endpoint(kind).ok_or(ClientError::UnsupportedKind { kind })?;
        let url = self.url(endpoint);
        tracing::info!(%url, %id, %kind, "unlocking");
        let response = self
            .authorize(self.client.post(&url))
            .json(&serde_json::json!({ "id": id }))
            .send()?;
        Self::check(&url, response)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_requires_base_url() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ClientError::MissingBaseUrl));
    }

    #[test]
    fn test_config_from_environment() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("DEMISTO_BASE_URL", "https://xsoar.example.com/"),
            ("DEMISTO_API_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://xsoar.example.com");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert!(config.verify_tls);

        let insecure = ClientConfig::from_lookup(lookup(&[
            ("DEMISTO_BASE_URL", "https://xsoar.example.com"),
            ("DEMISTO_VERIFY_SSL", "False"),
        ]))
        .unwrap();
        assert!(!insecure.verify_tls);
    }

    #[test]
    fn test_rejection_message_forbidden_adds_key_hint() {
        let body = r#"{"status": 403, "error": "Error message"}"#;
        assert_eq!(
            rejection_message(403, body),
            "Error message\nTry checking your API key configuration."
        );
    }

    #[test]
    fn test_rejection_message_bad_request() {
        let body = r#"{"status": 400, "error": "Bad layout"}"#;
        assert_eq!(rejection_message(400, body), "Bad layout");
        assert_eq!(rejection_message(400, "plain failure\n"), "plain failure");
    }

    #[test]
    fn test_actionable_messages() {
        assert_eq!(
            ClientError::Connection.to_string(),
            "Failed to establish a new connection: Connection refused.\nTry checking your BASE url configuration."
        );
        let tls = ClientError::Certificate {
            detail: "self signed certificate".to_owned(),
        };
        assert!(tls.to_string().ends_with("Try running the command with --insecure flag."));
    }

    #[test]
    fn test_upload_endpoints() {
        assert_eq!(
            upload_endpoint(ContentKind::TestPlaybook),
            upload_endpoint(ContentKind::Playbook)
        );
        assert_eq!(
            upload_endpoint(ContentKind::LayoutsContainer),
            Some("/layouts/import")
        );
        assert_eq!(upload_endpoint(ContentKind::Readme), None);
        assert_eq!(upload_endpoint(ContentKind::Mapper), None);
    }

    #[test]
    fn test_unlock_endpoints() {
        assert_eq!(
            unlock_endpoint(ContentKind::Integration),
            Some("/settings/integration/unlock")
        );
        assert_eq!(
            unlock_endpoint(ContentKind::TestPlaybook),
            unlock_endpoint(ContentKind::Playbook)
        );
        assert_eq!(unlock_endpoint(ContentKind::Widget), None);
    }
}
