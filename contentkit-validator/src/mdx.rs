//! External MDX renderer.
//!
//! README files are checked by handing them to a small Node program built on
//! `@mdx-js/mdx`, either once per file (`node mdx-parse.js`, README on stdin)
//! or through a long-lived server (`node mdx-parse-server.js`) that answers
//! HTTP POSTs. Both programs ship with this crate and are written to a
//! session-owned temporary directory unless `ReadmeConfig::scripts_dir`
//! points elsewhere. An [`MdxSession`] owns the server process for one
//! validation run and stops it when dropped.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;

use crate::config::{ReadmeConfig, ReadmeMode};

/// First line the renderer server prints once it accepts requests.
pub const MDX_SERVER_READY: &str = "MDX server is listening on port";

/// First line (server) or stderr prefix (command) when `@mdx-js/mdx` is not
/// installed.
pub const MDX_MODULES_MISSING: &str = "MDX modules are not installed";

/// npm modules the renderer scripts need.
pub const REQUIRED_MDX_PACKS: &[&str] = &["@mdx-js/mdx", "fs-extra", "commander"];

pub const PARSE_SCRIPT: &str = "mdx-parse.js";
pub const SERVER_SCRIPT: &str = "mdx-parse-server.js";

const PARSE_SCRIPT_SOURCE: &str = include_str!("../scripts/mdx-parse.js");
const SERVER_SCRIPT_SOURCE: &str = include_str!("../scripts/mdx-parse-server.js");

/// Exit status of `mdx-parse.js` when its modules cannot be loaded.
const MODULES_MISSING_EXIT: i32 = 3;
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const RENDER_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum MdxError {
    #[error("failed to run node: {0}")]
    NodeUnavailable(#[source] std::io::Error),

    #[error("{0}")]
    ModulesMissing(String),

    #[error("MDX renderer script not found: {}", .0.display())]
    ScriptMissing(PathBuf),

    #[error("MDX server did not start: {0}")]
    Startup(String),

    #[error("failed to reach the MDX server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error talking to node: {0}")]
    Io(#[source] std::io::Error),
}

impl MdxError {
    /// Node, its MDX modules or the renderer scripts are absent. The README
    /// check is skipped rather than failed.
    #[must_use]
    pub fn is_tooling_missing(&self) -> bool {
        matches!(
            self,
            Self::NodeUnavailable(_) | Self::ModulesMissing(_) | Self::ScriptMissing(_)
        )
    }
}

/// Outcome of rendering one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Valid,
    Invalid(String),
}

/// Whether `node` runs in `content_path` and the required npm modules are
/// installed there.
#[must_use]
pub fn are_modules_installed_for_verify(content_path: &Path) -> bool {
    let node = Command::new("node")
        .arg("-v")
        .current_dir(content_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !node.is_ok_and(|status| status.success()) {
        tracing::debug!("node is not available, skipping MDX verification");
        return false;
    }

    let listing = Command::new("npm")
        .args(["ls", "--json"])
        .args(REQUIRED_MDX_PACKS)
        .current_dir(content_path)
        .stderr(Stdio::null())
        .output();
    let Ok(listing) = listing else {
        return false;
    };
    let Ok(tree) = serde_json::from_slice::<serde_json::Value>(&listing.stdout) else {
        return false;
    };
    let missing: Vec<&str> = REQUIRED_MDX_PACKS
        .iter()
        .copied()
        .filter(|pack| tree.get("dependencies").and_then(|d| d.get(pack)).is_none())
        .collect();
    if !missing.is_empty() {
        tracing::debug!(?missing, "npm modules for MDX verification are not installed");
        return false;
    }
    true
}

/// Both renderer scripts exist in the configured directory. The bundled
/// copies are always available.
fn configured_scripts_present(config: &ReadmeConfig) -> bool {
    let Some(dir) = &config.scripts_dir else {
        return true;
    };
    let missing: Vec<PathBuf> = [PARSE_SCRIPT, SERVER_SCRIPT]
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| !path.is_file())
        .collect();
    if !missing.is_empty() {
        tracing::warn!(?missing, "MDX renderer scripts not found, skipping MDX verification");
        return false;
    }
    true
}

/// Where the renderer scripts are run from.
enum Scripts {
    Configured(PathBuf),
    Bundled(TempDir),
}

impl Scripts {
    fn prepare(config: &ReadmeConfig) -> Result<Self, MdxError> {
        if let Some(dir) = &config.scripts_dir {
            return Ok(Self::Configured(dir.clone()));
        }
        let dir = tempfile::Builder::new()
            .prefix("contentkit-mdx")
            .tempdir()
            .map_err(MdxError::Io)?;
        for (name, source) in [
            (PARSE_SCRIPT, PARSE_SCRIPT_SOURCE),
            (SERVER_SCRIPT, SERVER_SCRIPT_SOURCE),
        ] {
            std::fs::write(dir.path().join(name), source).map_err(MdxError::Io)?;
        }
        tracing::debug!(dir = %dir.path().display(), "wrote bundled MDX scripts");
        Ok(Self::Bundled(dir))
    }

    fn dir(&self) -> &Path {
        match self {
            Self::Configured(dir) => dir,
            Self::Bundled(dir) => dir.path(),
        }
    }

    fn script(&self, name: &str) -> Result<PathBuf, MdxError> {
        let path = self.dir().join(name);
        if path.is_file() {
            // node runs in `content_path`, so a relative script path would move.
            Ok(std::path::absolute(&path).unwrap_or(path))
        } else {
            Err(MdxError::ScriptMissing(path))
        }
    }
}

/// A running `mdx-parse-server.js`.
///
/// Its stdout is drained into the debug log for the lifetime of the process.
struct MdxServer {
    child: Child,
    stdout_reader: Option<JoinHandle<()>>,
    url: String,
    client: reqwest::blocking::Client,
}

impl MdxServer {
    fn start(config: &ReadmeConfig, script: &Path) -> Result<Self, MdxError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(RENDER_TIMEOUT)
            .build()?;
        tracing::info!(script = %script.display(), "starting MDX server");
        let mut child = node_command(config, script)
            .arg(config.server_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(MdxError::NodeUnavailable)?;

        let Some(stdout) = child.stdout.take() else {
            stop(&mut child, None);
            return Err(MdxError::Startup("node stdout is not piped".to_owned()));
        };
        let (first_line_tx, first_line_rx) = mpsc::channel();
        let stdout_reader = thread::spawn(move || {
            let mut lines = BufReader::new(stdout).lines();
            let _ = first_line_tx.send(lines.next().transpose());
            for line in lines.map_while(Result::ok) {
                tracing::debug!("mdx server: {line}");
            }
        });

        let first_line = match first_line_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(line)) => line.unwrap_or_default(),
            Ok(Err(e)) => {
                stop(&mut child, Some(stdout_reader));
                return Err(MdxError::Io(e));
            }
            Err(_) => {
                stop(&mut child, Some(stdout_reader));
                return Err(MdxError::Startup(format!(
                    "no answer from {} within {}s",
                    script.display(),
                    STARTUP_TIMEOUT.as_secs()
                )));
            }
        };
        if first_line.starts_with(MDX_MODULES_MISSING) {
            stop(&mut child, Some(stdout_reader));
            return Err(MdxError::ModulesMissing(first_line));
        }
        if !first_line.contains(MDX_SERVER_READY) {
            stop(&mut child, Some(stdout_reader));
            return Err(MdxError::Startup(format!(
                "unexpected first line from {}: {:?}",
                script.display(),
                first_line.trim_end()
            )));
        }

        Ok(Self {
            child,
            stdout_reader: Some(stdout_reader),
            url: format!("http://localhost:{}", config.server_port),
            client,
        })
    }

    fn render(&self, text: &str) -> Result<RenderOutcome, MdxError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(text.to_owned())
            .send()?;
        if response.status() == reqwest::StatusCode::OK {
            return Ok(RenderOutcome::Valid);
        }
        Ok(RenderOutcome::Invalid(response.text()?))
    }
}

impl Drop for MdxServer {
    fn drop(&mut self) {
        tracing::debug!("stopping MDX server");
        stop(&mut self.child, self.stdout_reader.take());
    }
}

/// Kill and reap `child`, then wait for its stdout reader to see EOF.
fn stop(child: &mut Child, reader: Option<JoinHandle<()>>) {
    let _ = child.kill();
    let _ = child.wait();
    if let Some(reader) = reader {
        let _ = reader.join();
    }
}

/// Renderer state for one validation run.
///
/// The tooling check runs at most once, the scripts are written and the
/// server started on first use. Once the tooling turns out to be missing,
/// later documents are not rendered.
pub struct MdxSession {
    config: ReadmeConfig,
    tooling_installed: Option<bool>,
    server: Option<MdxServer>,
    scripts: Option<Scripts>,
}

impl MdxSession {
    #[must_use]
    pub fn new(config: ReadmeConfig) -> Self {
        Self {
            config,
            tooling_installed: None,
            server: None,
            scripts: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReadmeConfig {
        &self.config
    }

    /// Whether documents should be rendered at all.
    pub fn is_enabled(&mut self) -> bool {
        match self.config.mode {
            ReadmeMode::Disabled => false,
            ReadmeMode::Forced => self.tooling_installed != Some(false),
            ReadmeMode::Auto => *self.tooling_installed.get_or_insert_with(|| {
                are_modules_installed_for_verify(&self.config.content_path)
                    && configured_scripts_present(&self.config)
            }),
        }
    }

    #[must_use]
    pub fn is_server_running(&self) -> bool {
        self.server.is_some()
    }

    /// Directory the renderer scripts run from. The bundled scripts are
    /// written on the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled scripts cannot be written.
    pub fn scripts_dir(&mut self) -> Result<PathBuf, MdxError> {
        let scripts = match self.scripts.take() {
            Some(scripts) => scripts,
            None => Scripts::prepare(&self.config)?,
        };
        let dir = scripts.dir().to_path_buf();
        self.scripts = Some(scripts);
        Ok(dir)
    }

    /// Render `text` with the configured mode.
    ///
    /// # Errors
    ///
    /// Returns an error if node, its modules or the scripts are missing (see
    /// [`MdxError::is_tooling_missing`]), the server fails to come up, or the
    /// server cannot be reached.
    pub fn render(&mut self, text: &str) -> Result<RenderOutcome, MdxError> {
        let result = self.render_with_tooling(text);
        if let Err(e) = &result
            && e.is_tooling_missing()
        {
            self.tooling_installed = Some(false);
        }
        result
    }

    fn render_with_tooling(&mut self, text: &str) -> Result<RenderOutcome, MdxError> {
        self.scripts_dir()?;
        let Some(scripts) = &self.scripts else {
            return Err(MdxError::Startup("renderer scripts are not prepared".to_owned()));
        };

        if self.config.command_mode {
            return render_once(&self.config, &scripts.script(PARSE_SCRIPT)?, text);
        }
        if self.server.is_none() {
            let script = scripts.script(SERVER_SCRIPT)?;
            self.server = Some(MdxServer::start(&self.config, &script)?);
        }
        match &self.server {
            Some(server) => server.render(text),
            None => Err(MdxError::Startup("server handle missing".to_owned())),
        }
    }

    /// Stop the renderer server if it is running.
    pub fn shutdown(&mut self) {
        self.server = None;
    }
}

impl std::fmt::Debug for MdxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdxSession")
            .field("config", &self.config)
            .field("tooling_installed", &self.tooling_installed)
            .field("server_running", &self.server.is_some())
            .finish_non_exhaustive()
    }
}

/// `node mdx-parse.js` with the document on stdin.
///
/// Stdin is fed from its own thread so that a child writing to stdout or
/// stderr before it reads cannot block both sides.
fn render_once(config: &ReadmeConfig, script: &Path, text: &str) -> Result<RenderOutcome, MdxError> {
    let mut child = node_command(config, script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(MdxError::NodeUnavailable)?;

    let writer = child.stdin.take().map(|mut stdin| {
        let text = text.to_owned();
        thread::spawn(move || stdin.write_all(text.as_bytes()))
    });
    let output = child.wait_with_output().map_err(MdxError::Io)?;
    if let Some(writer) = writer
        && let Ok(Err(e)) = writer.join()
        && e.kind() != std::io::ErrorKind::BrokenPipe
    {
        return Err(MdxError::Io(e));
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    if output.status.success() {
        Ok(RenderOutcome::Valid)
    } else if output.status.code() == Some(MODULES_MISSING_EXIT) {
        Err(MdxError::ModulesMissing(stderr))
    } else {
        Ok(RenderOutcome::Invalid(stderr))
    }
}

/// `node <script>` with `NODE_PATH` extended by the content path's modules.
fn node_command(config: &ReadmeConfig, script: &Path) -> Command {
    let mut paths: Vec<PathBuf> = vec![config.content_path.join("node_modules")];
    if let Some(existing) = std::env::var_os("NODE_PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    let node_path = std::env::join_paths(paths).unwrap_or_else(|_| OsString::new());

    let mut command = Command::new("node");
    command
        .arg(script)
        .current_dir(&config.content_path)
        .env("NODE_PATH", node_path);
    command
}
