//! Configuration types for content validation.
//!
//! Split into core validation config and source-specific config (how files
//! are discovered), so the validators never see filesystem walk options.

use std::path::PathBuf;

/// Port the MDX renderer server listens on.
pub const DEFAULT_MDX_SERVER_PORT: u16 = 6161;

/// Whether README files are rendered through the external MDX toolchain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReadmeMode {
    /// Render only when `node` and the required npm modules are installed.
    #[default]
    Auto,
    /// Always render without probing the tooling (CI).
    Forced,
    /// Never render; only the image link checks run.
    Disabled,
}

/// README renderer options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ReadmeConfig {
    pub mode: ReadmeMode,
    /// Run `node mdx-parse.js` per README instead of a long-lived server.
    pub command_mode: bool,
    /// Directory whose `node_modules` provides the MDX packages.
    pub content_path: PathBuf,
    /// Directory holding `mdx-parse.js` and `mdx-parse-server.js`. `None`
    /// runs the copies bundled with this crate.
    pub scripts_dir: Option<PathBuf>,
    pub server_port: u16,
}

impl Default for ReadmeConfig {
    fn default() -> Self {
        Self {
            mode: ReadmeMode::Auto,
            command_mode: false,
            content_path: PathBuf::from("."),
            scripts_dir: None,
            server_port: DEFAULT_MDX_SERVER_PORT,
        }
    }
}

impl ReadmeConfig {
    /// Build the config from the process environment.
    ///
    /// - `DEMISTO_README_VALIDATION`: `false`/`0`/`no` disables rendering,
    ///   any other non-empty value forces it.
    /// - `CI`: any non-empty value forces rendering.
    /// - `DEMISTO_MDX_CMD_VERIFY`: any non-empty value selects command mode.
    /// - `DEMISTO_MDX_SCRIPTS_DIR`: location of the renderer scripts.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ReadmeConfig::from_env`] with an injectable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match set("DEMISTO_README_VALIDATION") {
            Some(v) if matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no") => {
                ReadmeMode::Disabled
            }
            Some(_) => ReadmeMode::Forced,
            None if set("CI").is_some() => ReadmeMode::Forced,
            None => ReadmeMode::Auto,
        };

        Self {
            mode,
            command_mode: set("DEMISTO_MDX_CMD_VERIFY").is_some(),
            scripts_dir: set("DEMISTO_MDX_SCRIPTS_DIR").map(PathBuf::from),
            ..Self::default()
        }
    }
}

/// Core validation config, independent of how files are found.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ValidationConfig {
    /// Directory holding the previous revision of the content tree, used for
    /// backward-compatibility checks. A file is looked up by its path
    /// relative to the scan root it was found under.
    pub previous_root: Option<PathBuf>,
    pub readme: ReadmeConfig,
    /// Additional placeholder images that count as "default".
    pub extra_default_images: Vec<PathBuf>,
}

/// Filesystem-specific source options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct FsSourceConfig {
    /// Paths to scan (files or directories). Required, must be non-empty.
    pub paths: Vec<PathBuf>,
    /// Exclude patterns (glob format).
    pub exclude: Vec<String>,
    /// Maximum file size in bytes (default: 10 MB).
    pub max_file_size: u64,
    /// Whether to follow symbolic links (default: `false`).
    pub follow_links: bool,
    /// Maximum directory traversal depth (default: 64).
    pub max_depth: usize,
    /// Maximum total number of files to scan (default: `100_000`).
    pub max_files: usize,
}

impl Default for FsSourceConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            exclude: Vec::new(),
            max_file_size: 10_485_760,
            follow_links: false,
            max_depth: 64,
            max_files: 100_000,
        }
    }
}
