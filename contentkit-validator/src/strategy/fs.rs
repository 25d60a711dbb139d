//! Filesystem validation source.
//!
//! Discovers content files and pack directories on disk and reads them safely
//! for the validation pipeline:
//! - Symlinks are not followed by default (`follow_links: false`)
//! - Resolved paths are checked to remain within the scan root
//! - Device files, pipes, and sockets are skipped
//! - Maximum directory depth is enforced
//! - Bounded streaming reads enforce `max_file_size`

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use contentkit::kind::{INTEGRATIONS_DIR, PACK_METADATA_FILE_NAME, PACKS_DIR};
use glob::Pattern;
use walkdir::WalkDir;

use crate::config::FsSourceConfig;
use crate::error::{ScanError, ScanErrorKind};

/// Directories to skip
pub const SKIP_DIRS: &[&str] = &["target", "node_modules", ".git", ".venv"];

/// What a walk over the configured paths found.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Content files ready to read, sorted.
    pub files: Vec<PathBuf>,
    /// Pack directories, sorted.
    pub packs: Vec<PathBuf>,
    /// Walk errors, boundary violations and bad exclude patterns.
    pub scan_errors: Vec<ScanError>,
}

/// Check if a path matches any of the exclude patterns
fn matches_exclude(path: &Path, exclude_patterns: &[Pattern]) -> bool {
    let path_str = path.to_string_lossy();
    exclude_patterns.iter().any(|pattern| {
        pattern.matches(&path_str)
            || path
                .file_name()
                .is_some_and(|name| pattern.matches(&name.to_string_lossy()))
    })
}

/// Returns `true` if the entry should be **included** (i.e., is NOT a skip dir).
fn is_not_skip_dir(entry: &walkdir::DirEntry) -> bool {
    if entry.file_type().is_dir()
        && let Some(name) = entry.file_name().to_str()
    {
        return !SKIP_DIRS.contains(&name);
    }
    true
}

/// Check if file has a supported extension.
fn matches_file_pattern(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            ["md", "json", "yaml", "yml", "png"]
                .iter()
                .any(|ext| e.eq_ignore_ascii_case(ext))
        })
}

/// A directory directly under `Packs`, or one carrying `pack_metadata.json`.
#[must_use]
pub fn is_pack_dir(path: &Path) -> bool {
    let under_packs = path
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|parent| parent == PACKS_DIR);
    under_packs || path.join(PACK_METADATA_FILE_NAME).is_file()
}

/// `Integrations/<Name>/<Name>_image.png` or a loose `*_image.png` next to a
/// unified integration.
#[must_use]
pub fn is_integration_image(path: &Path) -> bool {
    let is_image_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with("_image.png"));
    is_image_name
        && path
            .components()
            .any(|c| matches!(c, Component::Normal(name) if name == INTEGRATIONS_DIR))
}

/// Whether the package YAML next to `image` already covers it.
#[must_use]
pub fn has_package_yaml(image: &Path) -> bool {
    let Some(dir) = image.parent() else {
        return false;
    };
    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    dir.join(format!("{name}.yml")).is_file()
}

/// Path of `file` relative to the scan root it was found under. A root that
/// is itself a file maps to its file name.
#[must_use]
pub fn relative_to_root(file: &Path, roots: &[PathBuf]) -> Option<PathBuf> {
    let root = roots.iter().find(|root| file.starts_with(root))?;
    match file.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => file.file_name().map(PathBuf::from),
        Ok(rel) => Some(rel.to_path_buf()),
        Err(_) => None,
    }
}

/// Regular files under `root` keyed by their relative path.
fn tree_files(root: &Path) -> BTreeMap<PathBuf, PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(is_not_skip_dir)
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?.to_path_buf();
            Some((relative, entry.path().to_path_buf()))
        })
        .collect()
}

/// Whether a file was added, removed or changed between two directory trees.
#[must_use]
pub fn trees_differ(current: &Path, previous: &Path) -> bool {
    let current_files = tree_files(current);
    let previous_files = tree_files(previous);
    if current_files.len() != previous_files.len() {
        return true;
    }
    current_files
        .iter()
        .any(|(relative, path)| match previous_files.get(relative) {
            Some(old) => std::fs::read(path).ok() != std::fs::read(old).ok(),
            None => true,
        })
}

/// Find all files and pack directories to validate in the given paths.
///
/// Walk failures are returned as scan errors, never silently discarded.
pub fn find_files(config: &FsSourceConfig) -> Discovery {
    let mut discovery = Discovery::default();

    let mut exclude_patterns = Vec::with_capacity(config.exclude.len());
    for pat_str in &config.exclude {
        match Pattern::new(pat_str) {
            Ok(pat) => exclude_patterns.push(pat),
            Err(e) => discovery.scan_errors.push(ScanError::new(
                pat_str,
                ScanErrorKind::InvalidExcludePattern,
                format!("Invalid exclude glob pattern '{pat_str}': {e}"),
            )),
        }
    }

    for root in &config.paths {
        let canonical_root = match root.canonicalize() {
            Ok(r) => r,
            Err(e) => {
                discovery.scan_errors.push(ScanError::new(
                    root,
                    ScanErrorKind::IoError,
                    format!("Failed to canonicalize root path: {e}"),
                ));
                continue;
            }
        };

        if root.is_file() {
            if matches_file_pattern(root) && !matches_exclude(root, &exclude_patterns) {
                discovery.files.push(root.clone());
            }
            continue;
        }

        if !root.is_dir() {
            continue;
        }

        for entry_result in WalkDir::new(root)
            .follow_links(config.follow_links)
            .max_depth(config.max_depth)
            .into_iter()
            .filter_entry(is_not_skip_dir)
        {
            let entry = match entry_result {
                Ok(e) => e,
                Err(walk_err) => {
                    let path = walk_err
                        .path()
                        .map_or_else(|| root.clone(), Path::to_path_buf);
                    discovery.scan_errors.push(ScanError::new(
                        path,
                        ScanErrorKind::WalkError,
                        format!("Directory traversal error: {walk_err}"),
                    ));
                    continue;
                }
            };

            let path = entry.path();
            if matches_exclude(path, &exclude_patterns) {
                continue;
            }

            if entry.file_type().is_dir() {
                if is_pack_dir(path) {
                    discovery.packs.push(path.to_path_buf());
                }
                continue;
            }

            if !path.is_file() {
                continue;
            }

            match path.canonicalize() {
                Ok(canonical_path) if !canonical_path.starts_with(&canonical_root) => {
                    discovery.scan_errors.push(ScanError::new(
                        path,
                        ScanErrorKind::OutsideRepository,
                        format!(
                            "Path resolves outside the scan root: {} -> {}",
                            path.display(),
                            canonical_path.display()
                        ),
                    ));
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    discovery.scan_errors.push(ScanError::new(
                        path,
                        ScanErrorKind::IoError,
                        format!("Failed to canonicalize path: {e}"),
                    ));
                    continue;
                }
            }

            // Skip devices, pipes and sockets
            #[cfg(unix)]
            {
                use std::os::unix::fs::FileTypeExt;
                if let Ok(ft) = entry.metadata().map(|m| m.file_type())
                    && (ft.is_block_device()
                        || ft.is_char_device()
                        || ft.is_fifo()
                        || ft.is_socket())
                {
                    continue;
                }
            }

            if matches_file_pattern(path) {
                discovery.files.push(path.to_path_buf());
            }
        }
    }

    discovery.files.sort();
    discovery.files.dedup();
    discovery.packs.sort();
    discovery.packs.dedup();
    discovery
}

/// Read a file as UTF-8 using a bounded streaming read, enforcing
/// `max_file_size`.
///
/// # Errors
///
/// Returns a [`ScanError`] if the file is too large, cannot be read, or is
/// not valid UTF-8.
pub fn read_file_bounded(path: &Path, max_file_size: u64) -> Result<String, ScanError> {
    let file = std::fs::File::open(path).map_err(|e| {
        ScanError::new(path, ScanErrorKind::IoError, format!("Failed to open file: {e}"))
    })?;

    // Read at most max_file_size + 1 bytes to detect oversized files
    let mut buffer = Vec::new();
    file.take(max_file_size.saturating_add(1))
        .read_to_end(&mut buffer)
        .map_err(|e| {
            ScanError::new(path, ScanErrorKind::IoError, format!("Failed to read file: {e}"))
        })?;

    if u64::try_from(buffer.len()).unwrap_or(u64::MAX) > max_file_size {
        return Err(ScanError::new(
            path,
            ScanErrorKind::FileTooLarge,
            format!("File exceeds maximum size of {max_file_size} bytes"),
        ));
    }

    String::from_utf8(buffer).map_err(|_| {
        ScanError::new(path, ScanErrorKind::InvalidEncoding, "File is not valid UTF-8")
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(root: &Path) -> FsSourceConfig {
        FsSourceConfig {
            paths: vec![root.to_path_buf()],
            ..FsSourceConfig::default()
        }
    }

    #[test]
    fn test_finds_content_files_and_packs() {
        let tmp = TempDir::new().unwrap();
        let pack = tmp.path().join("Packs").join("Echo");
        fs::create_dir_all(pack.join("IncidentFields")).unwrap();
        fs::create_dir_all(pack.join("node_modules")).unwrap();
        fs::write(pack.join("README.md"), "# Echo").unwrap();
        fs::write(pack.join("IncidentFields").join("incidentfield-a.json"), "{}").unwrap();
        fs::write(pack.join("node_modules").join("skip.json"), "{}").unwrap();
        fs::write(pack.join("notes.txt"), "ignored").unwrap();

        let discovery = find_files(&config_for(tmp.path()));
        assert!(discovery.scan_errors.is_empty());
        assert_eq!(discovery.packs, vec![pack.clone()]);
        assert_eq!(
            discovery.files,
            vec![
                pack.join("IncidentFields").join("incidentfield-a.json"),
                pack.join("README.md"),
            ]
        );
    }

    #[test]
    fn test_exclude_patterns() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.json"), "{}").unwrap();
        fs::write(tmp.path().join("drop.json"), "{}").unwrap();
        let mut config = config_for(tmp.path());
        config.exclude = vec!["drop.json".to_owned(), "[".to_owned()];

        let discovery = find_files(&config);
        assert_eq!(discovery.files, vec![tmp.path().join("keep.json")]);
        assert_eq!(discovery.scan_errors.len(), 1);
        assert_eq!(
            discovery.scan_errors[0].kind,
            ScanErrorKind::InvalidExcludePattern
        );
    }

    #[test]
    fn test_bounded_read_rejects_large_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.json");
        fs::write(&path, "x".repeat(64)).unwrap();
        let err = read_file_bounded(&path, 10).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::FileTooLarge);
        assert_eq!(read_file_bounded(&path, 64).unwrap().len(), 64);
    }

    #[test]
    fn test_integration_image_detection() {
        assert!(is_integration_image(Path::new(
            "Packs/Echo/Integrations/Echo/Echo_image.png"
        )));
        assert!(!is_integration_image(Path::new(
            "Packs/Echo/doc_files/Echo_image.png"
        )));
        assert!(!is_integration_image(Path::new(
            "Packs/Echo/Integrations/Echo/screenshot.png"
        )));
    }

    #[test]
    fn test_relative_to_root() {
        let roots = vec![PathBuf::from("repo/Packs"), PathBuf::from("single.json")];
        assert_eq!(
            relative_to_root(Path::new("repo/Packs/Echo/a.json"), &roots),
            Some(PathBuf::from("Echo/a.json"))
        );
        assert_eq!(
            relative_to_root(Path::new("single.json"), &roots),
            Some(PathBuf::from("single.json"))
        );
        assert_eq!(relative_to_root(Path::new("elsewhere/a.json"), &roots), None);
    }

    #[test]
    fn test_trees_differ() {
        let current = TempDir::new().unwrap();
        let previous = TempDir::new().unwrap();
        for root in [current.path(), previous.path()] {
            fs::create_dir_all(root.join("Layouts")).unwrap();
            fs::write(root.join("Layouts").join("layout-a.json"), "{}").unwrap();
            fs::write(root.join("README.md"), "# Echo\n").unwrap();
        }
        fs::create_dir_all(current.path().join("node_modules")).unwrap();
        fs::write(current.path().join("node_modules").join("x.js"), "").unwrap();
        assert!(!trees_differ(current.path(), previous.path()));

        fs::write(current.path().join("README.md"), "# Echo v2\n").unwrap();
        assert!(trees_differ(current.path(), previous.path()));

        fs::write(current.path().join("README.md"), "# Echo\n").unwrap();
        fs::write(current.path().join("Layouts").join("layout-b.json"), "{}").unwrap();
        assert!(trees_differ(current.path(), previous.path()));
    }
}
