//! Integration image checks: exactly one image, within the size budget, and
//! not one of the placeholder images.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use contentkit::ContentDocument;
use contentkit::unify::UNIFIED_SUFFIX;

use crate::error::{Findings, ValidationError};

/// Largest accepted image, in bytes.
pub const IMAGE_MAX_SIZE: usize = 10 * 1024;

const DEFAULT_IMAGE: &[u8] = include_bytes!("../assets/default_image.png");
const DEFAULT_DBOT_IMAGE: &[u8] = include_bytes!("../assets/default_dbot_image.png");

/// Known placeholder images.
#[derive(Debug, Clone)]
pub struct DefaultImages {
    images: Vec<Vec<u8>>,
}

impl Default for DefaultImages {
    fn default() -> Self {
        Self {
            images: vec![DEFAULT_IMAGE.to_vec(), DEFAULT_DBOT_IMAGE.to_vec()],
        }
    }
}

impl DefaultImages {
    /// The built-in placeholders plus the contents of `extra`.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the extra files cannot be read.
    pub fn with_files(extra: &[PathBuf]) -> std::io::Result<Self> {
        let mut images = Self::default();
        for path in extra {
            images.images.push(std::fs::read(path)?);
        }
        Ok(images)
    }

    #[must_use]
    pub fn contains(&self, bytes: &[u8]) -> bool {
        self.images.iter().any(|image| image == bytes)
    }
}

enum ImageSource {
    File(PathBuf),
    Embedded(String),
}

/// Validates the image of one integration.
///
/// Accepts a `.png` file, a package YAML (image next to it) or a unified
/// YAML (image embedded as a data URI). Once a check fails the validator
/// stays invalid; later calls return the cached result.
#[derive(Debug)]
pub struct ImageValidator<'a> {
    defaults: &'a DefaultImages,
    findings: Findings,
    result: Option<bool>,
}

impl<'a> ImageValidator<'a> {
    #[must_use]
    pub fn new(file_path: impl Into<PathBuf>, defaults: &'a DefaultImages) -> Self {
        Self {
            defaults,
            findings: Findings::new(file_path),
            result: None,
        }
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        self.findings.errors()
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<ValidationError> {
        self.findings.into_errors()
    }

    pub fn is_valid(&mut self) -> bool {
        if let Some(result) = self.result {
            return result;
        }
        let result = self.run_checks();
        self.result = Some(result);
        result
    }

    fn run_checks(&mut self) -> bool {
        let Some(source) = self.resolve() else {
            return false;
        };
        let Some(bytes) = self.load(&source) else {
            return false;
        };
        let within_size = self.is_within_size(&bytes);
        let not_default = self.is_not_default_image(&bytes);
        within_size && not_default
    }

    fn resolve(&mut self) -> Option<ImageSource> {
        let path = self.findings.file().to_path_buf();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("png") => Some(ImageSource::File(path)),
            Some("yml" | "yaml") => self.resolve_from_yaml(&path),
            _ => {
                self.not_an_image_file();
                None
            }
        }
    }

    fn resolve_from_yaml(&mut self, path: &Path) -> Option<ImageSource> {
        let document = match ContentDocument::load(path) {
            Ok(document) => document,
            Err(e) => {
                self.findings.fail("is_existing_image", e.to_string());
                return None;
            }
        };
        if document.is_empty() {
            self.not_an_image_file();
            return None;
        }

        let embedded = document
            .get_str("image")
            .filter(|image| !image.is_empty())
            .map(str::to_owned);
        let sibling = if is_package_yaml(path) {
            path.parent().and_then(first_png)
        } else {
            None
        };

        match (embedded, sibling) {
            (Some(_), Some(_)) => {
                self.findings.fail(
                    "is_existing_image",
                    "Image is found both in yml and in package folder, please remove one of them.",
                );
                None
            }
            (None, None) => {
                self.findings.fail(
                    "is_existing_image",
                    "You've created/modified a yml or package but failed to provide an image as \
                     a .png file, please add an image in order to proceed.",
                );
                None
            }
            (Some(data), None) => Some(ImageSource::Embedded(data)),
            (None, Some(png)) => Some(ImageSource::File(png)),
        }
    }

    fn load(&mut self, source: &ImageSource) -> Option<Vec<u8>> {
        match source {
            ImageSource::File(path) => match std::fs::read(path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    self.findings.fail(
                        "is_existing_image",
                        format!("Failed to read image {}: {e}", path.display()),
                    );
                    None
                }
            },
            ImageSource::Embedded(data) => {
                let decoded = match data.split("base64,").collect::<Vec<_>>().as_slice() {
                    [_, payload] => STANDARD.decode(payload.trim()).ok(),
                    _ => None,
                };
                if decoded.is_none() {
                    self.findings.fail(
                        "is_existing_image",
                        "The image field isn't in base64 encoding.",
                    );
                }
                decoded
            }
        }
    }

    fn is_within_size(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() <= IMAGE_MAX_SIZE {
            return true;
        }
        self.findings.fail(
            "oversize_image",
            format!(
                "Too large logo ({} bytes), please update the logo to be under 10kB.",
                bytes.len()
            ),
        )
    }

    fn is_not_default_image(&mut self, bytes: &[u8]) -> bool {
        if !self.defaults.contains(bytes) {
            return true;
        }
        self.findings.fail(
            "is_not_default_image",
            "This is the default image, please change to the integration image.",
        )
    }

    fn not_an_image_file(&mut self) {
        self.findings.fail(
            "is_existing_image",
            "This isn't an image file or unified integration file.",
        );
    }
}

/// `Integrations/Foo/Foo.yml`: the folder carries the YAML's name.
fn is_package_yaml(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if name.ends_with(UNIFIED_SUFFIX) {
        return false;
    }
    let stem = path.file_stem().and_then(|s| s.to_str());
    let dir = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|d| d.to_str());
    stem.is_some() && stem == dir
}

fn first_png(dir: &Path) -> Option<PathBuf> {
    let mut pngs: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png"))
        })
        .collect();
    pngs.sort();
    pngs.into_iter().next()
}
