//! README checks: the document renders as MDX and GitHub images use raw links.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{Findings, ValidationError};
use crate::mdx::{MdxSession, RenderOutcome};

/// `![alt](https://github.com/...)` or `src="https://github.com/..."`.
static GITHUB_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r#"(?i)(?:!\[[^\]]*\]\(|src\s*=\s*")(https://github\.com/[^\s)"]+)"#) {
        Ok(re) => re,
        Err(e) => panic!("Invalid image link regex: {e}"),
    }
});

static BR_RE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"(?i)<br>(</br>)?") {
    Ok(re) => re,
    Err(e) => panic!("Invalid <br> regex: {e}"),
});

static HR_RE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"(?i)<hr>(</hr>)?") {
    Ok(re) => re,
    Err(e) => panic!("Invalid <hr> regex: {e}"),
});

static PRE_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"(?i)<pre>") {
    Ok(re) => re,
    Err(e) => panic!("Invalid <pre> regex: {e}"),
});

static PRE_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"(?i)</pre>") {
    Ok(re) => re,
    Err(e) => panic!("Invalid </pre> regex: {e}"),
});

static HTML_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"(?s)<!--.*?-->") {
    Ok(re) => re,
    Err(e) => panic!("Invalid comment regex: {e}"),
});

/// Validates one README file.
#[derive(Debug)]
pub struct ReadMeValidator {
    content: String,
    findings: Findings,
}

impl ReadMeValidator {
    /// Read the README at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read as UTF-8 text.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_content(path, content))
    }

    #[must_use]
    pub fn from_content(path: impl Into<PathBuf>, content: String) -> Self {
        Self {
            content,
            findings: Findings::new(path),
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

    pub fn is_valid_file(&mut self, session: &mut MdxSession) -> bool {
        let images_valid = self.is_image_path_valid();
        let mdx_valid = self.is_mdx_file(session);
        images_valid && mdx_valid
    }

    /// Every GitHub image link must use the `raw` form.
    pub fn is_image_path_valid(&mut self) -> bool {
        let invalid: Vec<(String, String)> = GITHUB_IMAGE_RE
            .captures_iter(&self.content)
            .filter_map(|caps| caps.get(1))
            .map(|url| url.as_str())
            .filter(|url| !is_raw_github_url(url))
            .map(|url| (url.to_owned(), raw_github_url(url)))
            .collect();

        for (url, suggestion) in &invalid {
            self.findings.fail(
                "is_image_path_valid",
                format!(
                    "Detected following image url:\n{url}\nWhich is not the raw link. \
                     You probably want to use the following raw image url:\n{suggestion}"
                ),
            );
        }
        invalid.is_empty()
    }

    /// Render the README; skipped when the renderer is disabled or unavailable.
    pub fn is_mdx_file(&mut self, session: &mut MdxSession) -> bool {
        if self.is_html_doc() {
            return true;
        }
        if !session.is_enabled() {
            tracing::debug!(file = %self.findings.file().display(), "MDX verification skipped");
            return true;
        }

        match session.render(&self.fix_mdx()) {
            Ok(RenderOutcome::Valid) => true,
            Ok(RenderOutcome::Invalid(reason)) => self.findings.fail(
                "is_mdx_file",
                format!("Failed verifying README.md: {reason}"),
            ),
            Err(e) if e.is_tooling_missing() => {
                tracing::warn!(
                    file = %self.findings.file().display(),
                    "MDX tooling is not available ({e}), skipping MDX verification"
                );
                true
            }
            Err(e) => self
                .findings
                .fail("is_mdx_file", format!("Failed verifying README.md: {e}")),
        }
    }

    /// READMEs written as plain HTML are not rendered.
    #[must_use]
    pub fn is_html_doc(&self) -> bool {
        let trimmed = self.content.trim();
        trimmed.starts_with("<p>") && trimmed.ends_with("</p>")
    }

    /// Rewrite HTML that MDX rejects but the platform accepts.
    #[must_use]
    pub fn fix_mdx(&self) -> String {
        let text = BR_RE.replace_all(&self.content, |caps: &Captures<'_>| self_closing(caps, "<br/>"));
        let text = HR_RE.replace_all(&text, |caps: &Captures<'_>| self_closing(caps, "<hr/>"));
        let text = PRE_OPEN_RE.replace_all(&text, "<pre>{`");
        let text = PRE_CLOSE_RE.replace_all(&text, "`}</pre>");
        HTML_COMMENT_RE.replace_all(&text, "").into_owned()
    }
}

fn self_closing(caps: &Captures<'_>, replacement: &str) -> String {
    if caps.get(1).is_some() {
        caps[0].to_owned()
    } else {
        replacement.to_owned()
    }
}

/// `https://github.com/<owner>/<repo>/raw/...`.
fn is_raw_github_url(url: &str) -> bool {
    url.splitn(6, '/')
        .nth(5)
        .and_then(|rest| rest.split('/').next())
        .is_some_and(|segment| segment.eq_ignore_ascii_case("raw"))
}

/// The same file through the `raw` endpoint.
fn raw_github_url(url: &str) -> String {
    if url.contains("/blob/") {
        return url.replacen("/blob/", "/raw/", 1);
    }
    let parts: Vec<&str> = url.splitn(7, '/').collect();
    match parts.as_slice() {
        [scheme, empty, host, owner, repo, _, rest] => {
            format!("{scheme}/{empty}/{host}/{owner}/{repo}/raw/{rest}")
        }
        _ => url.to_owned(),
    }
}
