//! End-of-run upload summary, rendered as box-drawing grids.

use std::io::{self, Write};

use colored::Colorize;
use contentkit::ContentVersion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedItem {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    pub name: String,
    pub kind: String,
    pub server_version: ContentVersion,
    pub from_version: ContentVersion,
    pub to_version: ContentVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub name: String,
    pub kind: String,
    pub error: String,
}

/// Per-item outcomes of one upload run.
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub successful: Vec<UploadedItem>,
    pub version_mismatch: Vec<VersionMismatch>,
    pub failed: Vec<FailedUpload>,
}

impl UploadSummary {
    /// `0` when every item uploaded, `1` otherwise.
    #[must_use]
    pub fn status_code(&self) -> i32 {
        i32::from(!self.version_mismatch.is_empty() || !self.failed.is_empty())
    }

    /// Write the summary with one colored grid per non-empty section.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    pub fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "\n\nUPLOAD SUMMARY:")?;

        if !self.successful.is_empty() {
            let rows: Vec<Vec<String>> = self
                .successful
                .iter()
                .map(|item| vec![item.name.clone(), item.kind.clone()])
                .collect();
            writeln!(out, "{}", "\nSUCCESSFUL UPLOADS:".green())?;
            writeln!(out, "{}", render_grid(&["NAME", "TYPE"], &rows).green())?;
        }

        if !self.version_mismatch.is_empty() {
            let rows: Vec<Vec<String>> = self
                .version_mismatch
                .iter()
                .map(|item| {
                    vec![
                        item.name.clone(),
                        item.kind.clone(),
                        item.server_version.to_string(),
                        item.from_version.to_string(),
                        item.to_version.to_string(),
                    ]
                })
                .collect();
            let headers = [
                "NAME",
                "TYPE",
                "SERVER VERSION",
                "FILE_FROM_VERSION",
                "FILE_TO_VERSION",
            ];
            writeln!(out, "{}", "\nNOT UPLOADED DUE TO VERSION MISMATCH:".yellow())?;
            writeln!(out, "{}", render_grid(&headers, &rows).yellow())?;
        }

        if !self.failed.is_empty() {
            let rows: Vec<Vec<String>> = self
                .failed
                .iter()
                .map(|item| vec![item.name.clone(), item.kind.clone(), item.error.clone()])
                .collect();
            writeln!(out, "{}", "\nFAILED UPLOADS:".bright_red())?;
            writeln!(
                out,
                "{}",
                render_grid(&["NAME", "TYPE", "ERROR"], &rows).bright_red()
            )?;
        }

        Ok(())
    }
}

/// Render `rows` as a double-ruled grid.
///
/// Columns are as wide as their widest cell, and at least two wider than
/// the header. Multi-line cells are flattened onto one line.
#[must_use]
pub fn render_grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.replace('\n', " ")).collect())
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .fold(header.chars().count() + 2, usize::max)
        })
        .collect();

    let rule = |left: char, fill: char, join: char, right: char| -> String {
        let mut line = String::new();
        line.push(left);
        for (i, width) in widths.iter().enumerate() {
            if i > 0 {
                line.push(join);
            }
            line.extend(std::iter::repeat_n(fill, width + 2));
        }
        line.push(right);
        line.push('\n');
        line
    };
    let line = |cells: &[&str]| -> String {
        let mut text = String::from('\u{2502}');
        for (cell, width) in cells.iter().zip(&widths) {
            let pad = width - cell.chars().count();
            text.push(' ');
            text.push_str(cell);
            text.extend(std::iter::repeat_n(' ', pad + 1));
            text.push('\u{2502}');
        }
        text.push('\n');
        text
    };

    let mut grid = rule('\u{2552}', '\u{2550}', '\u{2564}', '\u{2555}');
    grid.push_str(&line(headers));
    grid.push_str(&rule('\u{255e}', '\u{2550}', '\u{256a}', '\u{2561}'));
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            grid.push_str(&rule('\u{251c}', '\u{2500}', '\u{253c}', '\u{2524}'));
        }
        let cells: Vec<&str> = (0..headers.len())
            .map(|c| row.get(c).map_or("", String::as_str))
            .collect();
        grid.push_str(&line(&cells));
    }
    grid.push_str(&rule('\u{2558}', '\u{2550}', '\u{2567}', '\u{255b}'));
    grid
}
