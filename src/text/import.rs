//! Turning an uploaded plain-text file into clean book text.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Header lines scanned for `Title:` / `Author:` when no Gutenberg markers exist.
const HEADER_SCAN_LINES: usize = 40;

/// Book text ready to be added to the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedText {
    pub title: String,
    pub author: String,
    pub text: String,
}

impl ImportedText {
    /// SHA-256 of the cleaned text, used to spot duplicate uploads.
    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }
}

/// Hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Read a UTF-8 book file and clean it up.
pub fn read_book_file(path: &Path) -> Result<ImportedText> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let raw = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8 text", path.display()))?;

    let fallback = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_else(|| "Untitled".to_string());

    Ok(import_text(&raw, &fallback))
}

/// Normalize line endings, drop Project Gutenberg boilerplate, and pull out
/// the title and author when the header names them.
pub fn import_text(raw: &str, fallback_title: &str) -> ImportedText {
    let normalized = raw
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let start = lines.iter().position(|l| is_marker(l, "START OF"));
    let end = lines.iter().rposition(|l| is_marker(l, "END OF"));

    let (header, body) = match (start, end) {
        (Some(s), Some(e)) if e > s => (&lines[..s], &lines[s + 1..e]),
        (Some(s), _) => (&lines[..s], &lines[s + 1..]),
        (None, Some(e)) => (&lines[..0], &lines[..e]),
        (None, None) => (&lines[..lines.len().min(HEADER_SCAN_LINES)], &lines[..]),
    };

    let title = header_field(header, "Title").unwrap_or_else(|| fallback_title.trim().to_string());
    let author = header_field(header, "Author").unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    ImportedText {
        title,
        author,
        text: body.join("\n").trim().to_string(),
    }
}

/// `*** START OF THE PROJECT GUTENBERG EBOOK ... ***` and friends.
fn is_marker(line: &str, kind: &str) -> bool {
    let line = line.trim();
    let Some(rest) = line.strip_prefix("***") else {
        return false;
    };
    rest.trim_start().to_ascii_uppercase().starts_with(kind)
}

fn header_field(header: &[&str], name: &str) -> Option<String> {
    header.iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if !key.trim().eq_ignore_ascii_case(name) {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
