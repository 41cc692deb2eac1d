//! Archive manifest format.
//!
//! A manifest is a text stand-in for archive bytes. One entry per line, in
//! archive order:
//!
//! ```text
//! # comment
//! a/b.txt = hello
//! a/c/d.txt = deep
//! empty/
//! ```
//!
//! A line ending in `/` is a directory entry. Anything else is a file
//! entry whose content follows ` = ` (`\n` in the content is a newline).

use std::fmt;

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Line number where the entry appears (1-indexed).
    pub line_number: usize,
    pub name: String,
    pub is_dir: bool,
    pub content: Vec<u8>,
}

/// A malformed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestError {
    pub line_number: usize,
    pub message: String,
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manifest line {}: {}", self.line_number, self.message)
    }
}

impl std::error::Error for ManifestError {}

/// Parse the manifest format into entries.
pub fn parse_manifest(content: &str) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut entries = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_number = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((name, body)) = line.split_once(" = ") {
            let name = name.trim();
            if name.is_empty() || name.ends_with('/') {
                return Err(ManifestError {
                    line_number,
                    message: format!("bad file entry name {name:?}"),
                });
            }
            entries.push(ManifestEntry {
                line_number,
                name: name.to_string(),
                is_dir: false,
                content: body.replace("\\n", "\n").into_bytes(),
            });
        } else if line.ends_with('/') {
            entries.push(ManifestEntry {
                line_number,
                name: line.to_string(),
                is_dir: true,
                content: Vec::new(),
            });
        } else {
            return Err(ManifestError {
                line_number,
                message: format!("expected `name = content` or `dir/`, got {line:?}"),
            });
        }
    }

    Ok(entries)
}

/// Render entries back into manifest text.
pub fn render_manifest(entries: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (name, content) in entries {
        if name.ends_with('/') {
            out.push_str(name);
        } else {
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(&content.replace('\n', "\\n"));
        }
        out.push('\n');
    }
    out
}
