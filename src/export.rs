//! Recombulator: assemble a fragment selection into an export bundle.
//!
//! Read-only over fragments handed to it; serializes a selection into a
//! text bundle, a markdown bundle, or a ZIP archive with one file per
//! fragment. The output has no stored identity — bytes for the response
//! and nothing else.

use std::io::Write;

use crate::models::Fragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Md,
    Zip,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "txt" => Some(ExportFormat::Txt),
            "md" => Some(ExportFormat::Md),
            "zip" => Some(ExportFormat::Zip),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain",
            ExportFormat::Md => "text/markdown",
            ExportFormat::Zip => "application/zip",
        }
    }

    /// Suggested download filename for the bundle.
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "fragments.txt",
            ExportFormat::Md => "fragments.md",
            ExportFormat::Zip => "fragments.zip",
        }
    }
}

#[derive(Debug)]
pub enum ExportError {
    /// Every requested id was malformed or unknown; the caller gets an
    /// explicit signal instead of a silently empty artifact.
    EmptySelection,
    Archive(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::EmptySelection => write!(f, "no fragments selected"),
            ExportError::Archive(e) => write!(f, "archive assembly failed: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

/// Parse a comma/whitespace separated id list, dropping malformed entries
/// and duplicates. Order does not matter; the store returns ascending ids.
pub fn parse_ids(raw: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    for piece in raw.split([',', ' ', '\t', '\n']) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if let Ok(id) = piece.parse::<i64>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Deduplicate an already-numeric id list, preserving first occurrence.
pub fn dedupe_ids(raw: &[i64]) -> Vec<i64> {
    let mut ids = Vec::new();
    for &id in raw {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

pub fn render_markdown(fragments: &[Fragment]) -> String {
    let parts: Vec<String> = fragments
        .iter()
        .map(|f| format!("---\nFragment #{}\n\n{}\n", f.id, f.content))
        .collect();
    parts.join("\n")
}

pub fn render_text(fragments: &[Fragment]) -> String {
    let parts: Vec<String> = fragments
        .iter()
        .map(|f| format!("[Fragment #{}]\n{}\n", f.id, f.content))
        .collect();
    parts.join("\n")
}

/// One `fragment_<id>.md` entry per fragment, each holding that
/// fragment's single-fragment markdown rendering, in input order
/// (ascending id when fetched through the store).
fn build_zip(fragments: &[Fragment]) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    {
        let mut archive = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for fragment in fragments {
            let name = format!("fragment_{}.md", fragment.id);
            archive
                .start_file(&name, zip::write::SimpleFileOptions::default())
                .map_err(|e| ExportError::Archive(e.to_string()))?;
            let content = render_markdown(std::slice::from_ref(fragment));
            archive
                .write_all(content.as_bytes())
                .map_err(|e| ExportError::Archive(e.to_string()))?;
        }
        archive
            .finish()
            .map_err(|e| ExportError::Archive(e.to_string()))?;
    }
    Ok(buf)
}

/// Serialize the resolved fragment selection. An empty selection is an
/// explicit error, never an empty artifact.
pub fn assemble(fragments: &[Fragment], format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    if fragments.is_empty() {
        return Err(ExportError::EmptySelection);
    }
    match format {
        ExportFormat::Txt => Ok(render_text(fragments).into_bytes()),
        ExportFormat::Md => Ok(render_markdown(fragments).into_bytes()),
        ExportFormat::Zip => build_zip(fragments),
    }
}
