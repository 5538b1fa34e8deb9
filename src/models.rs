//! Core data models for the fragment engine.
//!
//! A [`Fragment`] is the only persisted entity type: an immutable unit of
//! extracted text plus its provenance. Everything else here is transient —
//! candidates produced by the extractors before provenance qualification,
//! and similarity signals that are computed on demand and never written
//! into the fragment table.

use serde::Serialize;

/// Declared format of the file a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Csv,
    Pdf,
    Docx,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::Csv => "csv",
            SourceType::Pdf => "pdf",
            SourceType::Docx => "docx",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(SourceType::Text),
            "csv" => Some(SourceType::Csv),
            "pdf" => Some(SourceType::Pdf),
            "docx" => Some(SourceType::Docx),
            _ => None,
        }
    }

    /// Map a file name to its extractor by extension. `.md` and `.txt`
    /// both follow the plain-text rule; unknown extensions return `None`
    /// and the caller counts the file as skipped.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(SourceType::Text),
            "csv" => Some(SourceType::Csv),
            "pdf" => Some(SourceType::Pdf),
            "docx" => Some(SourceType::Docx),
            _ => None,
        }
    }
}

/// Immutable stored fragment. `id` is assigned by the store and is the sole
/// ordering authority; provenance columns are nullable to admit legacy rows.
#[derive(Debug, Clone, Serialize)]
pub struct Fragment {
    pub id: i64,
    pub content: String,
    /// Insertion time, epoch seconds.
    pub created_at: i64,
    pub source: Option<String>,
    pub source_type: Option<SourceType>,
    pub source_page: Option<i64>,
    pub ingestion_batch_id: Option<String>,
}

/// Fields for one insert. Provenance is attached by the ingestion layer;
/// the store only validates and appends.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewFragment<'a> {
    pub content: &'a str,
    pub source: Option<&'a str>,
    pub source_type: Option<SourceType>,
    pub source_page: Option<i64>,
    pub ingestion_batch_id: Option<&'a str>,
}

/// Output of a per-format extractor: content plus an optional 1-based page
/// (PDF pages, CSV rows). The caller qualifies `source` and `source_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentCandidate {
    pub content: String,
    pub source_page: Option<i64>,
}

/// One pairwise relatedness score, `a < b`, similarity in `[0, 1]`.
/// Transient: lives in batch log artifacts and HTTP responses only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilaritySignal {
    pub a: i64,
    pub b: i64,
    pub similarity: f64,
}
