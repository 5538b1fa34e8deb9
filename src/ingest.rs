//! Ingestion pipeline orchestration.
//!
//! Takes `(filename, bytes)` pairs, dispatches each to the matching
//! extractor (unwrapping ZIP archives recursively through the same
//! dispatch), and appends every candidate to the store one insert at a
//! time so per-fragment provenance lands atomically. Per-file and
//! per-entry problems degrade to a skip count; only storage failures
//! propagate.

use anyhow::Result;
use std::path::Path;
use std::io::Read;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::extract;
use crate::models::{NewFragment, SourceType};
use crate::store::{FragmentStore, StoreError};

/// Best-effort outcome of one ingestion call. `ingested` counts fragments
/// written; `skipped` counts files and archive entries that were passed
/// over for any non-fatal reason.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub ingested: u64,
    pub skipped: u64,
    pub batch_id: String,
}

/// Ingest a set of in-memory files. One batch id is shared by every
/// fragment the call produces.
pub async fn ingest_files(
    store: &FragmentStore,
    config: &Config,
    files: &[(String, Vec<u8>)],
) -> Result<IngestReport> {
    let batch_id = Uuid::new_v4().to_string();
    let mut report = IngestReport {
        ingested: 0,
        skipped: 0,
        batch_id,
    };

    for (name, bytes) in files {
        if is_archive(name) {
            ingest_archive(store, config, name, bytes, &mut report).await?;
        } else {
            ingest_single(store, name, bytes, name, &mut report).await?;
        }
        tracing::info!(
            file = %name,
            ingested = report.ingested,
            skipped = report.skipped,
            "ingested file"
        );
    }

    Ok(report)
}

/// Ingest files from disk paths. Directories are not accepted here;
/// see [`collect_dir`] for the CLI's `--dir` expansion.
pub async fn ingest_paths(
    store: &FragmentStore,
    config: &Config,
    paths: &[std::path::PathBuf],
) -> Result<IngestReport> {
    let mut files = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        files.push((name, bytes));
    }
    ingest_files(store, config, &files).await
}

/// Walk a directory and return the regular files under it, sorted for
/// deterministic ingestion order.
pub fn collect_dir(root: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

fn is_archive(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".zip")
}

/// Dispatch one non-archive file. `source` carries the qualified name
/// (`archive.zip:inner.txt` for archive members, bare filename otherwise).
async fn ingest_single(
    store: &FragmentStore,
    name: &str,
    bytes: &[u8],
    source: &str,
    report: &mut IngestReport,
) -> Result<()> {
    let Some(kind) = SourceType::from_file_name(name) else {
        tracing::debug!(file = %source, "unsupported extension, skipped");
        report.skipped += 1;
        return Ok(());
    };

    let candidates = match extract::extract(bytes, kind) {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::debug!(file = %source, error = %e, "extraction failed, skipped");
            report.skipped += 1;
            return Ok(());
        }
    };

    for candidate in &candidates {
        let result = store
            .insert(NewFragment {
                content: &candidate.content,
                source: Some(source),
                source_type: Some(kind),
                source_page: candidate.source_page,
                ingestion_batch_id: Some(&report.batch_id),
            })
            .await;
        match result {
            Ok(_) => report.ingested += 1,
            // Empty content was filtered by the extractors already; a
            // validation rejection here is a skip, not a fault.
            Err(StoreError::Validation(msg)) => {
                tracing::debug!(file = %source, %msg, "fragment rejected");
                report.skipped += 1;
            }
            Err(e @ StoreError::Storage(_)) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Unwrap a ZIP archive and run every member through the normal dispatch.
/// Bounded by `max_archive_entries` and a per-entry decompressed ceiling;
/// exceeding either skips the entry. A corrupt archive is one skip.
async fn ingest_archive(
    store: &FragmentStore,
    config: &Config,
    name: &str,
    bytes: &[u8],
    report: &mut IngestReport,
) -> Result<()> {
    let mut archive = match zip::ZipArchive::new(std::io::Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => {
            tracing::debug!(file = %name, error = %e, "corrupt archive, skipped");
            report.skipped += 1;
            return Ok(());
        }
    };

    let mut processed = 0usize;
    for index in 0..archive.len() {
        // Collect entry bytes first; the borrow must end before awaiting.
        let entry_data = {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(file = %name, index, error = %e, "unreadable entry, skipped");
                    report.skipped += 1;
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            if processed >= config.ingest.max_archive_entries {
                report.skipped += 1;
                continue;
            }
            processed += 1;

            let Some(inner_name) = sanitize_entry_name(entry.name()) else {
                tracing::debug!(file = %name, entry = %entry.name(), "unsafe entry name, skipped");
                report.skipped += 1;
                continue;
            };

            if entry.size() > config.ingest.max_entry_bytes {
                tracing::debug!(file = %name, entry = %inner_name, size = entry.size(), "entry exceeds size ceiling, skipped");
                report.skipped += 1;
                continue;
            }

            let mut data = Vec::new();
            let limit = config.ingest.max_entry_bytes;
            match (&mut entry).take(limit + 1).read_to_end(&mut data) {
                Ok(_) if data.len() as u64 > limit => {
                    tracing::debug!(file = %name, entry = %inner_name, "entry exceeds size ceiling, skipped");
                    report.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(file = %name, entry = %inner_name, error = %e, "entry read failed, skipped");
                    report.skipped += 1;
                    continue;
                }
            }
            Some((inner_name, data))
        };

        if let Some((inner_name, data)) = entry_data {
            let source = format!("{}:{}", name, inner_name);
            ingest_single(store, &inner_name, &data, &source, report).await?;
        }
    }

    Ok(())
}

/// Strip path components and reject names containing anything outside a
/// conservative character set. Returns `None` when the entry should be
/// skipped.
fn sanitize_entry_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    if base.is_empty() {
        return None;
    }
    let safe = base
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '));
    if !safe || base.starts_with('.') {
        return None;
    }
    Some(base.to_string())
}
