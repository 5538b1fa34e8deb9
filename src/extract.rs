//! Per-format fragment extraction.
//!
//! One dispatch point, [`extract`], turns raw bytes into fragment
//! candidates according to the rules of each supported format. Extraction
//! never writes anything; the ingestion layer attaches provenance and
//! persists. Errors are returned, never panicked, so the caller can
//! localize a bad file to a skip.

use std::io::Read;

use crate::models::{FragmentCandidate, SourceType};

/// Bound on the decompressed size of `word/document.xml` (zip-bomb guard).
const MAX_DOCX_XML_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure for one file. Localized to that file by the
/// ingestion layer; never fatal to the rest of a batch.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Docx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract fragment candidates from raw bytes according to the declared
/// format. Plain text and CSV are lossy-decoded and never fail; PDF and
/// DOCX return an error for unparseable input.
pub fn extract(bytes: &[u8], kind: SourceType) -> Result<Vec<FragmentCandidate>, ExtractError> {
    match kind {
        SourceType::Text => Ok(extract_plain_text(bytes)),
        SourceType::Csv => Ok(extract_csv(bytes)),
        SourceType::Pdf => extract_pdf(bytes),
        SourceType::Docx => extract_docx(bytes),
    }
}

/// The whole file becomes one fragment, trimmed; empty files yield none.
fn extract_plain_text(bytes: &[u8]) -> Vec<FragmentCandidate> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    vec![FragmentCandidate {
        content: trimmed.to_string(),
        source_page: None,
    }]
}

/// Row 1 is the header and is never a fragment; it is kept only as
/// provenance context. Each later non-blank row becomes one fragment of
/// comma-joined cells, `source_page` = 1-based row index counting the
/// header, so data rows start at 2. No column semantics are inferred.
fn extract_csv(bytes: &[u8]) -> Vec<FragmentCandidate> {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut candidates = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row_number = idx as i64 + 1;
        let record = match record {
            Ok(r) => r,
            Err(_) => continue,
        };
        if row_number == 1 {
            tracing::debug!(header = %record.iter().collect::<Vec<_>>().join(", "), "csv header retained as provenance");
            continue;
        }
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let content = record.iter().collect::<Vec<_>>().join(", ");
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        candidates.push(FragmentCandidate {
            content: content.to_string(),
            source_page: Some(row_number),
        });
    }
    candidates
}

/// Pages in order starting at 1; within a page, blank-line blocks become
/// fragments tagged with the page number. Pages with no extractable text
/// contribute zero fragments. A document that fails to parse errors as a
/// whole and is skipped by the caller.
fn extract_pdf(bytes: &[u8]) -> Result<Vec<FragmentCandidate>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut candidates = Vec::new();
    for (idx, page_text) in pages.iter().enumerate() {
        let page_number = idx as i64 + 1;
        for block in page_text.split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            candidates.push(FragmentCandidate {
                content: block.to_string(),
                source_page: Some(page_number),
            });
        }
    }
    Ok(candidates)
}

/// Paragraphs in document order, one fragment per non-empty paragraph.
/// Heading/style information is discarded; no page concept at paragraph
/// granularity.
fn extract_docx(bytes: &[u8]) -> Result<Vec<FragmentCandidate>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|e| ExtractError::Docx(format!("word/document.xml: {}", e)))?;
        entry
            .take(MAX_DOCX_XML_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_DOCX_XML_BYTES {
            return Err(ExtractError::Docx(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    extract_paragraphs(&doc_xml)
}

/// Stream `word/document.xml`, accumulating `w:t` text per `w:p` element.
fn extract_paragraphs(xml: &[u8]) -> Result<Vec<FragmentCandidate>, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut candidates = Vec::new();
    let mut buf = Vec::new();
    let mut paragraph = String::new();
    let mut in_paragraph = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    in_paragraph = true;
                    paragraph.clear();
                }
                b"t" if in_paragraph => in_text = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                paragraph.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    in_paragraph = false;
                    let trimmed = paragraph.trim();
                    if !trimmed.is_empty() {
                        candidates.push(FragmentCandidate {
                            content: trimmed.to_string(),
                            source_page: None,
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(candidates)
}
