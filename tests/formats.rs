//! Multi-format ingestion tests: PDF, DOCX, and zip archives end to end.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn frag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("frag");
    path
}

fn setup_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/frag.sqlite"
"#,
        root.display()
    );
    let config_path = root.join("config").join("frag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_frag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = frag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run frag binary at {:?}: {}", binary, e));

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

/// Minimal valid PDF with one text phrase per page. Body first, then an
/// xref with correct byte offsets so pdf-extract can parse it.
/// Object layout: 1 catalog, 2 page tree, 3 font, then a page/content
/// object pair per page.
fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();

    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            pages.len()
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, phrase) in pages.iter().enumerate() {
        let page_obj = 4 + 2 * i;
        let content_obj = page_obj + 1;
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_obj, content_obj
            )
            .as_bytes(),
        );
        let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_obj,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let size = offsets.len() + 1;
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, xref_start
        )
        .as_bytes(),
    );
    out
}

/// Minimal docx: a zip holding word/document.xml with one paragraph per
/// phrase.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn zip_with_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, data) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

#[test]
fn test_pdf_is_ingested_with_page_provenance() {
    let (tmp, config_path) = setup_env();
    run_frag(&config_path, &["init"]);

    let pdf_path = tmp.path().join("files").join("report.pdf");
    fs::write(&pdf_path, minimal_pdf(&["harvest moon festival"])).unwrap();

    let (stdout, stderr, success) = run_frag(&config_path, &["ingest", pdf_path.to_str().unwrap()]);
    assert!(
        success,
        "pdf ingest failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("ingested: 1"), "got: {}", stdout);

    let (list_out, _, _) = run_frag(&config_path, &["list"]);
    assert!(list_out.contains("harvest moon festival"), "got: {}", list_out);
    assert!(list_out.contains("[pdf]"), "got: {}", list_out);
    assert!(list_out.contains("p1"), "got: {}", list_out);
}

#[test]
fn test_two_page_pdf_tags_each_page() {
    let (tmp, config_path) = setup_env();
    run_frag(&config_path, &["init"]);

    let pdf_path = tmp.path().join("files").join("pair.pdf");
    fs::write(
        &pdf_path,
        minimal_pdf(&["first page prose", "second page prose"]),
    )
    .unwrap();

    let (stdout, stderr, success) = run_frag(&config_path, &["ingest", pdf_path.to_str().unwrap()]);
    assert!(
        success,
        "two-page pdf ingest failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("ingested: 2"), "got: {}", stdout);

    let (list_out, _, _) = run_frag(&config_path, &["list"]);
    assert!(list_out.contains("first page prose"), "got: {}", list_out);
    assert!(list_out.contains("second page prose"), "got: {}", list_out);
    assert!(list_out.contains("p1"), "got: {}", list_out);
    assert!(list_out.contains("p2"), "got: {}", list_out);
}

#[test]
fn test_broken_pdf_is_skipped_not_fatal() {
    let (tmp, config_path) = setup_env();
    run_frag(&config_path, &["init"]);

    let pdf_path = tmp.path().join("files").join("broken.pdf");
    fs::write(&pdf_path, b"%PDF-1.4 this is not a real pdf").unwrap();

    let (stdout, _, success) = run_frag(&config_path, &["ingest", pdf_path.to_str().unwrap()]);
    assert!(success, "broken pdf should not abort the run: {}", stdout);
    assert!(stdout.contains("ingested: 0"), "got: {}", stdout);
    assert!(stdout.contains("skipped: 1"), "got: {}", stdout);
}

#[test]
fn test_docx_paragraphs_become_separate_fragments() {
    let (tmp, config_path) = setup_env();
    run_frag(&config_path, &["init"]);

    let docx_path = tmp.path().join("files").join("memo.docx");
    fs::write(
        &docx_path,
        minimal_docx(&["opening paragraph", "second paragraph", "closing remarks"]),
    )
    .unwrap();

    let (stdout, stderr, success) =
        run_frag(&config_path, &["ingest", docx_path.to_str().unwrap()]);
    assert!(
        success,
        "docx ingest failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("ingested: 3"), "got: {}", stdout);

    let (list_out, _, _) = run_frag(&config_path, &["list"]);
    assert!(list_out.contains("opening paragraph"), "got: {}", list_out);
    assert!(list_out.contains("closing remarks"), "got: {}", list_out);
}

#[test]
fn test_archive_entries_are_ingested_individually() {
    let (tmp, config_path) = setup_env();
    run_frag(&config_path, &["init"]);

    let archive = zip_with_entries(&[
        ("notes.txt", b"archived note about orchards".as_slice()),
        ("blob.xyz", b"unsupported payload".as_slice()),
    ]);
    let zip_path = tmp.path().join("files").join("bundle.zip");
    fs::write(&zip_path, archive).unwrap();

    let (stdout, stderr, success) = run_frag(&config_path, &["ingest", zip_path.to_str().unwrap()]);
    assert!(
        success,
        "zip ingest failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("ingested: 1"), "got: {}", stdout);
    assert!(stdout.contains("skipped: 1"), "got: {}", stdout);

    // Provenance names both the archive and the entry.
    let (list_out, _, _) = run_frag(&config_path, &["list"]);
    assert!(list_out.contains("bundle.zip:notes.txt"), "got: {}", list_out);
}

#[test]
fn test_corrupt_archive_is_one_skip() {
    let (tmp, config_path) = setup_env();
    run_frag(&config_path, &["init"]);

    let zip_path = tmp.path().join("files").join("corrupt.zip");
    fs::write(&zip_path, b"PK\x03\x04 truncated garbage").unwrap();

    let (stdout, _, success) = run_frag(&config_path, &["ingest", zip_path.to_str().unwrap()]);
    assert!(success, "corrupt zip should not abort the run: {}", stdout);
    assert!(stdout.contains("ingested: 0"), "got: {}", stdout);
    assert!(stdout.contains("skipped: 1"), "got: {}", stdout);
}

#[test]
fn test_archive_rejects_traversal_names() {
    let (tmp, config_path) = setup_env();
    run_frag(&config_path, &["init"]);

    let archive = zip_with_entries(&[
        ("../escape.txt", b"should not land outside".as_slice()),
        ("fine.txt", b"a safe note about harbors".as_slice()),
    ]);
    let zip_path = tmp.path().join("files").join("sneaky.zip");
    fs::write(&zip_path, archive).unwrap();

    let (stdout, _, success) = run_frag(&config_path, &["ingest", zip_path.to_str().unwrap()]);
    assert!(success, "got: {}", stdout);
    assert!(stdout.contains("ingested: 2"), "got: {}", stdout);

    // Entry names are flattened to their base name before they reach
    // provenance.
    let (list_out, _, _) = run_frag(&config_path, &["list"]);
    assert!(list_out.contains("sneaky.zip:escape.txt"), "got: {}", list_out);
    assert!(!list_out.contains(".."), "got: {}", list_out);
}
