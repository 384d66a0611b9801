//! Integration tests for PDF and DOCX uploads, through the pipeline and
//! through the `docqa chunk` command.

mod common;

use std::process::Command;
use std::sync::Arc;

use common::{pipeline_with, test_config, ScriptedModel};
use docqa::error::RagError;
use tempfile::TempDir;

fn docqa_binary() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("docqa");
    path
}

/// Single-page PDF showing `phrase` in Helvetica. Offsets in the xref table
/// are computed while writing so pdf-extract can parse it.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// DOCX archive whose body has one `<w:p>` per paragraph.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[tokio::test]
async fn test_pdf_upload_is_answerable() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline_with(test_config(&tmp), Arc::new(ScriptedModel::new("it")));

    let id = pipeline
        .ingest("leaf.PDF", minimal_pdf("sunlight feeds green plants"))
        .await
        .unwrap();
    let outcome = pipeline.query(&id, "What feeds plants?").await.unwrap();
    assert!(outcome.answer.contains("sunlight"));
    assert!(!outcome.refused);
}

#[tokio::test]
async fn test_docx_upload_is_answerable() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline_with(test_config(&tmp), Arc::new(ScriptedModel::new("it")));

    let docx = minimal_docx(&[
        "Quarterly revenue grew by twelve percent.",
        "Hiring was paused in the second half.",
    ]);
    let id = pipeline.ingest("report.docx", docx).await.unwrap();
    let outcome = pipeline.query(&id, "How much did revenue grow?").await.unwrap();
    assert_eq!(outcome.answer, "Quarterly revenue grew by twelve percent.");
}

#[tokio::test]
async fn test_corrupt_files_are_unreadable() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline_with(test_config(&tmp), Arc::new(ScriptedModel::new("it")));

    let err = pipeline
        .ingest("broken.docx", b"not a zip archive".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::DocumentUnreadable(_)));

    let err = pipeline
        .ingest("broken.pdf", b"%PDF-1.4\ngarbage".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::DocumentUnreadable(_)));
    assert_eq!(pipeline.session_count(), 0);
}

#[tokio::test]
async fn test_docx_without_text_is_empty() {
    let tmp = TempDir::new().unwrap();
    let pipeline = pipeline_with(test_config(&tmp), Arc::new(ScriptedModel::new("it")));

    let err = pipeline
        .ingest("blank.docx", minimal_docx(&["", "   "]))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmptyDocument));
}

#[test]
fn test_chunk_command_prints_docx_paragraphs() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("notes.docx");
    std::fs::write(
        &path,
        minimal_docx(&["First paragraph here.", "Second paragraph here."]),
    )
    .unwrap();

    let output = Command::new(docqa_binary())
        .arg("chunk")
        .arg(&path)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docqa: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("--- chunk 0"));
    assert!(stdout.contains("First paragraph here."));
    assert!(stdout.contains("Second paragraph here."));
    assert!(stdout.contains("1 chunks"));
}

#[test]
fn test_chunk_command_rejects_unsupported_extension() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data.csv");
    std::fs::write(&path, "a,b\n").unwrap();

    let output = Command::new(docqa_binary())
        .arg("chunk")
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("csv"));
}
