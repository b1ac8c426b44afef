//! Ingestion of PDF and DOCX framework documents through the SQLite store.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use skillbucket::config::Config;
use skillbucket::ingest::{ingest_document, IngestOptions};
use skillbucket::sqlite_store::SqliteStore;
use skillbucket_core::models::{ChunkFilter, DocType, NewFramework};
use skillbucket_core::store::Store;

/// Minimal valid PDF whose only page reads "data modelling phrase".
/// Offsets in the xref table are computed while writing the body.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    let content = b"BT /F1 12 Tf 100 700 Td (data modelling phrase) Tj ET";
    out.extend_from_slice(format!("4 0 obj << /Length {} >> stream\n", content.len()).as_bytes());
    out.extend_from_slice(content);
    out.extend_from_slice(b"\nendstream endobj\n");
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

/// Minimal docx: a ZIP holding only `word/document.xml`, one paragraph per entry.
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

fn test_config() -> Config {
    toml::from_str(
        r#"
[db]
path = "unused.sqlite"
[server]
bind = "127.0.0.1:0"
"#,
    )
    .unwrap()
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

async fn setup() -> (TempDir, SqliteStore, Uuid) {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open_in_memory().await.unwrap();
    let framework = store
        .create_framework(&NewFramework {
            name: "SFIA".into(),
            version: Some("8".into()),
            description: "Skills Framework for the Information Age".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    (tmp, store, framework.id)
}

#[tokio::test]
async fn pdf_is_ingested_and_searchable() {
    let (tmp, store, fw) = setup().await;
    let path = write(tmp.path(), "sfia-8.pdf", &minimal_pdf_with_phrase());

    let report = ingest_document(&store, &test_config(), fw, &path, &IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(report.doc_type, DocType::Pdf);
    assert!(report.chunks >= 1);

    let doc = store
        .get_document(report.document_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(doc.title.as_deref(), Some("sfia-8"));
    assert_eq!(doc.size_bytes, Some(minimal_pdf_with_phrase().len() as i64));

    let hits = store.search_chunks(fw, "modelling", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].chunk.raw_text.contains("data modelling phrase"));
}

#[tokio::test]
async fn docx_paragraphs_become_chunk_text() {
    let (tmp, store, fw) = setup().await;
    let path = write(
        tmp.path(),
        "prog.docx",
        &minimal_docx(&["Programming/software development", "Level 4: complex programs"]),
    );

    let report = ingest_document(&store, &test_config(), fw, &path, &IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(report.doc_type, DocType::Docx);

    let doc = store
        .get_document(report.document_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.content_type.as_deref(), Some(DocType::Docx.content_type()));

    let chunks = store
        .list_chunks(&ChunkFilter {
            framework_document_id: Some(doc.id),
            ..Default::default()
        })
        .await
        .unwrap();
    let text: String = chunks.iter().map(|c| c.raw_text.as_str()).collect();
    assert!(text.contains("Programming/software development"));
    assert!(text.contains("Level 4: complex programs"));
}

#[tokio::test]
async fn reingesting_unchanged_file_is_skipped() {
    let (tmp, store, fw) = setup().await;
    let path = write(tmp.path(), "prog.docx", &minimal_docx(&["Programming"]));
    let config = test_config();

    let first = ingest_document(&store, &config, fw, &path, &IngestOptions::default())
        .await
        .unwrap();
    let second = ingest_document(&store, &config, fw, &path, &IngestOptions::default())
        .await
        .unwrap();
    assert!(!first.skipped);
    assert!(second.skipped);
    assert_eq!(first.document_id, second.document_id);
    assert_eq!(store.counts().await.unwrap().documents, 1);
}

#[tokio::test]
async fn corrupt_files_store_nothing() {
    let (tmp, store, fw) = setup().await;
    let config = test_config();

    let pdf = write(tmp.path(), "broken.pdf", b"not a valid pdf");
    assert!(ingest_document(&store, &config, fw, &pdf, &IngestOptions::default())
        .await
        .is_err());

    let docx = write(tmp.path(), "broken.docx", b"PK not a zip");
    let err = ingest_document(&store, &config, fw, &docx, &IngestOptions::default())
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to extract text"));

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.documents, 0);
    assert_eq!(counts.chunks, 0);
}
