//! Plain-text extraction for framework documents.
//!
//! PDF goes through `pdf-extract`; DOCX is read straight from the
//! `word/document.xml` part of the OOXML archive, with one blank line
//! between paragraphs so the chunker can split on them. Text documents
//! must be valid UTF-8.

use std::io::Read;

use thiserror::Error;

use skillbucket_core::models::DocType;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("text document is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Extract the plain text of a document of the given type.
pub fn extract_text(bytes: &[u8], doc_type: DocType) -> Result<String, ExtractError> {
    match doc_type {
        DocType::Pdf => extract_pdf(bytes),
        DocType::Docx => extract_docx(bytes),
        DocType::Text => Ok(String::from_utf8(bytes.to_vec())?),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name(DOCX_BODY)
        .map_err(|_| ExtractError::Docx(format!("{} not found", DOCX_BODY)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(format!(
            "{} exceeds size limit ({} bytes)",
            DOCX_BODY, MAX_XML_ENTRY_BYTES
        )));
    }
    docx_paragraphs(&xml)
}

/// Collect `<w:t>` runs, closing each `<w:p>` with a blank line.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut paragraph = String::new();
    // Runs are not trimmed: Word splits words across runs at formatting
    // changes and keeps the boundary space inside `xml:space="preserve"`.
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                    paragraph.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                let text = paragraph.trim();
                if !text.is_empty() {
                    if !out.is_empty() {
                        out.push_str("\n\n");
                    }
                    out.push_str(text);
                }
                paragraph.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    // text outside any paragraph
    let tail = paragraph.trim();
    if !tail.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(tail);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", DocType::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", DocType::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn text_must_be_utf8() {
        assert_eq!(
            extract_text("Level 4: enable".as_bytes(), DocType::Text).unwrap(),
            "Level 4: enable"
        );
        let err = extract_text(&[0xff, 0xfe, 0x00], DocType::Text).unwrap_err();
        assert!(matches!(err, ExtractError::Utf8(_)));
    }

    #[test]
    fn docx_paragraphs_are_separated_by_blank_lines() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Data modelling</w:t></w:r></w:p>
    <w:p><w:r><w:t>Level 4 &amp; above</w:t></w:r></w:p>
    <w:p></w:p>
  </w:body>
</w:document>"#;
        let text = docx_paragraphs(xml).unwrap();
        assert_eq!(text, "Data modelling\n\nLevel 4 & above");
    }

    #[test]
    fn docx_runs_keep_boundary_spaces() {
        let xml = br#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p>
      <w:r><w:t xml:space="preserve">Designs, codes </w:t></w:r>
      <w:r><w:rPr><w:b/></w:rPr><w:t>and tests</w:t></w:r>
    </w:p>
    <w:p><w:r><w:t xml:space="preserve">  indented  </w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = docx_paragraphs(xml).unwrap();
        assert_eq!(text, "Designs, codes and tests\n\nindented");
    }
}
