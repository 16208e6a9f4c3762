//! Source document loading and text extraction.
//!
//! Given a staged file, detects its format from the extension and extracts
//! plain UTF-8 text: PDF via `pdf-extract`, DOCX by pulling `w:t` runs out
//! of `word/document.xml`, and `.txt`/`.md` read directly. Loading is
//! read-only; relocation of ingested files is the engine's job.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};

/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Loading error. A failed document is reported and skipped; it never
/// aborts the surrounding batch.
#[derive(Debug)]
pub enum LoadError {
    UnsupportedFormat(String),
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::UnsupportedFormat(ext) => {
                write!(f, "unsupported document format: {}", ext)
            }
            LoadError::Corrupt(e) => write!(f, "corrupt document: {}", e),
            LoadError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Extracted text plus provenance metadata for one staged file.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// File name; doubles as the document identity through the pipeline.
    pub name: String,
    pub content_type: String,
    pub text: String,
    pub loaded_at: DateTime<Utc>,
}

/// Load one staged file and extract its text.
///
/// Zero-length and non-text files produce a `Corrupt` error rather than
/// a panic or an empty document.
pub fn load_document(path: &Path) -> Result<LoadedDocument, LoadError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let bytes = std::fs::read(path).map_err(|e| LoadError::Io(e.to_string()))?;
    if bytes.is_empty() {
        return Err(LoadError::Corrupt("file is empty".to_string()));
    }

    let (content_type, text) = match ext.as_str() {
        "pdf" => ("application/pdf", extract_pdf(&bytes)?),
        "docx" => (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            extract_docx(&bytes)?,
        ),
        "txt" | "md" => ("text/plain", decode_utf8(bytes)?),
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };

    Ok(LoadedDocument {
        name,
        content_type: content_type.to_string(),
        text,
        loaded_at: Utc::now(),
    })
}

fn decode_utf8(bytes: Vec<u8>) -> Result<String, LoadError> {
    String::from_utf8(bytes).map_err(|_| LoadError::Corrupt("not valid UTF-8 text".to_string()))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, LoadError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| LoadError::Corrupt(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, LoadError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| LoadError::Corrupt(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| LoadError::Corrupt("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| LoadError::Corrupt(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(LoadError::Corrupt(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    extract_text_runs(&doc_xml)
}

/// Collect the text content of every `<w:t>` element, separating runs
/// with a space.
fn extract_text_runs(xml: &[u8]) -> Result<String, LoadError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Corrupt(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
