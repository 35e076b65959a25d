//! services/api/src/adapters/extract.rs
//!
//! Turns an uploaded file into a book title and its plain-text content.
//! Only plain text is analysed; other formats are kept with empty content.

use bookchat_core::ports::{PortError, PortResult};
use regex::Regex;
use std::sync::OnceLock;

fn document_extension() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\.(pdf|txt|docx|doc|epub|rtf|odt|md|pptx|ppt|xlsx|xls)$").ok()
        })
        .as_ref()
}

/// The file name with a known document extension stripped. Falls back to the
/// bare file name when nothing else is left.
pub fn title_from_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let stripped = match document_extension() {
        Some(pattern) => pattern.replace(base, "").trim().to_string(),
        None => base.to_string(),
    };
    if stripped.is_empty() {
        base.to_string()
    } else {
        stripped
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Text(String),
    /// Accepted, but not something we can read.
    Unsupported,
}

/// Reads the text of an upload. The declared content type wins; without one
/// the `.txt` and `.md` extensions are trusted.
pub fn extract_text(content_type: Option<&str>, file_name: &str, data: &[u8]) -> PortResult<Extracted> {
    let mime = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");
    let lower_name = file_name.to_ascii_lowercase();
    let is_text = match mime.as_deref() {
        Some(mime) => mime == "text/plain" || mime == "text/markdown",
        None => lower_name.ends_with(".txt") || lower_name.ends_with(".md"),
    };
    if !is_text {
        return Ok(Extracted::Unsupported);
    }

    let text = String::from_utf8(data.to_vec())
        .map_err(|e| PortError::Invalid(format!("Uploaded file is not valid UTF-8 text: {}", e)))?;
    Ok(Extracted::Text(text.trim_start_matches('\u{feff}').to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_drop_document_extensions() {
        assert_eq!(title_from_file_name("Moby Dick.txt"), "Moby Dick");
        assert_eq!(title_from_file_name("notes.PDF"), "notes");
        assert_eq!(title_from_file_name("archive.tar.gz"), "archive.tar.gz");
        assert_eq!(title_from_file_name("C:\\books\\Emma.epub"), "Emma");
        assert_eq!(title_from_file_name(".txt"), ".txt");
    }

    #[test]
    fn plain_text_is_extracted() {
        let extracted = extract_text(Some("text/plain; charset=utf-8"), "a.bin", "\u{feff}Call me Ishmael.".as_bytes()).unwrap();
        assert_eq!(extracted, Extracted::Text("Call me Ishmael.".to_string()));

        let by_name = extract_text(None, "story.txt", b"Once").unwrap();
        assert_eq!(by_name, Extracted::Text("Once".to_string()));
    }

    #[test]
    fn other_formats_are_unsupported() {
        assert_eq!(extract_text(Some("application/pdf"), "book.pdf", b"%PDF").unwrap(), Extracted::Unsupported);
        assert_eq!(extract_text(None, "book.epub", b"PK").unwrap(), Extracted::Unsupported);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let result = extract_text(Some("text/plain"), "bad.txt", &[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(PortError::Invalid(_))));
    }
}
