use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported document formats. The import pipeline rejects everything else
/// before any I/O happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Pdf,
    Epub,
}

impl BookFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            BookFormat::Pdf => "pdf",
            BookFormat::Epub => "epub",
        }
    }

    /// Parse a format from a file extension, case-insensitive.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(BookFormat::Pdf),
            "epub" => Some(BookFormat::Epub),
            _ => None,
        }
    }
}

/// One imported document as recorded in the library.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Book {
    /// UUID, assigned at import and never reused.
    pub id: String,
    /// Display title. Starts as the file stem, replaced by extracted
    /// metadata when the engine reports one.
    pub title: String,
    pub author: Option<String>,
    /// Absolute path of the private on-device copy. Unique across the
    /// library; this is the duplicate-import guard key.
    pub file_path: String,
    pub format: BookFormat,
    /// Raw cover image bytes, if the engine supplied one.
    pub cover_data: Option<Vec<u8>>,
    pub added_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
    /// Page count for PDF, chapter count for EPUB. 0 means "not yet known".
    pub total_pages: u32,
}

impl Book {
    /// Build the provisional record inserted before metadata enrichment runs.
    pub fn new(title: String, file_path: String, format: BookFormat) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            author: None,
            file_path,
            format,
            cover_data: None,
            added_at: Utc::now(),
            last_read_at: None,
            total_pages: 0,
        }
    }
}

/// What the document engine managed to extract from a file.
#[derive(Debug, Clone, Default)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub cover_data: Option<Vec<u8>>,
    /// Pages for PDF, spine entries for EPUB.
    pub total_units: u32,
}

/// Table of contents entry. `target_unit` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    pub target_unit: u32,
}

/// One EPUB chapter as delivered to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub html: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(BookFormat::from_extension("pdf"), Some(BookFormat::Pdf));
        assert_eq!(BookFormat::from_extension("EPUB"), Some(BookFormat::Epub));
        assert_eq!(BookFormat::from_extension("Pdf"), Some(BookFormat::Pdf));
        assert_eq!(BookFormat::from_extension("txt"), None);
        assert_eq!(BookFormat::from_extension(""), None);
    }

    #[test]
    fn new_book_is_provisional() {
        let book = Book::new(
            "novel".to_string(),
            "/library/novel.epub".to_string(),
            BookFormat::Epub,
        );
        assert_eq!(book.total_pages, 0);
        assert!(book.author.is_none());
        assert!(book.cover_data.is_none());
        assert!(book.last_read_at.is_none());
        assert!(!book.id.is_empty());
    }
}
