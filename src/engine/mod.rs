//! Capability interface to the document engine.
//!
//! Every call here is potentially slow (parsing, decompression,
//! rasterization) and is expected to run off the interactive thread. All
//! failures are recoverable: the import pipeline degrades to provisional
//! metadata and the reader session reports a retryable failure.

pub mod epub;
pub mod pdf;

use crate::models::{BookFormat, BookMetadata, Chapter, TocEntry};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("unit {index} out of range (total: {total})")]
    OutOfRange { index: u32, total: u32 },
}

/// Format-aware document operations. Unit indices are 1-based throughout:
/// a unit is a page for PDF and a spine chapter for EPUB.
pub trait DocumentEngine: Send + Sync {
    /// Title, author, cover and unit count in one pass.
    fn extract_metadata(
        &self,
        path: &Path,
        format: BookFormat,
    ) -> Result<BookMetadata, EngineError>;

    fn unit_count(&self, path: &Path, format: BookFormat) -> Result<u32, EngineError>;

    /// Rasterize a PDF page to PNG bytes at the given pixel width.
    fn render_page(
        &self,
        path: &Path,
        page: u32,
        target_width: u32,
    ) -> Result<Vec<u8>, EngineError>;

    /// EPUB table of contents, in document order.
    fn table_of_contents(&self, path: &Path) -> Result<Vec<TocEntry>, EngineError>;

    /// EPUB chapter HTML by spine position.
    fn chapter(&self, path: &Path, index: u32) -> Result<Chapter, EngineError>;

    /// EPUB cover image bytes, if the package declares one.
    fn cover(&self, path: &Path) -> Result<Option<Vec<u8>>, EngineError>;
}

/// The built-in engine: lopdf and PDFium for PDF, zip + quick-xml for EPUB.
#[derive(Default)]
pub struct LocalEngine;

impl LocalEngine {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentEngine for LocalEngine {
    fn extract_metadata(
        &self,
        path: &Path,
        format: BookFormat,
    ) -> Result<BookMetadata, EngineError> {
        match format {
            BookFormat::Pdf => pdf::extract_metadata(path),
            BookFormat::Epub => epub::extract_metadata(path),
        }
    }

    fn unit_count(&self, path: &Path, format: BookFormat) -> Result<u32, EngineError> {
        match format {
            BookFormat::Pdf => pdf::page_count(path),
            BookFormat::Epub => epub::chapter_count(path),
        }
    }

    fn render_page(
        &self,
        path: &Path,
        page: u32,
        target_width: u32,
    ) -> Result<Vec<u8>, EngineError> {
        pdf::render_page(path, page, target_width)
    }

    fn table_of_contents(&self, path: &Path) -> Result<Vec<TocEntry>, EngineError> {
        epub::table_of_contents(path)
    }

    fn chapter(&self, path: &Path, index: u32) -> Result<Chapter, EngineError> {
        epub::chapter(path, index)
    }

    fn cover(&self, path: &Path) -> Result<Option<Vec<u8>>, EngineError> {
        epub::cover(path)
    }
}

/// Fetch the content of one unit: a rendered page for PDF, a chapter for
/// EPUB.
pub(crate) fn fetch_unit(
    engine: &dyn DocumentEngine,
    path: &Path,
    format: BookFormat,
    unit: u32,
    page_width: u32,
) -> Result<UnitContent, EngineError> {
    match format {
        BookFormat::Pdf => engine
            .render_page(path, unit, page_width)
            .map(UnitContent::Page),
        BookFormat::Epub => engine.chapter(path, unit).map(UnitContent::Chapter),
    }
}

/// Payload of the unit a session last loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitContent {
    /// Nothing loaded yet.
    None,
    /// PNG bytes of a rendered PDF page.
    Page(Vec<u8>),
    /// An EPUB chapter.
    Chapter(Chapter),
}

impl UnitContent {
    pub fn is_none(&self) -> bool {
        matches!(self, UnitContent::None)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Deterministic in-memory engine so the rest of the crate can be tested
    //! without real document files.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct FakeEngine {
        pub metadata: Mutex<Result<BookMetadata, EngineError>>,
        pub units: u32,
        pub fail_content: bool,
        pub extract_calls: AtomicUsize,
    }

    impl FakeEngine {
        pub fn with_metadata(metadata: BookMetadata) -> Self {
            Self {
                units: metadata.total_units.max(1),
                metadata: Mutex::new(Ok(metadata)),
                fail_content: false,
                extract_calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                metadata: Mutex::new(Err(EngineError::Parse {
                    message: "corrupt file".to_string(),
                })),
                units: 1,
                fail_content: true,
                extract_calls: AtomicUsize::new(0),
            }
        }

        fn check_range(&self, index: u32) -> Result<(), EngineError> {
            if index < 1 || index > self.units {
                return Err(EngineError::OutOfRange {
                    index,
                    total: self.units,
                });
            }
            Ok(())
        }
    }

    impl DocumentEngine for FakeEngine {
        fn extract_metadata(
            &self,
            _path: &Path,
            _format: BookFormat,
        ) -> Result<BookMetadata, EngineError> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            self.metadata.lock().unwrap().clone()
        }

        fn unit_count(
            &self,
            _path: &Path,
            _format: BookFormat,
        ) -> Result<u32, EngineError> {
            if self.fail_content {
                return Err(EngineError::Parse {
                    message: "corrupt file".to_string(),
                });
            }
            Ok(self.units)
        }

        fn render_page(
            &self,
            _path: &Path,
            page: u32,
            _target_width: u32,
        ) -> Result<Vec<u8>, EngineError> {
            if self.fail_content {
                return Err(EngineError::Parse {
                    message: "corrupt file".to_string(),
                });
            }
            self.check_range(page)?;
            Ok(format!("page {page}").into_bytes())
        }

        fn table_of_contents(&self, _path: &Path) -> Result<Vec<TocEntry>, EngineError> {
            Ok((1..=self.units)
                .map(|unit| TocEntry {
                    title: format!("Chapter {unit}"),
                    target_unit: unit,
                })
                .collect())
        }

        fn chapter(&self, _path: &Path, index: u32) -> Result<Chapter, EngineError> {
            if self.fail_content {
                return Err(EngineError::Parse {
                    message: "corrupt file".to_string(),
                });
            }
            self.check_range(index)?;
            Ok(Chapter {
                title: format!("Chapter {index}"),
                html: format!("<p>chapter {index}</p>"),
            })
        }

        fn cover(&self, _path: &Path) -> Result<Option<Vec<u8>>, EngineError> {
            Ok(None)
        }
    }
}
