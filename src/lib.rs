//! lectern - local library core for PDF and EPUB documents.
//!
//! The crate owns three things: the authoritative book collection
//! ([`store::LibraryStore`]), the import pipeline that admits files and
//! enriches their metadata in the background ([`import::ImportPipeline`]),
//! and the per-book reading session ([`reader::ReaderSession`]). Parsing and
//! rendering are behind the [`engine::DocumentEngine`] capability trait;
//! [`engine::LocalEngine`] is the built-in implementation.
//!
//! No UI, no network. The host application renders whatever the core
//! reports and installs its own logger for the `log` facade.

pub mod engine;
pub mod error;
pub mod import;
pub mod models;
pub mod reader;
pub mod storage;
pub mod store;

pub use engine::{DocumentEngine, EngineError, LocalEngine, UnitContent};
pub use error::LibraryError;
pub use import::{ImportPipeline, ImportStats};
pub use models::{Book, BookFormat, BookMetadata, Chapter, TocEntry};
pub use reader::{LoadStatus, ReaderSession};
pub use storage::{MemoryStorage, SqliteStorage, StorageAdapter};
pub use store::{LibraryEvent, LibraryStore};

use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Everything wired together over one data directory:
/// `<data_dir>/library.db` for records, `<data_dir>/books/` for the private
/// file copies.
pub struct Library {
    store: Arc<LibraryStore>,
    engine: Arc<dyn DocumentEngine>,
    importer: ImportPipeline,
}

impl Library {
    pub fn open(data_dir: &Path) -> Result<Self, LibraryError> {
        Self::open_with_engine(data_dir, Arc::new(LocalEngine::new()))
    }

    /// Same as [`Library::open`] but with a caller-supplied engine.
    pub fn open_with_engine(
        data_dir: &Path,
        engine: Arc<dyn DocumentEngine>,
    ) -> Result<Self, LibraryError> {
        fs::create_dir_all(data_dir)?;
        let storage = SqliteStorage::open(data_dir.join("library.db"))?;
        let store = Arc::new(LibraryStore::open(Box::new(storage)));
        let importer = ImportPipeline::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            data_dir.join("books"),
        )?;
        Ok(Self {
            store,
            engine,
            importer,
        })
    }

    pub fn store(&self) -> &Arc<LibraryStore> {
        &self.store
    }

    pub fn importer(&self) -> &ImportPipeline {
        &self.importer
    }

    /// Import one file; see [`ImportPipeline::import`].
    pub fn import(&self, source: &Path) -> Result<Book, LibraryError> {
        self.importer.import(source)
    }

    /// Delete a book's record and its private copy.
    pub fn delete_book(&self, id: &str) -> bool {
        self.importer.delete(id)
    }

    /// Open a reading session for a book. The session starts loading unit 1
    /// immediately; drive it with `poll`/`pump`.
    pub fn open_reader(&self, book_id: &str) -> Result<ReaderSession, LibraryError> {
        let book = self
            .store
            .get(book_id)
            .ok_or_else(|| LibraryError::NotFound {
                id: book_id.to_string(),
            })?;
        let mut session = ReaderSession::new(&book, Arc::clone(&self.engine));
        session.open();
        Ok(session)
    }
}
