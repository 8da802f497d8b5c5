//! File admission and asynchronous metadata enrichment.
//!
//! Importing copies the source file into the library's private directory,
//! inserts a provisional record so the book shows up immediately, and then
//! enriches the record from a background thread. Enrichment can fail or
//! arrive after the book was deleted; neither disturbs the library.

use crate::engine::DocumentEngine;
use crate::error::LibraryError;
use crate::models::{Book, BookFormat};
use crate::store::LibraryStore;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use walkdir::WalkDir;

/// Outcome of a bulk folder import.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    pub added: u64,
    /// Duplicates and unsupported extensions.
    pub skipped: u64,
    /// Copy or insert failures.
    pub failed: u64,
}

pub struct ImportPipeline {
    store: Arc<LibraryStore>,
    engine: Arc<dyn DocumentEngine>,
    library_dir: PathBuf,
}

impl ImportPipeline {
    /// `library_dir` is the private storage directory; it is created if
    /// missing.
    pub fn new(
        store: Arc<LibraryStore>,
        engine: Arc<dyn DocumentEngine>,
        library_dir: PathBuf,
    ) -> Result<Self, LibraryError> {
        fs::create_dir_all(&library_dir)?;
        Ok(Self {
            store,
            engine,
            library_dir,
        })
    }

    /// Admit one file. On success the returned record is already visible in
    /// the store, with metadata still provisional; enrichment runs on a
    /// background thread and updates the record when it completes.
    pub fn import(&self, source: &Path) -> Result<Book, LibraryError> {
        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_string();
        let format = BookFormat::from_extension(&extension).ok_or(
            LibraryError::UnsupportedFormat { extension },
        )?;

        let file_name = source
            .file_name()
            .ok_or_else(|| LibraryError::ImportIo {
                message: format!("not a file path: {}", source.display()),
            })?;
        let destination = self.library_dir.join(file_name);
        let destination_str = destination.to_string_lossy().to_string();

        if self.store.contains_path(&destination_str) {
            return Err(LibraryError::DuplicateBook {
                path: destination_str,
            });
        }

        // Overwrites a stale same-named copy left by an earlier failed
        // attempt. Failure here aborts with no record created.
        fs::copy(source, &destination)?;

        let title = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string());
        let book = Book::new(title, destination_str, format);
        self.store.insert(book.clone())?;

        self.spawn_enrichment(book.id.clone(), destination, format);
        Ok(book)
    }

    /// Import every supported file under `root`. Individual failures are
    /// counted, never propagated.
    pub fn import_folder(&self, root: &Path) -> Result<ImportStats, LibraryError> {
        if !root.exists() {
            return Err(LibraryError::ImportIo {
                message: format!("path does not exist: {}", root.display()),
            });
        }

        let mut stats = ImportStats::default();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext = path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("");
            if BookFormat::from_extension(ext).is_none() {
                continue;
            }
            match self.import(path) {
                Ok(_) => stats.added += 1,
                Err(LibraryError::DuplicateBook { .. })
                | Err(LibraryError::UnsupportedFormat { .. }) => stats.skipped += 1,
                Err(err) => {
                    log::warn!("failed to import {}: {err}", path.display());
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Remove a book's private copy and its record. The two steps are not
    /// transactional; a failed file removal is logged and the record is
    /// removed anyway.
    pub fn delete(&self, id: &str) -> bool {
        if let Some(book) = self.store.get(id) {
            if let Err(err) = fs::remove_file(&book.file_path) {
                log::warn!("could not remove {}: {err}", book.file_path);
            }
        }
        self.store.remove(id)
    }

    fn spawn_enrichment(&self, id: String, path: PathBuf, format: BookFormat) {
        let store = Arc::clone(&self.store);
        let engine = Arc::clone(&self.engine);
        thread::spawn(move || enrich(&store, engine.as_ref(), &id, &path, format));
    }
}

/// Extract metadata for one book and fold it into the store. Runs once per
/// import. Extraction failure leaves the provisional record usable; a book
/// deleted while extraction was in flight must not be resurrected, so
/// `NotFound` is swallowed.
pub(crate) fn enrich(
    store: &LibraryStore,
    engine: &dyn DocumentEngine,
    id: &str,
    path: &Path,
    format: BookFormat,
) {
    let metadata = match engine.extract_metadata(path, format) {
        Ok(metadata) => metadata,
        Err(err) => {
            log::warn!("metadata extraction failed for {}: {err}", path.display());
            return;
        }
    };

    let result = store.update(id, |book| {
        if let Some(title) = metadata.title {
            book.title = title;
        }
        if metadata.author.is_some() {
            book.author = metadata.author;
        }
        if metadata.cover_data.is_some() {
            book.cover_data = metadata.cover_data;
        }
        book.total_pages = metadata.total_units;
    });

    match result {
        Ok(_) => {}
        Err(LibraryError::NotFound { .. }) => {
            log::debug!("book {id} was removed while enrichment was in flight");
        }
        Err(err) => log::error!("failed to apply metadata for {id}: {err}"),
    }
}
