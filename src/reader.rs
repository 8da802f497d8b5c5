//! Per-open-book reading session.
//!
//! The session is owned by the interactive thread. Navigation spawns a
//! worker that talks to the engine and reports back over a channel; the
//! owner drains results with `poll` or `pump` and applies them. A result
//! for a unit the user has already navigated away from is discarded, which
//! is the only form of cancellation: in-flight engine work is never
//! interrupted.

use crate::engine::{fetch_unit, DocumentEngine, EngineError, UnitContent};
use crate::models::{Book, BookFormat, TocEntry};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Default pixel width for rendered PDF pages.
const DEFAULT_PAGE_WIDTH: u32 = 800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// Completion message from a fetch worker. `unit` is the position the fetch
/// was issued for; `extent` is only present on the initial open, which asks
/// the engine for the real unit count first.
#[derive(Debug)]
pub struct FetchResult {
    pub unit: u32,
    pub extent: Option<u32>,
    pub outcome: Result<UnitContent, EngineError>,
}

pub struct ReaderSession {
    book_id: String,
    file_path: PathBuf,
    format: BookFormat,
    engine: Arc<dyn DocumentEngine>,
    page_width: u32,
    position: u32,
    extent: u32,
    status: LoadStatus,
    content: UnitContent,
    tx: Sender<FetchResult>,
    rx: Receiver<FetchResult>,
}

impl std::fmt::Debug for ReaderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSession")
            .field("book_id", &self.book_id)
            .field("file_path", &self.file_path)
            .field("format", &self.format)
            .field("page_width", &self.page_width)
            .field("position", &self.position)
            .field("extent", &self.extent)
            .field("status", &self.status)
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}

impl ReaderSession {
    pub fn new(book: &Book, engine: Arc<dyn DocumentEngine>) -> Self {
        let (tx, rx) = channel();
        Self {
            book_id: book.id.clone(),
            file_path: PathBuf::from(&book.file_path),
            format: book.format,
            engine,
            page_width: DEFAULT_PAGE_WIDTH,
            position: 1,
            // Provisional until the engine reports the real count.
            extent: 1,
            status: LoadStatus::Idle,
            content: UnitContent::None,
            tx,
            rx,
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// Current 1-based page or chapter index.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Total known unit count; 1 until the engine reports the real count.
    pub fn extent(&self) -> u32 {
        self.extent
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn content(&self) -> &UnitContent {
        &self.content
    }

    pub fn set_page_width(&mut self, width: u32) {
        self.page_width = width;
    }

    /// Start reading at unit 1: query the real extent, then fetch the first
    /// unit's content.
    pub fn open(&mut self) {
        self.position = 1;
        self.extent = 1;
        self.status = LoadStatus::Loading;
        self.spawn_fetch(1, true);
    }

    /// Navigate to `unit`. Out-of-range requests are clamped to a no-op;
    /// navigation never fails, it just does nothing past the edges.
    pub fn go_to(&mut self, unit: u32) {
        if unit < 1 || unit > self.extent {
            return;
        }
        self.position = unit;
        self.status = LoadStatus::Loading;
        self.spawn_fetch(unit, false);
    }

    pub fn next(&mut self) {
        self.go_to(self.position.saturating_add(1));
    }

    pub fn previous(&mut self) {
        self.go_to(self.position.saturating_sub(1));
    }

    /// Refetch the current unit, typically after a `Failed` state.
    pub fn retry(&mut self) {
        self.status = LoadStatus::Loading;
        self.spawn_fetch(self.position, false);
    }

    /// EPUB table of contents for navigation. Engine-bound, so callers
    /// should treat it like any other slow bridge call.
    pub fn table_of_contents(&self) -> Result<Vec<TocEntry>, EngineError> {
        self.engine.table_of_contents(&self.file_path)
    }

    /// Apply any results that have already arrived. Returns true if the
    /// session state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(result) = self.rx.try_recv() {
            changed |= self.apply(result);
        }
        changed
    }

    /// Wait up to `timeout` for one result, then drain the rest.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => {
                let mut changed = self.apply(result);
                changed |= self.poll();
                changed
            }
            Err(_) => false,
        }
    }

    /// Apply one fetch result. The extent correction always lands; the
    /// content only lands if the result still matches the current position.
    pub fn apply(&mut self, result: FetchResult) -> bool {
        let mut changed = false;
        if let Some(extent) = result.extent {
            let extent = extent.max(1);
            if extent != self.extent {
                self.extent = extent;
                changed = true;
            }
            if self.position > self.extent {
                self.position = self.extent;
                changed = true;
            }
        }

        if result.unit != self.position {
            log::debug!(
                "discarding stale result for unit {} (now at {})",
                result.unit,
                self.position
            );
            return changed;
        }

        match result.outcome {
            Ok(content) => {
                self.content = content;
                self.status = LoadStatus::Loaded;
            }
            Err(err) => {
                self.status = LoadStatus::Failed(err.to_string());
            }
        }
        true
    }

    fn spawn_fetch(&self, unit: u32, with_extent: bool) {
        let tx = self.tx.clone();
        let engine = Arc::clone(&self.engine);
        let path = self.file_path.clone();
        let format = self.format;
        let page_width = self.page_width;
        thread::spawn(move || {
            let extent = if with_extent {
                engine.unit_count(&path, format).ok()
            } else {
                None
            };
            let outcome = fetch_unit(&*engine, &path, format, unit, page_width);
            // The session may be gone by the time this resolves.
            let _ = tx.send(FetchResult {
                unit,
                extent,
                outcome,
            });
        });
    }
}
