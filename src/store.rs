//! The authoritative book collection.
//!
//! All reads and mutations go through one mutex, so each record's history is
//! totally ordered. Every successful mutation is persisted through the
//! storage adapter and announced to subscribers.

use crate::error::LibraryError;
use crate::models::Book;
use crate::storage::StorageAdapter;
use chrono::Utc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

/// Change notification emitted after a successful mutation. Carries the id
/// of the affected record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    Added(String),
    Updated(String),
    Removed(String),
}

struct Inner {
    books: Vec<Book>,
    storage: Box<dyn StorageAdapter>,
    subscribers: Vec<Sender<LibraryEvent>>,
}

pub struct LibraryStore {
    inner: Mutex<Inner>,
}

impl LibraryStore {
    /// Load the collection from `storage`. A failed or corrupt load starts
    /// the library empty rather than blocking startup; the condition is
    /// logged as a warning.
    pub fn open(storage: Box<dyn StorageAdapter>) -> Self {
        let books = storage.load().unwrap_or_else(|err| {
            log::warn!("could not load library, starting empty: {err}");
            Vec::new()
        });
        Self {
            inner: Mutex::new(Inner {
                books,
                storage,
                subscribers: Vec::new(),
            }),
        }
    }

    /// All records, most recently added first. Records with the same
    /// timestamp keep their insertion order.
    pub fn list(&self) -> Vec<Book> {
        let inner = self.inner.lock().unwrap();
        let mut books = inner.books.clone();
        books.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        books
    }

    pub fn get(&self, id: &str) -> Option<Book> {
        let inner = self.inner.lock().unwrap();
        inner.books.iter().find(|b| b.id == id).cloned()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.books.iter().any(|b| b.file_path == path)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a record. Fails with `DuplicateBook` if a record with the same
    /// file path already exists; the new record is visible to `list` as soon
    /// as this returns.
    pub fn insert(&self, book: Book) -> Result<(), LibraryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.books.iter().any(|b| b.file_path == book.file_path) {
            return Err(LibraryError::DuplicateBook {
                path: book.file_path,
            });
        }
        let id = book.id.clone();
        inner.books.push(book);
        Self::persist(&mut inner);
        Self::notify(&mut inner, LibraryEvent::Added(id));
        Ok(())
    }

    /// Apply `mutate` to a copy of the record and swap it in. Readers see
    /// either the old or the new record in full, never a partial write.
    pub fn update<F>(&self, id: &str, mutate: F) -> Result<Book, LibraryError>
    where
        F: FnOnce(&mut Book),
    {
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .books
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| LibraryError::NotFound { id: id.to_string() })?;
        let mut updated = inner.books[index].clone();
        mutate(&mut updated);
        let result = updated.clone();
        inner.books[index] = updated;
        Self::persist(&mut inner);
        Self::notify(&mut inner, LibraryEvent::Updated(id.to_string()));
        Ok(result)
    }

    /// Remove a record. Idempotent: removing an unknown id is a no-op and
    /// returns false.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.books.len();
        inner.books.retain(|b| b.id != id);
        if inner.books.len() == before {
            return false;
        }
        Self::persist(&mut inner);
        Self::notify(&mut inner, LibraryEvent::Removed(id.to_string()));
        true
    }

    /// Stamp the record's `last_read_at` with the current time.
    pub fn mark_read(&self, id: &str) -> Result<Book, LibraryError> {
        self.update(id, |book| book.last_read_at = Some(Utc::now()))
    }

    /// Register a change listener. Dropped receivers are cleaned up on the
    /// next notification.
    pub fn subscribe(&self) -> Receiver<LibraryEvent> {
        let (tx, rx) = channel();
        self.inner.lock().unwrap().subscribers.push(tx);
        rx
    }

    fn persist(inner: &mut Inner) {
        // The in-memory set stays authoritative even when the disk write
        // fails; same availability policy as the load path.
        if let Err(err) = inner.storage.save(&inner.books) {
            log::error!("failed to persist library: {err}");
        }
    }

    fn notify(inner: &mut Inner, event: LibraryEvent) {
        inner
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookFormat;
    use crate::storage::{MemoryStorage, SqliteStorage};
    use chrono::{Duration, Utc};

    fn store() -> LibraryStore {
        LibraryStore::open(Box::new(MemoryStorage::new()))
    }

    fn sample(title: &str, path: &str) -> Book {
        Book::new(title.to_string(), path.to_string(), BookFormat::Pdf)
    }

    struct FailingStorage;

    impl StorageAdapter for FailingStorage {
        fn save(&self, _books: &[Book]) -> Result<(), LibraryError> {
            Err(LibraryError::Storage {
                message: "disk on fire".to_string(),
            })
        }

        fn load(&self) -> Result<Vec<Book>, LibraryError> {
            Err(LibraryError::Storage {
                message: "disk on fire".to_string(),
            })
        }
    }

    #[test]
    fn insert_then_list() {
        let store = store();
        let book = sample("A", "/lib/a.pdf");
        let id = book.id.clone();
        store.insert(book).unwrap();
        let books = store.list();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, id);
    }

    #[test]
    fn duplicate_path_is_rejected_and_store_unchanged() {
        let store = store();
        store.insert(sample("A", "/lib/a.pdf")).unwrap();
        let err = store.insert(sample("A again", "/lib/a.pdf")).unwrap_err();
        assert!(matches!(err, LibraryError::DuplicateBook { .. }));
        assert_eq!(store.len(), 1);
        assert_eq!(store.list()[0].title, "A");
    }

    #[test]
    fn list_orders_by_added_at_descending_with_stable_ties() {
        let store = store();
        let now = Utc::now();
        let mut old = sample("old", "/lib/old.pdf");
        old.added_at = now - Duration::hours(2);
        let mut tied_first = sample("tied-first", "/lib/t1.pdf");
        tied_first.added_at = now;
        let mut tied_second = sample("tied-second", "/lib/t2.pdf");
        tied_second.added_at = now;
        store.insert(old).unwrap();
        store.insert(tied_first).unwrap();
        store.insert(tied_second).unwrap();

        let titles: Vec<_> = store.list().into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["tied-first", "tied-second", "old"]);
    }

    #[test]
    fn ordering_survives_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        let before: Vec<String>;
        {
            let store =
                LibraryStore::open(Box::new(SqliteStorage::open(&path).unwrap()));
            let now = Utc::now();
            for i in 0..4 {
                let mut book = sample(&format!("b{i}"), &format!("/lib/b{i}.pdf"));
                // Two of the four share a timestamp to exercise tie stability.
                book.added_at = now - Duration::minutes(i / 2);
                store.insert(book).unwrap();
            }
            before = store.list().into_iter().map(|b| b.id).collect();
        }

        let reloaded =
            LibraryStore::open(Box::new(SqliteStorage::open(&path).unwrap()));
        let after: Vec<_> = reloaded.list().into_iter().map(|b| b.id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn update_replaces_record_whole() {
        let store = store();
        let book = sample("draft", "/lib/a.pdf");
        let id = book.id.clone();
        store.insert(book).unwrap();

        let updated = store
            .update(&id, |b| {
                b.title = "Novel".to_string();
                b.total_pages = 12;
            })
            .unwrap();
        assert_eq!(updated.title, "Novel");
        let fetched = store.get(&id).unwrap();
        assert_eq!(fetched.title, "Novel");
        assert_eq!(fetched.total_pages, 12);
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let store = store();
        let err = store.update("missing", |_| {}).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = store();
        let book = sample("A", "/lib/a.pdf");
        let id = book.id.clone();
        store.insert(book).unwrap();
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn failed_load_starts_empty() {
        let store = LibraryStore::open(Box::new(FailingStorage));
        assert!(store.is_empty());
        // And the store stays usable despite save failures.
        store.insert(sample("A", "/lib/a.pdf")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn subscribers_see_mutations() {
        let store = store();
        let events = store.subscribe();
        let book = sample("A", "/lib/a.pdf");
        let id = book.id.clone();
        store.insert(book).unwrap();
        store.update(&id, |b| b.total_pages = 3).unwrap();
        store.remove(&id);

        assert_eq!(events.try_recv().unwrap(), LibraryEvent::Added(id.clone()));
        assert_eq!(
            events.try_recv().unwrap(),
            LibraryEvent::Updated(id.clone())
        );
        assert_eq!(events.try_recv().unwrap(), LibraryEvent::Removed(id));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn mark_read_stamps_timestamp() {
        let store = store();
        let book = sample("A", "/lib/a.pdf");
        let id = book.id.clone();
        store.insert(book).unwrap();
        let updated = store.mark_read(&id).unwrap();
        assert!(updated.last_read_at.is_some());
    }
}
