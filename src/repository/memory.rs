//! In-memory stores for tests. Only built with `cfg(test)` or the
//! `test-support` feature.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::RwLock;

use super::{CatalogStore, FallbackStore};
use crate::{
    error::{AppError, AppResult},
    isbn::Isbn,
    models::{BookMetadata, BookSource, FallbackEntry},
};

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    books: RwLock<HashMap<String, BookMetadata>>,
    next_id: AtomicI32,
    lookups: AtomicU64,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a book; panics on an invalid ISBN, which is a fixture bug
    pub fn with_book(self, isbn: &str, book: BookMetadata) -> Self {
        let isbn = Isbn::parse(isbn)
            .unwrap_or_else(|e| panic!("invalid fixture ISBN {}: {}", isbn, e));
        let mut book = book.with_source(BookSource::Local);
        book.isbn = Some(isbn.to_string());
        self.books
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(isbn.to_string(), book);
        self
    }

    /// Number of `find_by_isbn` calls served
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.books
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_by_isbn(&self, isbn: &Isbn) -> AppResult<Option<BookMetadata>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .books
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(isbn.as_str())
            .cloned())
    }

    async fn isbn_exists(&self, isbn: &Isbn) -> AppResult<bool> {
        Ok(self
            .books
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(isbn.as_str()))
    }

    async fn insert_book(&self, isbn: &Isbn, book: &BookMetadata) -> AppResult<i32> {
        let mut books = self
            .books
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if books.contains_key(isbn.as_str()) {
            return Err(AppError::Conflict(format!(
                "A book with ISBN {} already exists",
                isbn
            )));
        }

        let mut stored = book.clone().with_source(BookSource::Local);
        stored.isbn = Some(isbn.to_string());
        books.insert(isbn.to_string(), stored);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[derive(Debug, Default)]
pub struct MemoryFallbacks {
    entries: RwLock<BTreeMap<String, FallbackEntry>>,
}

impl MemoryFallbacks {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FallbackStore for MemoryFallbacks {
    async fn get(&self, isbn: &Isbn) -> AppResult<Option<FallbackEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(isbn.as_str())
            .cloned())
    }

    async fn upsert(&self, isbn: &Isbn, book: &BookMetadata) -> AppResult<(FallbackEntry, bool)> {
        let now = Utc::now();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let created_at = entries.get(isbn.as_str()).map(|e| e.created_at);
        let entry = FallbackEntry {
            isbn: isbn.to_string(),
            book: book.clone(),
            created_at: created_at.unwrap_or(now),
            updated_at: now,
        };
        entries.insert(isbn.to_string(), entry.clone());
        Ok((entry, created_at.is_some()))
    }

    async fn remove(&self, isbn: &Isbn) -> AppResult<bool> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(isbn.as_str())
            .is_some())
    }

    async fn list(&self) -> AppResult<Vec<FallbackEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isbn() -> Isbn {
        Isbn::parse("9780134685991").unwrap()
    }

    #[tokio::test]
    async fn test_catalog_insert_rejects_duplicates() {
        let catalog = MemoryCatalog::new();
        let book = BookMetadata::new("Effective Java", BookSource::External("openlibrary".into()));

        catalog.insert_book(&isbn(), &book).await.unwrap();
        let stored = catalog.find_by_isbn(&isbn()).await.unwrap().unwrap();
        assert_eq!(stored.source, BookSource::Local);

        let err = catalog.insert_book(&isbn(), &book).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_fallback_upsert_reports_replacement_and_keeps_created_at() {
        let store = MemoryFallbacks::new();
        let book = BookMetadata::new("Draft", BookSource::Fallback);

        let (first, replaced) = store.upsert(&isbn(), &book).await.unwrap();
        assert!(!replaced);

        let (second, replaced) = store.upsert(&isbn(), &book).await.unwrap();
        assert!(replaced);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(store.list().await.unwrap().len(), 1);

        assert!(store.remove(&isbn()).await.unwrap());
        assert!(!store.remove(&isbn()).await.unwrap());
    }
}
