//! Scripted provider for tests, built with `cfg(test)` or the
//! `test-support` feature.
//!
//! Responses are keyed by normalized ISBN; unknown ISBNs answer with an
//! authoritative not-found. One-shot or persistent failures simulate outages.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{BookProvider, ProviderError};
use crate::{
    isbn::Isbn,
    models::{BookMetadata, BookSource},
};

#[derive(Debug)]
pub struct MockProvider {
    name: String,
    books: RwLock<HashMap<String, BookMetadata>>,
    /// Failures returned by the next lookups, oldest first
    scripted_failures: RwLock<VecDeque<ProviderError>>,
    /// Failure returned by every lookup once the script is drained
    persistent_failure: RwLock<Option<ProviderError>>,
    lookup_count: AtomicU64,
    search_count: AtomicU64,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            books: RwLock::new(HashMap::new()),
            scripted_failures: RwLock::new(VecDeque::new()),
            persistent_failure: RwLock::new(None),
            lookup_count: AtomicU64::new(0),
            search_count: AtomicU64::new(0),
        }
    }

    /// Registers a book; its source is rewritten to this provider's name.
    pub fn with_book(self, isbn: &str, book: BookMetadata) -> Self {
        self.add_book(isbn, book);
        self
    }

    pub fn add_book(&self, isbn: &str, book: BookMetadata) {
        let key = Isbn::parse(isbn)
            .map(|i| i.to_string())
            .unwrap_or_else(|_| isbn.to_string());
        let mut book = book.with_source(BookSource::External(self.name.clone()));
        book.isbn = Some(key.clone());
        self.books
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, book);
    }

    /// Queues a failure for the next lookup.
    pub fn push_failure(&self, error: ProviderError) {
        self.scripted_failures
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(error);
    }

    /// Makes every lookup fail until cleared with `None`.
    pub fn set_failure(&self, error: Option<ProviderError>) {
        *self
            .persistent_failure
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = error;
    }

    /// A 503 from this provider
    pub fn unavailable(&self) -> ProviderError {
        ProviderError::Http {
            provider: self.name.clone(),
            status: 503,
        }
    }

    /// Number of lookups that reached this provider.
    pub fn lookup_count(&self) -> u64 {
        self.lookup_count.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> u64 {
        self.search_count.load(Ordering::SeqCst)
    }

    fn next_failure(&self) -> Option<ProviderError> {
        let scripted = self
            .scripted_failures
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        scripted.or_else(|| {
            self.persistent_failure
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        })
    }
}

#[async_trait]
impl BookProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, isbn: &Isbn) -> Result<Option<BookMetadata>, ProviderError> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.next_failure() {
            return Err(error);
        }
        Ok(self
            .books
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(isbn.as_str())
            .cloned())
    }

    async fn search_by_title(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BookMetadata>, ProviderError> {
        self.search_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self
            .persistent_failure
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
        {
            return Err(error);
        }

        let needle = query.to_lowercase();
        let mut hits: Vec<BookMetadata> = self
            .books
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|book| book.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.title.cmp(&b.title));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self
            .persistent_failure
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
