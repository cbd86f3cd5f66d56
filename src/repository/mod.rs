//! Repository layer for database operations

pub mod books;
pub mod fallbacks;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use std::sync::Arc;

use crate::{
    error::AppResult,
    isbn::Isbn,
    models::{BookMetadata, FallbackEntry},
};

#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryCatalog, MemoryFallbacks};

/// Local catalog access used by the lookup chain and the import endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Point lookup by normalized ISBN, with authors and categories
    async fn find_by_isbn(&self, isbn: &Isbn) -> AppResult<Option<BookMetadata>>;

    async fn isbn_exists(&self, isbn: &Isbn) -> AppResult<bool>;

    /// Insert a book with its authors and categories; returns the new book id.
    /// A duplicate ISBN is a `Conflict`.
    async fn insert_book(&self, isbn: &Isbn, book: &BookMetadata) -> AppResult<i32>;
}

/// Persistent storage for operator-curated fallback entries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FallbackStore: Send + Sync {
    async fn get(&self, isbn: &Isbn) -> AppResult<Option<FallbackEntry>>;

    /// Store or overwrite; the flag is `true` when an entry was replaced
    async fn upsert(&self, isbn: &Isbn, book: &BookMetadata) -> AppResult<(FallbackEntry, bool)>;

    async fn remove(&self, isbn: &Isbn) -> AppResult<bool>;

    async fn list(&self) -> AppResult<Vec<FallbackEntry>>;
}

pub type ArcCatalogStore = Arc<dyn CatalogStore>;
pub type ArcFallbackStore = Arc<dyn FallbackStore>;

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub fallbacks: fallbacks::FallbacksRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            fallbacks: fallbacks::FallbacksRepository::new(pool.clone()),
            pool,
        }
    }
}
