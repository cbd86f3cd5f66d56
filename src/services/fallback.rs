//! Operator-curated fallback registry

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    isbn::Isbn,
    models::{BookMetadata, BookSource, FallbackEntry, FallbackMetadata},
    repository::ArcFallbackStore,
};

#[derive(Clone)]
pub struct FallbackRegistry {
    store: ArcFallbackStore,
}

impl FallbackRegistry {
    pub fn new(store: ArcFallbackStore) -> Self {
        Self { store }
    }

    /// Store or overwrite the entry for an ISBN. The flag reports a replacement.
    pub async fn add(
        &self,
        raw_isbn: &str,
        metadata: FallbackMetadata,
    ) -> AppResult<(FallbackEntry, bool)> {
        let isbn = Isbn::parse(raw_isbn)?;
        metadata.validate()?;

        let book = metadata.into_book(isbn.as_str());
        let (entry, replaced) = self.store.upsert(&isbn, &book).await?;
        tracing::info!(isbn = %isbn, replaced, "Fallback entry stored");
        Ok((entry, replaced))
    }

    /// Exact match on the normalized ISBN
    pub async fn resolve(&self, isbn: &Isbn) -> AppResult<Option<BookMetadata>> {
        let entry = self.store.get(isbn).await?;
        Ok(entry.map(|entry| entry.book.with_source(BookSource::Fallback)))
    }

    pub async fn remove(&self, raw_isbn: &str) -> AppResult<()> {
        let isbn = Isbn::parse(raw_isbn)?;
        if !self.store.remove(&isbn).await? {
            return Err(AppError::NotFound(format!("No fallback entry for ISBN {}", isbn)));
        }
        tracing::info!(isbn = %isbn, "Fallback entry removed");
        Ok(())
    }

    pub async fn list(&self) -> AppResult<Vec<FallbackEntry>> {
        self.store.list().await
    }
}
