//! `lookup_book` orchestration: local catalog, external providers, fallback registry

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{fallback::FallbackRegistry, resolver::ResolverService};
use crate::{
    error::{AppError, AppResult},
    isbn::Isbn,
    models::{BookMetadata, BookSource, LookupMiss, LookupResult, Resolution},
    repository::ArcCatalogStore,
};

/// Outcome of one ISBN inside a batch
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchItem {
    /// ISBN as submitted
    pub isbn: String,
    pub success: bool,
    pub data: Option<LookupResult>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl BatchItem {
    fn from_outcome(isbn: String, outcome: AppResult<LookupResult>) -> Self {
        match outcome {
            Ok(result) => Self {
                isbn,
                success: true,
                data: Some(result),
                error: None,
                message: None,
            },
            Err(e) => Self {
                isbn,
                success: false,
                data: None,
                error: Some(e.kind().to_string()),
                message: Some(e.public_message()),
            },
        }
    }
}

/// A book copied into the local catalog
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportedBook {
    pub id: i32,
    /// Where the metadata was resolved from before import
    #[schema(value_type = String, example = "openlibrary")]
    pub imported_from: BookSource,
    pub book: BookMetadata,
}

#[derive(Clone)]
pub struct LookupService {
    catalog: ArcCatalogStore,
    resolver: Arc<ResolverService>,
    fallbacks: FallbackRegistry,
    batch_max_size: usize,
    batch_concurrency: usize,
}

impl LookupService {
    pub fn new(
        catalog: ArcCatalogStore,
        resolver: Arc<ResolverService>,
        fallbacks: FallbackRegistry,
        batch_max_size: usize,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            catalog,
            resolver,
            fallbacks,
            batch_max_size: batch_max_size.max(1),
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    pub fn batch_max_size(&self) -> usize {
        self.batch_max_size
    }

    /// Validate, then try local → external → fallback. A total miss carries
    /// whether the external path answered or was unavailable.
    pub async fn lookup_book(&self, raw_isbn: &str) -> AppResult<LookupResult> {
        let isbn = Isbn::parse(raw_isbn)?;

        if let Some(book) = self.catalog.find_by_isbn(&isbn).await? {
            tracing::debug!(isbn = %isbn, "Found in local catalog");
            return Ok(LookupResult::new(book.with_source(BookSource::Local)));
        }

        self.resolve_remote(&isbn).await.map(LookupResult::new)
    }

    /// External providers, then the fallback registry
    async fn resolve_remote(&self, isbn: &Isbn) -> AppResult<BookMetadata> {
        let failures = match self.resolver.resolve(isbn).await {
            Resolution::Found(book) => return Ok(book),
            Resolution::NotFound => Vec::new(),
            Resolution::Unavailable(failures) => failures,
        };

        if let Some(book) = self.fallbacks.resolve(isbn).await? {
            tracing::info!(isbn = %isbn, "Resolved ISBN from fallback registry");
            return Ok(book);
        }

        let miss = if failures.is_empty() {
            LookupMiss::not_found(isbn.as_str())
        } else {
            LookupMiss::unavailable(isbn.as_str(), failures)
        };
        tracing::info!(isbn = %isbn, reason = ?miss.reason, "ISBN lookup missed");
        Err(AppError::Unresolved(miss))
    }

    /// Look up several ISBNs with bounded concurrency. Results keep input
    /// order and one bad item never aborts the others.
    pub async fn batch_lookup(&self, isbns: Vec<String>) -> AppResult<Vec<BatchItem>> {
        if isbns.is_empty() {
            return Err(AppError::Validation("At least one ISBN is required".to_string()));
        }
        if isbns.len() > self.batch_max_size {
            return Err(AppError::Validation(format!(
                "At most {} ISBNs can be looked up at once, got {}",
                self.batch_max_size,
                isbns.len()
            )));
        }

        let items = stream::iter(isbns)
            .map(|raw| async move {
                let outcome = self.lookup_book(&raw).await;
                BatchItem::from_outcome(raw, outcome)
            })
            .buffered(self.batch_concurrency)
            .collect::<Vec<_>>()
            .await;

        let found = items.iter().filter(|item| item.success).count();
        tracing::info!("Batch lookup: {}/{} resolved", found, items.len());
        Ok(items)
    }

    /// Resolve an ISBN that is not yet in the catalog and persist it locally
    pub async fn import_book(&self, raw_isbn: &str) -> AppResult<ImportedBook> {
        let isbn = Isbn::parse(raw_isbn)?;

        if self.catalog.isbn_exists(&isbn).await? {
            return Err(AppError::Conflict(format!(
                "A book with ISBN {} already exists",
                isbn
            )));
        }

        let book = self.resolve_remote(&isbn).await?;
        let imported_from = book.source.clone();
        let id = self.catalog.insert_book(&isbn, &book).await?;

        let mut book = book.with_source(BookSource::Local);
        book.isbn = Some(isbn.to_string());
        Ok(ImportedBook {
            id,
            imported_from,
            book,
        })
    }
}
