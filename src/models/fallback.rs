//! Operator-curated fallback entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::Validate;

use super::book::{AuthorInfo, BookMetadata, BookSource};

/// A manually registered ISBN → metadata mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FallbackEntry {
    /// Normalized ISBN-13
    pub isbn: String,
    pub book: BookMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata accepted when registering a fallback entry
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FallbackMetadata {
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    pub subtitle: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub authors: Vec<AuthorInfo>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[validate(range(min = 1))]
    pub edition_number: Option<i32>,
    pub edition_date: Option<chrono::NaiveDate>,
    pub publisher: Option<String>,
    #[validate(range(min = 1))]
    pub page_count: Option<i32>,
    pub language: Option<String>,
    #[validate(url)]
    pub cover_url: Option<String>,
}

impl FallbackMetadata {
    /// Convert into book metadata tagged with the fallback source
    pub fn into_book(self, isbn: &str) -> BookMetadata {
        BookMetadata {
            title: self.title.trim().to_string(),
            subtitle: self.subtitle,
            authors: self.authors,
            categories: self.categories,
            edition_number: self.edition_number,
            edition_date: self.edition_date,
            publisher: self.publisher,
            page_count: self.page_count,
            language: self.language,
            cover_url: self.cover_url,
            isbn: Some(isbn.to_string()),
            source: BookSource::Fallback,
        }
    }
}

/// Request body for `POST /isbn/fallback`
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct RegisterFallback {
    #[validate(length(min = 1, max = 32))]
    pub isbn: String,
    #[validate(nested)]
    pub metadata: FallbackMetadata,
}
