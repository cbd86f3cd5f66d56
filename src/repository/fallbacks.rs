//! Fallback entries repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Pool, Postgres};

use super::FallbackStore;
use crate::{
    error::AppResult,
    isbn::Isbn,
    models::{BookMetadata, FallbackEntry},
};

#[derive(Debug, sqlx::FromRow)]
struct FallbackRow {
    isbn: String,
    metadata: Json<BookMetadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FallbackRow> for FallbackEntry {
    fn from(row: FallbackRow) -> Self {
        FallbackEntry {
            isbn: row.isbn,
            book: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct FallbacksRepository {
    pool: Pool<Postgres>,
}

impl FallbacksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FallbackStore for FallbacksRepository {
    async fn get(&self, isbn: &Isbn) -> AppResult<Option<FallbackEntry>> {
        let row = sqlx::query_as::<_, FallbackRow>(
            "SELECT isbn, metadata, created_at, updated_at FROM isbn_fallbacks WHERE isbn = $1",
        )
        .bind(isbn.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FallbackEntry::from))
    }

    async fn upsert(&self, isbn: &Isbn, book: &BookMetadata) -> AppResult<(FallbackEntry, bool)> {
        // xmax is non-zero when the row was updated rather than inserted
        let (isbn, metadata, created_at, updated_at, replaced) =
            sqlx::query_as::<_, (String, Json<BookMetadata>, DateTime<Utc>, DateTime<Utc>, bool)>(
                r#"
                INSERT INTO isbn_fallbacks (isbn, metadata)
                VALUES ($1, $2)
                ON CONFLICT (isbn)
                DO UPDATE SET metadata = EXCLUDED.metadata, updated_at = NOW()
                RETURNING isbn, metadata, created_at, updated_at, (xmax::text <> '0') AS replaced
                "#,
            )
            .bind(isbn.as_str())
            .bind(Json(book))
            .fetch_one(&self.pool)
            .await?;

        let entry = FallbackEntry {
            isbn,
            book: metadata.0,
            created_at,
            updated_at,
        };
        Ok((entry, replaced))
    }

    async fn remove(&self, isbn: &Isbn) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM isbn_fallbacks WHERE isbn = $1")
            .bind(isbn.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> AppResult<Vec<FallbackEntry>> {
        let rows = sqlx::query_as::<_, FallbackRow>(
            "SELECT isbn, metadata, created_at, updated_at FROM isbn_fallbacks ORDER BY isbn",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FallbackEntry::from).collect())
    }
}
