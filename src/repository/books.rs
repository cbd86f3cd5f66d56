//! Books repository (local catalog)

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use super::CatalogStore;
use crate::{
    error::{AppError, AppResult},
    isbn::Isbn,
    models::{AuthorInfo, BookMetadata, BookSource},
};

#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    id: i32,
    isbn: String,
    title: String,
    subtitle: Option<String>,
    edition_number: Option<i32>,
    edition_date: Option<NaiveDate>,
    publisher: Option<String>,
    page_count: Option<i32>,
    language: Option<String>,
    cover_url: Option<String>,
}

impl BookRow {
    fn into_book(self, authors: Vec<AuthorInfo>, categories: Vec<String>) -> BookMetadata {
        BookMetadata {
            title: self.title,
            subtitle: self.subtitle,
            authors,
            categories,
            edition_number: self.edition_number,
            edition_date: self.edition_date,
            publisher: self.publisher,
            page_count: self.page_count,
            language: self.language,
            cover_url: self.cover_url,
            isbn: Some(self.isbn),
            source: BookSource::Local,
        }
    }
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Load all authors for a book via the book_authors junction table
    async fn get_book_authors(&self, book_id: i32) -> AppResult<Vec<AuthorInfo>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
            r#"
            SELECT a.name, a.surname, a.nationality
            FROM book_authors ba
            JOIN authors a ON a.id = ba.author_id
            WHERE ba.book_id = $1
            ORDER BY ba.position
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, surname, nationality)| AuthorInfo {
                name,
                surname,
                nationality,
            })
            .collect())
    }

    async fn get_book_categories(&self, book_id: i32) -> AppResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT c.name
            FROM book_categories bc
            JOIN categories c ON c.id = bc.category_id
            WHERE bc.book_id = $1
            ORDER BY c.name
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

fn conflict_on_duplicate(isbn: &Isbn, err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("A book with ISBN {} already exists", isbn))
        }
        _ => AppError::Database(err),
    }
}

#[async_trait]
impl CatalogStore for BooksRepository {
    async fn find_by_isbn(&self, isbn: &Isbn) -> AppResult<Option<BookMetadata>> {
        let row = sqlx::query_as::<_, BookRow>(
            r#"
            SELECT id, isbn, title, subtitle, edition_number, edition_date,
                   publisher, page_count, language, cover_url
            FROM books
            WHERE isbn = $1
            "#,
        )
        .bind(isbn.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let authors = self.get_book_authors(row.id).await?;
        let categories = self.get_book_categories(row.id).await?;
        Ok(Some(row.into_book(authors, categories)))
    }

    async fn isbn_exists(&self, isbn: &Isbn) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1)")
            .bind(isbn.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_book(&self, isbn: &Isbn, book: &BookMetadata) -> AppResult<i32> {
        let mut tx = self.pool.begin().await?;

        let book_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO books (isbn, title, subtitle, edition_number, edition_date,
                               publisher, page_count, language, cover_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(isbn.as_str())
        .bind(&book.title)
        .bind(&book.subtitle)
        .bind(book.edition_number)
        .bind(book.edition_date)
        .bind(&book.publisher)
        .bind(book.page_count)
        .bind(&book.language)
        .bind(&book.cover_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_duplicate(isbn, e))?;

        for (position, author) in book.authors.iter().enumerate() {
            // Authors are shared between books, keyed by name + surname
            let author_id: i32 = sqlx::query_scalar(
                r#"
                INSERT INTO authors (name, surname, nationality)
                VALUES ($1, $2, $3)
                ON CONFLICT (name, surname)
                DO UPDATE SET nationality = COALESCE(authors.nationality, EXCLUDED.nationality)
                RETURNING id
                "#,
            )
            .bind(&author.name)
            .bind(&author.surname)
            .bind(&author.nationality)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO book_authors (book_id, author_id, position) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(book_id)
            .bind(author_id)
            .bind(position as i16)
            .execute(&mut *tx)
            .await?;
        }

        for category in &book.categories {
            let category_id: i32 = sqlx::query_scalar(
                r#"
                INSERT INTO categories (name) VALUES ($1)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(category)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO book_categories (book_id, category_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(book_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(isbn = %isbn, book_id, "Imported book into local catalog");
        Ok(book_id)
    }
}
