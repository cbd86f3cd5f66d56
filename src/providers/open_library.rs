//! Open Library adapter (`/isbn/{isbn}.json`, `/search.json`)

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{get_json, parse_edition_number, parse_loose_date, probe, BookProvider, ProviderError};
use crate::{
    isbn::Isbn,
    models::{AuthorInfo, BookMetadata, BookSource},
};

pub const NAME: &str = "openlibrary";

const COVERS_URL: &str = "https://covers.openlibrary.org/b/id";

#[derive(Debug, Deserialize)]
struct KeyRef {
    key: String,
}

/// Edition record as returned by `/isbn/{isbn}.json`
#[derive(Debug, Deserialize)]
struct Edition {
    title: Option<String>,
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<KeyRef>,
    #[serde(default)]
    publishers: Vec<String>,
    publish_date: Option<String>,
    number_of_pages: Option<i32>,
    #[serde(default)]
    subjects: Vec<String>,
    edition_name: Option<String>,
    #[serde(default)]
    covers: Vec<i64>,
    #[serde(default)]
    languages: Vec<KeyRef>,
}

#[derive(Debug, Deserialize)]
struct AuthorRecord {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    first_publish_year: Option<i32>,
    #[serde(default)]
    isbn: Vec<String>,
    #[serde(default)]
    subject: Vec<String>,
    #[serde(default)]
    publisher: Vec<String>,
    cover_i: Option<i64>,
    #[serde(default)]
    language: Vec<String>,
}

fn cover_url(cover_id: i64) -> Option<String> {
    (cover_id > 0).then(|| format!("{}/{}-M.jpg", COVERS_URL, cover_id))
}

fn language_code(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

fn map_edition(
    isbn: &Isbn,
    edition: Edition,
    authors: Vec<AuthorInfo>,
) -> Result<BookMetadata, ProviderError> {
    let title = edition
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::invalid(NAME, "edition has no title"))?;

    let mut book = BookMetadata::new(title, BookSource::External(NAME.to_string()));
    book.subtitle = edition.subtitle;
    book.authors = authors;
    book.categories = edition.subjects.into_iter().take(10).collect();
    book.edition_number = edition.edition_name.as_deref().and_then(parse_edition_number);
    book.edition_date = edition.publish_date.as_deref().and_then(parse_loose_date);
    book.publisher = edition.publishers.into_iter().next();
    book.page_count = edition.number_of_pages.filter(|n| *n > 0);
    book.language = edition.languages.first().map(|l| language_code(&l.key));
    book.cover_url = edition.covers.first().copied().and_then(cover_url);
    book.isbn = Some(isbn.to_string());
    Ok(book)
}

fn map_search_doc(doc: SearchDoc) -> Option<BookMetadata> {
    let title = doc.title.filter(|t| !t.trim().is_empty())?;

    let mut book = BookMetadata::new(title, BookSource::External(NAME.to_string()));
    book.authors = doc
        .author_name
        .iter()
        .map(|n| AuthorInfo::from_full_name(n))
        .collect();
    book.categories = doc.subject.into_iter().take(10).collect();
    book.edition_date = doc
        .first_publish_year
        .and_then(|year| chrono::NaiveDate::from_ymd_opt(year, 1, 1));
    book.publisher = doc.publisher.into_iter().next();
    book.language = doc.language.into_iter().next();
    book.cover_url = doc.cover_i.and_then(cover_url);
    book.isbn = doc
        .isbn
        .iter()
        .find_map(|raw| Isbn::parse(raw).ok())
        .map(|isbn| isbn.to_string());
    Some(book)
}

pub struct OpenLibraryProvider {
    client: Client,
    base_url: String,
}

impl OpenLibraryProvider {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Author names are separate documents; failures degrade to a partial author list
    async fn fetch_authors(&self, refs: &[KeyRef]) -> Vec<AuthorInfo> {
        let mut authors = Vec::with_capacity(refs.len());
        for author_ref in refs {
            let url = format!("{}{}.json", self.base_url, author_ref.key);
            match get_json::<AuthorRecord>(&self.client, NAME, &url).await {
                Ok(Some(record)) => authors.push(AuthorInfo::from_full_name(&record.name)),
                Ok(None) => tracing::debug!("Open Library author {} not found", author_ref.key),
                Err(e) => tracing::warn!(
                    "Failed to fetch Open Library author {}: {}",
                    author_ref.key,
                    e
                ),
            }
        }
        authors
    }
}

#[async_trait]
impl BookProvider for OpenLibraryProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn lookup(&self, isbn: &Isbn) -> Result<Option<BookMetadata>, ProviderError> {
        let url = format!("{}/isbn/{}.json", self.base_url, isbn);
        let Some(edition) = get_json::<Edition>(&self.client, NAME, &url).await? else {
            return Ok(None);
        };

        let authors = self.fetch_authors(&edition.authors).await;
        map_edition(isbn, edition, authors).map(Some)
    }

    async fn search_by_title(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BookMetadata>, ProviderError> {
        let limit_param = limit.to_string();
        let url = Url::parse_with_params(
            &format!("{}/search.json", self.base_url),
            &[("title", query), ("limit", limit_param.as_str())],
        )
        .map_err(|e| ProviderError::invalid(NAME, format!("bad search URL: {}", e)))?;

        let response = get_json::<SearchResponse>(&self.client, NAME, url.as_str()).await?;
        Ok(response
            .map(|r| r.docs.into_iter().filter_map(map_search_doc).take(limit).collect())
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        probe(&self.client, NAME, &format!("{}/", self.base_url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn isbn() -> Isbn {
        Isbn::parse("9780134494166").unwrap()
    }

    #[test]
    fn test_map_edition() {
        let edition: Edition = serde_json::from_value(json!({
            "title": "Clean Architecture",
            "subtitle": "A Craftsman's Guide to Software Structure and Design",
            "authors": [{"key": "/authors/OL216228A"}],
            "publishers": ["Prentice Hall"],
            "publish_date": "Sep 10, 2017",
            "number_of_pages": 432,
            "subjects": ["Software architecture", "Computer software"],
            "edition_name": "1st ed.",
            "covers": [8395260],
            "languages": [{"key": "/languages/eng"}]
        }))
        .unwrap();

        let authors = vec![AuthorInfo::from_full_name("Robert C. Martin")];
        let book = map_edition(&isbn(), edition, authors).unwrap();

        assert_eq!(book.title, "Clean Architecture");
        assert_eq!(book.source, BookSource::External("openlibrary".into()));
        assert_eq!(book.authors[0].surname, "Martin");
        assert_eq!(book.categories.len(), 2);
        assert_eq!(book.edition_number, Some(1));
        assert_eq!(book.edition_date, chrono::NaiveDate::from_ymd_opt(2017, 9, 10));
        assert_eq!(book.publisher.as_deref(), Some("Prentice Hall"));
        assert_eq!(book.page_count, Some(432));
        assert_eq!(book.language.as_deref(), Some("eng"));
        assert_eq!(
            book.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/8395260-M.jpg")
        );
        assert_eq!(book.isbn.as_deref(), Some("9780134494166"));
    }

    #[test]
    fn test_edition_without_title_is_rejected() {
        let edition: Edition = serde_json::from_value(json!({"publishers": ["X"]})).unwrap();
        let err = map_edition(&isbn(), edition, vec![]).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[test]
    fn test_map_search_doc_skips_untitled_and_normalizes_isbn() {
        let response: SearchResponse = serde_json::from_value(json!({
            "numFound": 2,
            "docs": [
                {"title": "Refactoring", "author_name": ["Martin Fowler"], "first_publish_year": 1999,
                 "isbn": ["bogus", "0201485672"], "cover_i": -1},
                {"author_name": ["Nobody"]}
            ]
        }))
        .unwrap();

        let books: Vec<BookMetadata> =
            response.docs.into_iter().filter_map(map_search_doc).collect();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Refactoring");
        assert_eq!(books[0].isbn.as_deref(), Some("9780201485677"));
        assert_eq!(books[0].authors[0].name, "Martin");
        assert!(books[0].cover_url.is_none());
    }
}
