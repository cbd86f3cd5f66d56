//! Google Books adapter (`/books/v1/volumes`)

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{get_json, parse_loose_date, probe, BookProvider, ProviderError};
use crate::{
    isbn::Isbn,
    models::{AuthorInfo, BookMetadata, BookSource},
};

pub const NAME: &str = "googlebooks";

/// Volumes fetched per ISBN lookup; the `isbn:` query can return editions of other ISBNs
const LOOKUP_MAX_RESULTS: usize = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volumes {
    #[serde(default)]
    total_items: u32,
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    volume_info: VolumeInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    page_count: Option<i32>,
    language: Option<String>,
    image_links: Option<ImageLinks>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

fn map_volume(info: VolumeInfo) -> Option<BookMetadata> {
    let isbn = volume_isbns(&info).first().map(|isbn| isbn.to_string());
    let title = info.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;

    let mut book = BookMetadata::new(title, BookSource::External(NAME.to_string()));
    book.subtitle = info.subtitle;
    book.authors = info.authors.iter().map(|a| AuthorInfo::from_full_name(a)).collect();
    book.categories = info.categories;
    book.edition_date = info.published_date.as_deref().and_then(parse_loose_date);
    book.publisher = info.publisher;
    book.page_count = info.page_count.filter(|n| *n > 0);
    book.language = info.language;
    book.cover_url = info.image_links.and_then(|links| links.thumbnail);
    book.isbn = isbn;
    Some(book)
}

/// ISBNs listed by a volume, normalized
fn volume_isbns(info: &VolumeInfo) -> Vec<Isbn> {
    info.industry_identifiers
        .iter()
        .filter(|id| id.kind.starts_with("ISBN"))
        .filter_map(|id| Isbn::parse(&id.identifier).ok())
        .collect()
}

/// Pick the volume listing the requested ISBN. Volumes that list only other
/// ISBNs are skipped; a volume listing none is trusted as the `isbn:` match.
/// A chosen volume without a title is a bad shape.
fn map_lookup(isbn: &Isbn, volumes: Volumes) -> Result<Option<BookMetadata>, ProviderError> {
    if volumes.total_items == 0 || volumes.items.is_empty() {
        return Ok(None);
    }

    let mut candidates: Vec<(bool, VolumeInfo)> = volumes
        .items
        .into_iter()
        .filter_map(|v| {
            let listed = volume_isbns(&v.volume_info);
            if listed.is_empty() {
                Some((false, v.volume_info))
            } else if listed.contains(isbn) {
                Some((true, v.volume_info))
            } else {
                None
            }
        })
        .collect();

    // Exact identifier matches first, stable otherwise
    candidates.sort_by_key(|(matched, _)| !*matched);
    let Some((_, info)) = candidates.into_iter().next() else {
        tracing::debug!(isbn = %isbn, "No Google Books volume lists the requested ISBN");
        return Ok(None);
    };

    let mut book =
        map_volume(info).ok_or_else(|| ProviderError::invalid(NAME, "volume has no title"))?;
    book.isbn = Some(isbn.to_string());
    Ok(Some(book))
}

pub struct GoogleBooksProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksProvider {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn volumes_url(&self, q: &str, max_results: usize) -> Result<Url, ProviderError> {
        let max_results = max_results.to_string();
        let mut params = vec![("q", q), ("maxResults", max_results.as_str())];
        if let Some(ref key) = self.api_key {
            params.push(("key", key.as_str()));
        }
        Url::parse_with_params(&format!("{}/books/v1/volumes", self.base_url), &params)
            .map_err(|e| ProviderError::invalid(NAME, format!("bad volumes URL: {}", e)))
    }
}

#[async_trait]
impl BookProvider for GoogleBooksProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn lookup(&self, isbn: &Isbn) -> Result<Option<BookMetadata>, ProviderError> {
        let url = self.volumes_url(&format!("isbn:{}", isbn), LOOKUP_MAX_RESULTS)?;
        match get_json::<Volumes>(&self.client, NAME, url.as_str()).await? {
            Some(volumes) => map_lookup(isbn, volumes),
            None => Ok(None),
        }
    }

    async fn search_by_title(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BookMetadata>, ProviderError> {
        let url = self.volumes_url(&format!("intitle:{}", query), limit.clamp(1, 40))?;
        let volumes = get_json::<Volumes>(&self.client, NAME, url.as_str()).await?;
        Ok(volumes
            .map(|v| {
                v.items
                    .into_iter()
                    .filter_map(|item| map_volume(item.volume_info))
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let url = self.volumes_url("isbn:9780134685991", 1)?;
        probe(&self.client, NAME, url.as_str()).await
    }
}
