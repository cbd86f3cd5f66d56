//! Book metadata returned by every resolution path

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Where a resolved book came from.
///
/// Serialized as `local`, `fallback`, or the external provider name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum BookSource {
    Local,
    External(String),
    Fallback,
}

impl BookSource {
    pub fn as_str(&self) -> &str {
        match self {
            BookSource::Local => "local",
            BookSource::External(provider) => provider,
            BookSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for BookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BookSource> for String {
    fn from(source: BookSource) -> Self {
        source.as_str().to_string()
    }
}

impl From<String> for BookSource {
    fn from(value: String) -> Self {
        match value.as_str() {
            "local" => BookSource::Local,
            "fallback" => BookSource::Fallback,
            _ => BookSource::External(value),
        }
    }
}

/// Author as carried in book metadata
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_author_named"))]
pub struct AuthorInfo {
    /// Given name(s); empty for single-word names such as "Voltaire"
    #[serde(default)]
    #[validate(length(max = 255))]
    pub name: String,
    /// Family name
    #[serde(default)]
    #[validate(length(max = 255))]
    pub surname: String,
    pub nationality: Option<String>,
}

/// An author needs a name or a surname
fn validate_author_named(author: &AuthorInfo) -> Result<(), ValidationError> {
    if author.name.trim().is_empty() && author.surname.trim().is_empty() {
        let mut error = ValidationError::new("author_name");
        error.message = Some("author needs a name or a surname".into());
        return Err(error);
    }
    Ok(())
}

impl AuthorInfo {
    /// Split a display name such as "Robert C. Martin" into name and surname.
    /// A single word is treated as the surname.
    pub fn from_full_name(full_name: &str) -> Self {
        let full_name = full_name.trim();
        match full_name.rsplit_once(char::is_whitespace) {
            Some((name, surname)) => Self {
                name: name.trim().to_string(),
                surname: surname.trim().to_string(),
                nationality: None,
            },
            None => Self {
                name: String::new(),
                surname: full_name.to_string(),
                nationality: None,
            },
        }
    }
}

/// Bibliographic record for one ISBN
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<AuthorInfo>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub edition_number: Option<i32>,
    pub edition_date: Option<NaiveDate>,
    pub publisher: Option<String>,
    pub page_count: Option<i32>,
    pub language: Option<String>,
    pub cover_url: Option<String>,
    /// Normalized ISBN-13 when known
    pub isbn: Option<String>,
    #[schema(value_type = String, example = "openlibrary")]
    pub source: BookSource,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>, source: BookSource) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            authors: Vec::new(),
            categories: Vec::new(),
            edition_number: None,
            edition_date: None,
            publisher: None,
            page_count: None,
            language: None,
            cover_url: None,
            isbn: None,
            source,
        }
    }

    pub fn with_source(mut self, source: BookSource) -> Self {
        self.source = source;
        self
    }
}
