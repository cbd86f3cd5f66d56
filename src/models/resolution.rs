//! Outcome types shared by the resolver, the lookup orchestration and the API

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

use super::book::{BookMetadata, BookSource};

/// Why a provider did not produce an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Circuit open, no request was sent
    CircuitOpen,
    /// Timeout, network error or 5xx after retries were exhausted
    Transient,
    /// Non-retryable error such as an unexpected response shape
    Rejected,
}

/// Failure context for one provider
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub message: String,
    /// Seconds until an open circuit admits a trial call
    pub retry_after_secs: Option<u64>,
}

/// Result of the resilience-wrapped external resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(BookMetadata),
    /// Every provider answered an authoritative negative
    NotFound,
    /// At least one provider could not be asked or failed
    Unavailable(Vec<ProviderFailure>),
}

/// Why a full lookup ended without a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum MissReason {
    /// Providers said the ISBN does not exist
    NotFound,
    /// The most recent provider was skipped because its circuit is open
    CircuitOpen,
    /// Providers failed and no authoritative answer was obtained
    ProviderUnavailable,
}

/// Terminal miss of `lookup_book`, with context for the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LookupMiss {
    pub isbn: String,
    pub reason: MissReason,
    pub failures: Vec<ProviderFailure>,
}

impl LookupMiss {
    pub fn not_found(isbn: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            reason: MissReason::NotFound,
            failures: Vec::new(),
        }
    }

    /// Build a miss from provider failures; the last failure decides the reason
    pub fn unavailable(isbn: impl Into<String>, failures: Vec<ProviderFailure>) -> Self {
        let reason = match failures.last().map(|f| f.kind) {
            Some(FailureKind::CircuitOpen) => MissReason::CircuitOpen,
            Some(_) => MissReason::ProviderUnavailable,
            None => MissReason::NotFound,
        };
        Self {
            isbn: isbn.into(),
            reason,
            failures,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.reason != MissReason::NotFound
    }

    pub fn message(&self) -> String {
        match self.reason {
            MissReason::NotFound => format!("No book found for ISBN {}", self.isbn),
            MissReason::CircuitOpen => format!(
                "No book found for ISBN {}: external providers are temporarily disabled",
                self.isbn
            ),
            MissReason::ProviderUnavailable => format!(
                "No book found for ISBN {}: external providers are unavailable",
                self.isbn
            ),
        }
    }
}

/// Successful lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LookupResult {
    #[schema(value_type = String, example = "local")]
    pub source: BookSource,
    pub book: BookMetadata,
}

impl LookupResult {
    pub fn new(book: BookMetadata) -> Self {
        Self {
            source: book.source.clone(),
            book,
        }
    }
}
