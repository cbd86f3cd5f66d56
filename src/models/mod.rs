//! Data models for the ISBN resolver

pub mod book;
pub mod claims;
pub mod fallback;
pub mod resolution;

// Re-export commonly used types
pub use book::{AuthorInfo, BookMetadata, BookSource};
pub use claims::AdminClaims;
pub use fallback::{FallbackEntry, FallbackMetadata, RegisterFallback};
pub use resolution::{
    FailureKind, LookupMiss, LookupResult, MissReason, ProviderFailure, Resolution,
};
