//! ISBN API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    isbn::{self as normalizer, Isbn, IsbnValidation},
    models::{BookMetadata, FallbackEntry, LookupResult, RegisterFallback},
    resilience::CacheStats,
    services::{BatchItem, ImportedBook, ProviderHealth, ResilienceStats},
    AppState,
};

use super::{AdminUser, ApiJson, ApiQuery, ApiResponse};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 40;

/// Query parameters for `GET /isbn/lookup`
#[derive(Debug, Deserialize, IntoParams)]
pub struct LookupQuery {
    /// Raw ISBN-10 or ISBN-13, separators allowed
    pub isbn: Option<String>,
}

/// Request body for batch lookups
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchLookupRequest {
    #[validate(length(min = 1, message = "At least one ISBN is required"))]
    pub isbns: Vec<String>,
}

/// Query parameters for title search
#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Title words
    pub q: Option<String>,
    /// Maximum number of results (default 10, max 40); unparsable values use the default
    #[param(value_type = Option<usize>)]
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FormatQuery {
    pub isbn: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct FormattedIsbn {
    /// Normalized ISBN-13
    pub isbn: String,
    /// Hyphenated ISBN-13
    pub formatted: String,
    /// ISBN-10 form, only for the 978 prefix
    pub isbn10: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProvidersHealth {
    /// `true` when every provider answered the probe
    pub healthy: bool,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CacheQuery {
    /// Only drop this ISBN
    pub isbn: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CacheCleared {
    pub removed: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResilienceQuery {
    /// Only reset this provider's circuit
    pub provider: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CircuitsReset {
    pub reset: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FallbackStored {
    pub entry: FallbackEntry,
    /// `true` when an existing entry was overwritten
    pub replaced: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ImportRequest {
    #[validate(length(min = 1, max = 32))]
    pub isbn: String,
}

/// Look up a book by ISBN in the path
#[utoipa::path(
    get,
    path = "/isbn/lookup/{isbn}",
    tag = "isbn",
    params(("isbn" = String, Path, description = "ISBN-10 or ISBN-13")),
    responses(
        (status = 200, description = "Book found", body = LookupResult),
        (status = 400, description = "Invalid ISBN", body = crate::error::ErrorResponse),
        (status = 404, description = "No source knows this ISBN", body = crate::error::ErrorResponse),
        (status = 503, description = "Providers unavailable or circuit open", body = crate::error::ErrorResponse)
    )
)]
pub async fn lookup_by_path(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
) -> AppResult<Json<ApiResponse<LookupResult>>> {
    let result = state.services.lookup.lookup_book(&isbn).await?;
    Ok(ApiResponse::ok(result))
}

/// Look up a book by ISBN query parameter
#[utoipa::path(
    get,
    path = "/isbn/lookup",
    tag = "isbn",
    params(LookupQuery),
    responses(
        (status = 200, description = "Book found", body = LookupResult),
        (status = 400, description = "Missing or invalid ISBN", body = crate::error::ErrorResponse),
        (status = 404, description = "No source knows this ISBN", body = crate::error::ErrorResponse),
        (status = 503, description = "Providers unavailable or circuit open", body = crate::error::ErrorResponse)
    )
)]
pub async fn lookup_by_query(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LookupQuery>,
) -> AppResult<Json<ApiResponse<LookupResult>>> {
    let isbn = query
        .isbn
        .ok_or_else(|| AppError::Validation("Query parameter 'isbn' is required".to_string()))?;
    let result = state.services.lookup.lookup_book(&isbn).await?;
    Ok(ApiResponse::ok(result))
}

/// Look up several ISBNs; each item succeeds or fails on its own
#[utoipa::path(
    post,
    path = "/isbn/lookup",
    tag = "isbn",
    request_body = BatchLookupRequest,
    responses(
        (status = 200, description = "Per-item results in input order", body = Vec<BatchItem>),
        (status = 400, description = "Empty or oversized batch", body = crate::error::ErrorResponse)
    )
)]
pub async fn batch_lookup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BatchLookupRequest>,
) -> AppResult<Json<ApiResponse<Vec<BatchItem>>>> {
    request.validate()?;
    let items = state.services.lookup.batch_lookup(request.isbns).await?;
    Ok(ApiResponse::ok(items))
}

/// Best-effort title search across external providers
#[utoipa::path(
    get,
    path = "/isbn/search",
    tag = "isbn",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching books, possibly empty", body = Vec<BookMetadata>)
    )
)]
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Json<ApiResponse<Vec<BookMetadata>>> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return ApiResponse::ok(Vec::new());
    }

    let limit = query
        .limit
        .and_then(|limit| limit.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let books = state.services.resolver.search_by_title(q, limit).await;
    ApiResponse::ok(books)
}

/// Validate and normalize an ISBN
#[utoipa::path(
    get,
    path = "/isbn/validate/{isbn}",
    tag = "isbn",
    params(("isbn" = String, Path, description = "Raw ISBN")),
    responses(
        (status = 200, description = "Validation result", body = IsbnValidation)
    )
)]
pub async fn validate(Path(isbn): Path<String>) -> Json<ApiResponse<IsbnValidation>> {
    ApiResponse::ok(normalizer::validate(&isbn))
}

/// Hyphenated display form of an ISBN
#[utoipa::path(
    get,
    path = "/isbn/format",
    tag = "isbn",
    params(FormatQuery),
    responses(
        (status = 200, description = "Formatted ISBN", body = FormattedIsbn),
        (status = 400, description = "Invalid ISBN", body = crate::error::ErrorResponse)
    )
)]
pub async fn format(
    ApiQuery(query): ApiQuery<FormatQuery>,
) -> AppResult<Json<ApiResponse<FormattedIsbn>>> {
    let raw = query
        .isbn
        .ok_or_else(|| AppError::Validation("Query parameter 'isbn' is required".to_string()))?;
    let isbn = Isbn::parse(&raw)?;
    Ok(ApiResponse::ok(FormattedIsbn {
        formatted: isbn.hyphenated(),
        isbn10: isbn.to_isbn10(),
        isbn: isbn.to_string(),
    }))
}

/// Probe every external provider
#[utoipa::path(
    get,
    path = "/isbn/health",
    tag = "isbn",
    responses(
        (status = 200, description = "Provider reachability", body = ProvidersHealth)
    )
)]
pub async fn providers_health(State(state): State<AppState>) -> Json<ApiResponse<ProvidersHealth>> {
    let providers = state.services.resolver.health().await;
    let healthy = providers.iter().all(|p| p.reachable);
    ApiResponse::ok(ProvidersHealth { healthy, providers })
}

/// Resilience snapshot: cache, circuits and call counters
#[utoipa::path(
    get,
    path = "/isbn/stats",
    tag = "isbn",
    responses(
        (status = 200, description = "Resilience statistics", body = ResilienceStats)
    )
)]
pub async fn stats(State(state): State<AppState>) -> Json<ApiResponse<ResilienceStats>> {
    ApiResponse::ok(state.services.resolver.stats())
}

/// Resolver cache statistics
#[utoipa::path(
    get,
    path = "/isbn/cache",
    tag = "isbn",
    responses(
        (status = 200, description = "Cache statistics", body = CacheStats)
    )
)]
pub async fn cache_stats(State(state): State<AppState>) -> Json<ApiResponse<CacheStats>> {
    ApiResponse::ok(state.services.resolver.cache_stats())
}

/// Drop one cached ISBN or the whole cache
#[utoipa::path(
    delete,
    path = "/isbn/cache",
    tag = "isbn",
    security(("bearer_auth" = [])),
    params(CacheQuery),
    responses(
        (status = 200, description = "Entries removed", body = CacheCleared),
        (status = 400, description = "Invalid ISBN", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    )
)]
pub async fn clear_cache(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    ApiQuery(query): ApiQuery<CacheQuery>,
) -> AppResult<Json<ApiResponse<CacheCleared>>> {
    let isbn = query.isbn.as_deref().map(Isbn::parse).transpose()?;
    let removed = state.services.resolver.clear_cache(isbn.as_ref());
    tracing::info!("Cache cleared by {}: {} entries", claims.sub, removed);
    Ok(ApiResponse::ok(CacheCleared { removed }))
}

/// Force one or all provider circuits closed
#[utoipa::path(
    delete,
    path = "/isbn/resilience",
    tag = "isbn",
    security(("bearer_auth" = [])),
    params(ResilienceQuery),
    responses(
        (status = 200, description = "Circuits reset", body = CircuitsReset),
        (status = 404, description = "Unknown provider", body = crate::error::ErrorResponse)
    )
)]
pub async fn reset_circuits(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    ApiQuery(query): ApiQuery<ResilienceQuery>,
) -> AppResult<Json<ApiResponse<CircuitsReset>>> {
    let reset = state
        .services
        .resolver
        .reset_circuit(query.provider.as_deref())?;
    tracing::info!("Circuits reset by {}: {:?}", claims.sub, reset);
    Ok(ApiResponse::ok(CircuitsReset { reset }))
}

/// Register or overwrite a fallback entry
#[utoipa::path(
    post,
    path = "/isbn/fallback",
    tag = "isbn",
    security(("bearer_auth" = [])),
    request_body = RegisterFallback,
    responses(
        (status = 201, description = "Fallback stored", body = FallbackStored),
        (status = 400, description = "Invalid ISBN or metadata", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_fallback(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
    ApiJson(request): ApiJson<RegisterFallback>,
) -> AppResult<(StatusCode, Json<ApiResponse<FallbackStored>>)> {
    request.validate()?;
    let (entry, replaced) = state
        .services
        .fallbacks
        .add(&request.isbn, request.metadata)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(FallbackStored { entry, replaced })))
}

/// List fallback entries
#[utoipa::path(
    get,
    path = "/isbn/fallback",
    tag = "isbn",
    responses(
        (status = 200, description = "Fallback entries", body = Vec<FallbackEntry>)
    )
)]
pub async fn list_fallbacks(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<FallbackEntry>>>> {
    let entries = state.services.fallbacks.list().await?;
    Ok(ApiResponse::ok(entries))
}

/// Remove a fallback entry
#[utoipa::path(
    delete,
    path = "/isbn/fallback/{isbn}",
    tag = "isbn",
    security(("bearer_auth" = [])),
    params(("isbn" = String, Path, description = "ISBN of the entry")),
    responses(
        (status = 204, description = "Fallback removed"),
        (status = 404, description = "No entry for this ISBN", body = crate::error::ErrorResponse)
    )
)]
pub async fn remove_fallback(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
    Path(isbn): Path<String>,
) -> AppResult<StatusCode> {
    state.services.fallbacks.remove(&isbn).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resolve an ISBN and copy it into the local catalog
#[utoipa::path(
    post,
    path = "/isbn/import",
    tag = "isbn",
    security(("bearer_auth" = [])),
    request_body = ImportRequest,
    responses(
        (status = 201, description = "Book imported", body = ImportedBook),
        (status = 404, description = "No source knows this ISBN", body = crate::error::ErrorResponse),
        (status = 409, description = "ISBN already in the catalog", body = crate::error::ErrorResponse)
    )
)]
pub async fn import_book(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    ApiJson(request): ApiJson<ImportRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<ImportedBook>>)> {
    request.validate()?;
    let imported = state.services.lookup.import_book(&request.isbn).await?;
    tracing::info!("Book {} imported by {}", imported.id, claims.sub);
    Ok((StatusCode::CREATED, ApiResponse::ok(imported)))
}
