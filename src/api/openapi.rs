//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, isbn};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ISBN Resolver API",
        version = "1.0.0",
        description = "ISBN validation and resolution: local catalog, external providers, fallback registry",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        // Lookup
        isbn::lookup_by_path,
        isbn::lookup_by_query,
        isbn::batch_lookup,
        isbn::search,
        // Normalizer
        isbn::validate,
        isbn::format,
        // Resilience
        isbn::providers_health,
        isbn::stats,
        isbn::cache_stats,
        isbn::clear_cache,
        isbn::reset_circuits,
        // Fallback registry
        isbn::add_fallback,
        isbn::list_fallbacks,
        isbn::remove_fallback,
        // Import
        isbn::import_book,
    ),
    components(
        schemas(
            // Books
            crate::models::BookMetadata,
            crate::models::AuthorInfo,
            crate::models::LookupResult,
            crate::models::LookupMiss,
            crate::models::MissReason,
            crate::models::ProviderFailure,
            crate::models::FailureKind,
            // Normalizer
            crate::isbn::IsbnValidation,
            isbn::FormattedIsbn,
            // Batch & search
            isbn::BatchLookupRequest,
            crate::services::BatchItem,
            // Resilience
            crate::services::ResilienceStats,
            crate::services::ProviderHealth,
            crate::resilience::CacheStats,
            crate::resilience::CircuitSnapshot,
            crate::resilience::CircuitState,
            isbn::ProvidersHealth,
            isbn::CacheCleared,
            isbn::CircuitsReset,
            // Fallback registry
            crate::models::FallbackEntry,
            crate::models::FallbackMetadata,
            crate::models::RegisterFallback,
            isbn::FallbackStored,
            // Import
            isbn::ImportRequest,
            crate::services::ImportedBook,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "isbn", description = "ISBN validation, lookup and resilience administration")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
