//! API handlers for the ISBN resolver REST endpoints

pub mod health;
pub mod isbn;
pub mod openapi;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::AdminClaims, AppState};

/// Success envelope: `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// `Json` body extractor whose rejections use the error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Query` extractor whose rejections use the error envelope
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Extractor for an administrator authenticated by JWT bearer token
pub struct AdminUser(pub AdminClaims);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AppError::Authentication("Missing or malformed bearer token".to_string())
                })?;

        let claims = AdminClaims::from_token(bearer.token(), &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;
        claims.require_admin()?;

        Ok(AdminUser(claims))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Lookup
        .route("/isbn/lookup", get(isbn::lookup_by_query).post(isbn::batch_lookup))
        .route("/isbn/lookup/:isbn", get(isbn::lookup_by_path))
        .route("/isbn/search", get(isbn::search))
        // Normalizer
        .route("/isbn/validate/:isbn", get(isbn::validate))
        .route("/isbn/format", get(isbn::format))
        // Resilience
        .route("/isbn/health", get(isbn::providers_health))
        .route("/isbn/stats", get(isbn::stats))
        .route("/isbn/cache", get(isbn::cache_stats).delete(isbn::clear_cache))
        .route("/isbn/resilience", delete(isbn::reset_circuits))
        // Fallback registry
        .route("/isbn/fallback", get(isbn::list_fallbacks).post(isbn::add_fallback))
        .route("/isbn/fallback/:isbn", delete(isbn::remove_fallback))
        // Catalog import
        .route("/isbn/import", post(isbn::import_book))
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
