//! Router-level tests against in-memory stores and scripted providers

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use isbn_resolver::{
    api,
    config::AppConfig,
    models::{AdminClaims, BookMetadata, BookSource},
    providers::{ArcProvider, MockProvider},
    repository::{MemoryCatalog, MemoryFallbacks},
    resilience::ManualClock,
    services::Services,
    AppState,
};

const SECRET: &str = "test-secret";
const EFFECTIVE_JAVA: &str = "9780134685991";
const REFACTORING: &str = "9780201485677";

struct TestApp {
    router: Router,
    provider: Arc<MockProvider>,
}

fn test_app(catalog: MemoryCatalog, provider: MockProvider) -> TestApp {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config.retry.max_retries = 0;
    config.retry.base_delay_ms = 0;
    config.circuit_breaker.failure_threshold = 1;

    let provider = Arc::new(provider);
    let services = Services::new(
        Arc::new(catalog),
        Arc::new(MemoryFallbacks::new()),
        vec![provider.clone() as ArcProvider],
        &config,
        Arc::new(ManualClock::new()),
    );
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    TestApp {
        router: api::create_router(state),
        provider,
    }
}

fn admin_token() -> String {
    let now = Utc::now().timestamp();
    AdminClaims {
        sub: "ops".to_string(),
        role: "admin".to_string(),
        exp: now + 3600,
        iat: now,
    }
    .create_token(SECRET)
    .unwrap()
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    dispatch(app, request).await
}

/// POST a raw, possibly malformed, JSON body
async fn post_raw(app: &TestApp, uri: &str, body: &'static str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    dispatch(app, request).await
}

async fn dispatch(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None, None).await
}

fn seeded_catalog() -> MemoryCatalog {
    MemoryCatalog::new().with_book(
        EFFECTIVE_JAVA,
        BookMetadata::new("Effective Java", BookSource::Local),
    )
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app(MemoryCatalog::new(), MockProvider::new("openlibrary"));
    let (status, body) = get(&app, "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["providers"], json!(["openlibrary"]));
}

#[tokio::test]
async fn test_local_lookup_normalizes_isbn10_without_outbound_calls() {
    let app = test_app(seeded_catalog(), MockProvider::new("openlibrary"));
    let (status, body) = get(&app, "/api/v1/isbn/lookup/0-13-468599-7").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["source"], "local");
    assert_eq!(body["data"]["book"]["title"], "Effective Java");
    assert_eq!(body["data"]["book"]["isbn"], EFFECTIVE_JAVA);
    assert_eq!(app.provider.lookup_count(), 0);
}

#[tokio::test]
async fn test_lookup_by_query_parameter() {
    let app = test_app(seeded_catalog(), MockProvider::new("openlibrary"));

    let (status, body) = get(&app, "/api/v1/isbn/lookup?isbn=9780134685991").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source"], "local");

    let (status, body) = get(&app, "/api/v1/isbn/lookup").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
}

#[tokio::test]
async fn test_invalid_isbn_is_bad_request() {
    let app = test_app(MemoryCatalog::new(), MockProvider::new("openlibrary"));
    let (status, body) = get(&app, "/api/v1/isbn/lookup/1234567890123").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "InvalidIsbn");
    assert_eq!(body["message"], "Invalid ISBN: checksum mismatch");
    assert_eq!(app.provider.lookup_count(), 0);
}

#[tokio::test]
async fn test_external_hit_and_not_found() {
    let provider = MockProvider::new("openlibrary")
        .with_book(REFACTORING, BookMetadata::new("Refactoring", BookSource::Local));
    let app = test_app(MemoryCatalog::new(), provider);

    let (status, body) = get(&app, "/api/v1/isbn/lookup/0201485672").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source"], "openlibrary");

    let (status, body) = get(&app, "/api/v1/isbn/lookup/9780000000002").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
    assert_eq!(body["details"]["reason"], "notFound");
}

#[tokio::test]
async fn test_provider_outage_then_open_circuit_are_distinguishable() {
    let app = test_app(MemoryCatalog::new(), MockProvider::new("openlibrary"));
    app.provider.set_failure(Some(app.provider.unavailable()));

    let (status, body) = get(&app, "/api/v1/isbn/lookup/9780134685991").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "ServiceUnavailable");
    assert_eq!(body["details"]["reason"], "providerUnavailable");
    assert_eq!(body["details"]["failures"][0]["kind"], "transient");

    let (status, body) = get(&app, "/api/v1/isbn/lookup/9780134685991").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["details"]["reason"], "circuitOpen");
    assert_eq!(app.provider.lookup_count(), 1);

    let (_, stats) = get(&app, "/api/v1/isbn/stats").await;
    assert_eq!(stats["data"]["shortCircuited"], 1);
    assert_eq!(stats["data"]["circuits"][0]["state"], "open");
}

#[tokio::test]
async fn test_batch_lookup_reports_per_item() {
    let app = test_app(seeded_catalog(), MockProvider::new("openlibrary"));
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/isbn/lookup",
        Some(json!({"isbns": [EFFECTIVE_JAVA, "not-an-isbn"]})),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["success"], true);
    assert_eq!(items[0]["data"]["source"], "local");
    assert_eq!(items[1]["success"], false);
    assert_eq!(items[1]["isbn"], "not-an-isbn");
    assert_eq!(items[1]["error"], "InvalidIsbn");
}

#[tokio::test]
async fn test_batch_lookup_rejects_empty_list() {
    let app = test_app(MemoryCatalog::new(), MockProvider::new("openlibrary"));
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/isbn/lookup",
        Some(json!({"isbns": []})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_validate_and_format() {
    let app = test_app(MemoryCatalog::new(), MockProvider::new("openlibrary"));

    let (status, body) = get(&app, "/api/v1/isbn/validate/0-13-468599-7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isValid"], true);
    assert_eq!(body["data"]["normalizedIsbn"], EFFECTIVE_JAVA);

    let (_, body) = get(&app, "/api/v1/isbn/validate/1234567890123").await;
    assert_eq!(body["data"]["isValid"], false);
    assert_eq!(body["data"]["error"], "Invalid ISBN: checksum mismatch");

    let (status, body) = get(&app, "/api/v1/isbn/format?isbn=9780134685991").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["formatted"], "978-0-13-468599-1");
    assert_eq!(body["data"]["isbn10"], "0134685997");

    let (status, _) = get(&app, "/api/v1/isbn/format?isbn=123").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_requests_use_error_envelope() {
    let app = test_app(seeded_catalog(), MockProvider::new("openlibrary"));

    let (status, body) = get(&app, "/api/v1/isbn/format").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "ValidationError");

    let (status, body) = post_raw(&app, "/api/v1/isbn/lookup", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "ValidationError");
    assert!(body["message"].as_str().is_some());

    let (status, body) = post_raw(&app, "/api/v1/isbn/lookup", r#"{"isbn": "x"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationError");
}

#[tokio::test]
async fn test_search_ignores_unparsable_limit() {
    let app = test_app(
        MemoryCatalog::new(),
        MockProvider::new("openlibrary")
            .with_book(EFFECTIVE_JAVA, BookMetadata::new("Effective Java", BookSource::Local)),
    );

    let (status, body) = get(&app, "/api/v1/isbn/search?q=java&limit=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_search_is_best_effort() {
    let provider = MockProvider::new("openlibrary")
        .with_book(REFACTORING, BookMetadata::new("Refactoring", BookSource::Local));
    let app = test_app(MemoryCatalog::new(), provider);

    let (status, body) = get(&app, "/api/v1/isbn/search?q=refact&limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["title"], "Refactoring");

    app.provider.set_failure(Some(app.provider.unavailable()));
    let (status, body) = get(&app, "/api/v1/isbn/search?q=refact").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_fallback_requires_admin_and_is_used_after_misses() {
    let app = test_app(MemoryCatalog::new(), MockProvider::new("openlibrary"));
    let request = json!({
        "isbn": "978-0-00-000000-2",
        "metadata": {
            "title": "Parish Records",
            "authors": [{"name": "Jane", "surname": "Doe"}],
            "categories": ["History"]
        }
    });

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/isbn/fallback",
        Some(request.clone()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AuthenticationError");

    let token = admin_token();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/isbn/fallback",
        Some(request.clone()),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["replaced"], false);
    assert_eq!(body["data"]["entry"]["isbn"], "9780000000002");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/isbn/fallback",
        Some(request),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["replaced"], true);

    let (status, body) = get(&app, "/api/v1/isbn/lookup/9780000000002").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source"], "fallback");
    assert_eq!(body["data"]["book"]["title"], "Parish Records");

    let (_, body) = get(&app, "/api/v1/isbn/fallback").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/v1/isbn/fallback/9780000000002",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/v1/isbn/fallback/9780000000002",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_admin_token_is_forbidden() {
    let app = test_app(MemoryCatalog::new(), MockProvider::new("openlibrary"));
    let now = Utc::now().timestamp();
    let token = AdminClaims {
        sub: "reader".to_string(),
        role: "reader".to_string(),
        exp: now + 3600,
        iat: now,
    }
    .create_token(SECRET)
    .unwrap();

    let (status, body) = send(&app, Method::DELETE, "/api/v1/isbn/cache", None, Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "AuthorizationError");
}

#[tokio::test]
async fn test_import_then_conflict() {
    let provider = MockProvider::new("openlibrary")
        .with_book(REFACTORING, BookMetadata::new("Refactoring", BookSource::Local));
    let app = test_app(MemoryCatalog::new(), provider);
    let token = admin_token();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/isbn/import",
        Some(json!({"isbn": REFACTORING})),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["importedFrom"], "openlibrary");
    assert_eq!(body["data"]["book"]["source"], "local");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/isbn/import",
        Some(json!({"isbn": REFACTORING})),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ConflictError");

    // Now served locally
    let (_, body) = get(&app, "/api/v1/isbn/lookup/9780201485677").await;
    assert_eq!(body["data"]["source"], "local");
}

#[tokio::test]
async fn test_cache_and_circuit_administration() {
    let provider = MockProvider::new("openlibrary")
        .with_book(REFACTORING, BookMetadata::new("Refactoring", BookSource::Local));
    let app = test_app(MemoryCatalog::new(), provider);
    let token = admin_token();

    get(&app, "/api/v1/isbn/lookup/9780201485677").await;
    get(&app, "/api/v1/isbn/lookup/9780201485677").await;
    assert_eq!(app.provider.lookup_count(), 1);

    let (status, body) = get(&app, "/api/v1/isbn/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hits"], 1);
    assert_eq!(body["data"]["entries"], 1);

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/v1/isbn/cache?isbn=bogus",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/v1/isbn/cache?isbn=0201485672",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], 1);

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/api/v1/isbn/resilience?provider=nope",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/v1/isbn/resilience",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reset"], json!(["openlibrary"]));
}

#[tokio::test]
async fn test_provider_health_summary() {
    let app = test_app(MemoryCatalog::new(), MockProvider::new("openlibrary"));

    let (status, body) = get(&app, "/api/v1/isbn/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["healthy"], true);
    assert_eq!(body["data"]["providers"][0]["circuit"], "closed");

    app.provider.set_failure(Some(app.provider.unavailable()));
    let (_, body) = get(&app, "/api/v1/isbn/health").await;
    assert_eq!(body["data"]["healthy"], false);
    assert_eq!(body["data"]["providers"][0]["reachable"], false);
}
