//! ISBN resolution service
//!
//! Validates and normalizes ISBNs, then resolves them through the local
//! catalog, external metadata providers guarded by a cache, circuit
//! breakers and retries, and finally an operator-curated fallback registry.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod isbn;
pub mod models;
pub mod providers;
pub mod repository;
pub mod resilience;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
