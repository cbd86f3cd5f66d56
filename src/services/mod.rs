//! Business logic services

pub mod fallback;
pub mod lookup;
pub mod resolver;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::AppResult,
    providers::{self, ArcProvider},
    repository::{ArcCatalogStore, ArcFallbackStore, Repository},
    resilience::{ArcClock, SystemClock},
};

pub use fallback::FallbackRegistry;
pub use lookup::{BatchItem, ImportedBook, LookupService};
pub use resolver::{ProviderHealth, ResilienceStats, ResolverService, ResolverSettings};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub resolver: Arc<ResolverService>,
    pub fallbacks: FallbackRegistry,
    pub lookup: LookupService,
}

impl Services {
    /// Wire services from explicit stores and providers
    pub fn new(
        catalog: ArcCatalogStore,
        fallback_store: ArcFallbackStore,
        providers: Vec<ArcProvider>,
        config: &AppConfig,
        clock: ArcClock,
    ) -> Self {
        let resolver = Arc::new(ResolverService::new(
            providers,
            ResolverSettings::from_config(config),
            clock,
        ));
        let fallbacks = FallbackRegistry::new(fallback_store);
        let lookup = LookupService::new(
            catalog,
            resolver.clone(),
            fallbacks.clone(),
            config.resolver.batch_max_size,
            config.resolver.batch_concurrency,
        );

        Self {
            resolver,
            fallbacks,
            lookup,
        }
    }

    /// Create all services backed by the database and the configured providers
    pub fn from_repository(repository: Repository, config: &AppConfig) -> AppResult<Self> {
        let providers =
            providers::from_config(&config.providers, config.resolver.request_timeout())?;
        tracing::info!(
            "External providers: {:?}",
            providers.iter().map(|p| p.name().to_string()).collect::<Vec<_>>()
        );

        Ok(Self::new(
            Arc::new(repository.books),
            Arc::new(repository.fallbacks),
            providers,
            config,
            Arc::new(SystemClock),
        ))
    }
}
