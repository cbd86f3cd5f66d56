//! Resilient external resolution.
//!
//! Every lookup goes cache → circuit check → retry-wrapped provider call →
//! cache store. Providers are asked in configured order and the first hit
//! wins. A negative answer is cached only when every provider said the ISBN
//! does not exist.

use futures::future::join_all;
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    isbn::Isbn,
    models::{BookMetadata, BookSource, FailureKind, ProviderFailure, Resolution},
    providers::{ArcProvider, ProviderError},
    resilience::{
        ArcClock, CacheStats, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
        RetryPolicy, Retryable, TtlCache,
    },
};

/// Tunables for the resolver, usually built from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub retry: RetryPolicy,
    pub circuit: CircuitBreakerConfig,
    pub cache_ttl: Duration,
    pub negative_cache_ttl: Duration,
    pub cache_max_entries: usize,
}

impl ResolverSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            retry: RetryPolicy::from(&config.retry),
            circuit: CircuitBreakerConfig::from(&config.circuit_breaker),
            cache_ttl: config.resolver.cache_ttl(),
            negative_cache_ttl: config.resolver.negative_cache_ttl(),
            cache_max_entries: config.resolver.cache_max_entries,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone)]
enum CachedLookup {
    Found(BookMetadata),
    NotFound,
}

struct ProviderSlot {
    provider: ArcProvider,
    breaker: CircuitBreaker,
}

/// Frees a half-open trial slot if the call is dropped before an outcome is recorded
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> Admission<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn success(mut self) {
        self.breaker.record_success();
        self.settled = true;
    }

    fn failure(mut self) {
        self.breaker.record_failure();
        self.settled = true;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release();
        }
    }
}

fn failure_kind(error: &ProviderError) -> FailureKind {
    if error.is_transient() {
        FailureKind::Transient
    } else {
        FailureKind::Rejected
    }
}

/// Read-only resilience snapshot
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceStats {
    pub cache_hit_rate: f64,
    pub cache: CacheStats,
    pub circuits: Vec<CircuitSnapshot>,
    /// Provider calls actually attempted (retries count once)
    pub total_calls: u64,
    /// Calls that failed transiently after retries
    pub failure_count: u64,
    /// Calls refused by an open circuit
    pub short_circuited: u64,
}

/// Reachability of one provider
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider: String,
    pub reachable: bool,
    pub latency_ms: u64,
    pub circuit: CircuitState,
    pub error: Option<String>,
}

pub struct ResolverService {
    slots: Vec<ProviderSlot>,
    cache: TtlCache<CachedLookup>,
    retry: RetryPolicy,
    cache_ttl: Duration,
    negative_cache_ttl: Duration,
    total_calls: AtomicU64,
    failure_count: AtomicU64,
    short_circuited: AtomicU64,
}

impl ResolverService {
    pub fn new(providers: Vec<ArcProvider>, settings: ResolverSettings, clock: ArcClock) -> Self {
        let slots = providers
            .into_iter()
            .map(|provider| ProviderSlot {
                breaker: CircuitBreaker::new(
                    provider.name(),
                    settings.circuit.clone(),
                    clock.clone(),
                ),
                provider,
            })
            .collect();

        Self {
            slots,
            cache: TtlCache::new(settings.cache_max_entries, clock),
            retry: settings.retry,
            cache_ttl: settings.cache_ttl,
            negative_cache_ttl: settings.negative_cache_ttl,
            total_calls: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            short_circuited: AtomicU64::new(0),
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| slot.provider.name().to_string())
            .collect()
    }

    /// Resolve a normalized ISBN through the external providers
    pub async fn resolve(&self, isbn: &Isbn) -> Resolution {
        if let Some(cached) = self.cache.get(isbn.as_str()) {
            tracing::debug!(isbn = %isbn, "Resolver cache hit");
            return match cached {
                CachedLookup::Found(book) => Resolution::Found(book),
                CachedLookup::NotFound => Resolution::NotFound,
            };
        }

        let mut failures = Vec::new();

        for slot in &self.slots {
            let name = slot.provider.name();

            if let Err(open) = slot.breaker.acquire() {
                self.short_circuited.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(provider = name, isbn = %isbn, "Circuit open, skipping provider");
                failures.push(ProviderFailure {
                    provider: name.to_string(),
                    kind: FailureKind::CircuitOpen,
                    message: format!("Circuit open for provider {}", name),
                    retry_after_secs: open.retry_in.map(|d| d.as_secs_f64().ceil() as u64),
                });
                continue;
            }

            let admission = Admission::new(&slot.breaker);
            self.total_calls.fetch_add(1, Ordering::Relaxed);

            match self.retry.run(|| slot.provider.lookup(isbn)).await {
                Ok(Some(mut book)) => {
                    admission.success();
                    book.source = BookSource::External(name.to_string());
                    book.isbn = Some(isbn.to_string());
                    self.cache
                        .insert(isbn.as_str(), CachedLookup::Found(book.clone()), self.cache_ttl);
                    tracing::info!(provider = name, isbn = %isbn, "Resolved ISBN from provider");
                    return Resolution::Found(book);
                }
                Ok(None) => {
                    admission.success();
                    tracing::debug!(provider = name, isbn = %isbn, "Provider has no record");
                }
                Err(e) => {
                    let kind = failure_kind(&e);
                    if kind == FailureKind::Transient {
                        self.failure_count.fetch_add(1, Ordering::Relaxed);
                        admission.failure();
                    }
                    // Rejected responses drop the admission, which only frees a trial slot
                    tracing::warn!(
                        provider = name,
                        isbn = %isbn,
                        error = %e,
                        "Provider lookup failed"
                    );
                    failures.push(ProviderFailure {
                        provider: name.to_string(),
                        kind,
                        message: e.to_string(),
                        retry_after_secs: None,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Resolution::Unavailable(failures);
        }

        if !self.slots.is_empty() {
            self.cache
                .insert(isbn.as_str(), CachedLookup::NotFound, self.negative_cache_ttl);
        }
        tracing::info!(isbn = %isbn, "No provider knows this ISBN");
        Resolution::NotFound
    }

    /// Best-effort title search. Open circuits are skipped and errors are
    /// swallowed; nothing here touches the cache or breaker counters.
    pub async fn search_by_title(&self, query: &str, limit: usize) -> Vec<BookMetadata> {
        for slot in &self.slots {
            let name = slot.provider.name();
            if !slot.breaker.is_admitting() {
                tracing::debug!(provider = name, "Circuit open, skipping provider for search");
                continue;
            }

            match slot.provider.search_by_title(query, limit).await {
                Ok(books) if !books.is_empty() => {
                    tracing::debug!(provider = name, count = books.len(), "Title search hit");
                    return books;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(provider = name, error = %e, "Title search failed"),
            }
        }
        Vec::new()
    }

    /// Probe every provider concurrently. Circuit state is reported, not changed.
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let probes = self.slots.iter().map(|slot| async move {
            let started = Instant::now();
            let outcome = slot.provider.health_check().await;
            ProviderHealth {
                provider: slot.provider.name().to_string(),
                reachable: outcome.is_ok(),
                latency_ms: started.elapsed().as_millis() as u64,
                circuit: slot.breaker.state(),
                error: outcome.err().map(|e| e.to_string()),
            }
        });
        join_all(probes).await
    }

    pub fn stats(&self) -> ResilienceStats {
        let cache = self.cache.stats();
        ResilienceStats {
            cache_hit_rate: cache.hit_rate,
            cache,
            circuits: self.slots.iter().map(|slot| slot.breaker.snapshot()).collect(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            short_circuited: self.short_circuited.load(Ordering::Relaxed),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Force one or all circuits closed; returns the providers that were reset
    pub fn reset_circuit(&self, provider: Option<&str>) -> AppResult<Vec<String>> {
        let targets: Vec<&ProviderSlot> = match provider {
            Some(name) => {
                let slot = self
                    .slots
                    .iter()
                    .find(|slot| slot.provider.name() == name)
                    .ok_or_else(|| AppError::NotFound(format!("Unknown provider: {}", name)))?;
                vec![slot]
            }
            None => self.slots.iter().collect(),
        };

        Ok(targets
            .into_iter()
            .map(|slot| {
                slot.breaker.reset();
                slot.provider.name().to_string()
            })
            .collect())
    }

    /// Drop one cached ISBN or the whole cache; returns the number of removed entries
    pub fn clear_cache(&self, isbn: Option<&Isbn>) -> usize {
        let removed = match isbn {
            Some(isbn) => usize::from(self.cache.remove(isbn.as_str())),
            None => self.cache.clear(),
        };
        tracing::info!(removed, "Resolver cache cleared");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;
    use crate::resilience::ManualClock;
    use std::sync::Arc;

    const ISBN: &str = "9780134685991";

    fn isbn() -> Isbn {
        Isbn::parse(ISBN).unwrap()
    }

    fn settings(threshold: u32) -> ResolverSettings {
        ResolverSettings {
            retry: RetryPolicy {
                max_retries: 2,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                jitter: false,
            },
            circuit: CircuitBreakerConfig {
                failure_threshold: threshold,
                failure_window: Duration::from_secs(60),
                reset_timeout: Duration::from_secs(30),
            },
            cache_ttl: Duration::from_secs(3600),
            negative_cache_ttl: Duration::from_secs(60),
            cache_max_entries: 100,
        }
    }

    fn book(title: &str) -> BookMetadata {
        BookMetadata::new(title, BookSource::Local)
    }

    fn resolver(
        providers: Vec<Arc<MockProvider>>,
        threshold: u32,
    ) -> (ResolverService, ManualClock) {
        let clock = ManualClock::new();
        let providers = providers.into_iter().map(|p| p as ArcProvider).collect();
        let service = ResolverService::new(providers, settings(threshold), Arc::new(clock.clone()));
        (service, clock)
    }

    #[tokio::test]
    async fn test_second_resolve_is_served_from_cache() {
        let provider =
            Arc::new(MockProvider::new("openlibrary").with_book(ISBN, book("Effective Java")));
        let (service, _) = resolver(vec![provider.clone()], 5);

        let first = service.resolve(&isbn()).await;
        let second = service.resolve(&isbn()).await;

        assert_eq!(first, second);
        match first {
            Resolution::Found(book) => assert_eq!(book.source.as_str(), "openlibrary"),
            other => panic!("expected a hit, got {:?}", other),
        }
        assert_eq!(provider.lookup_count(), 1);
        assert_eq!(service.stats().cache.hits, 1);
    }

    #[tokio::test]
    async fn test_first_hit_wins_in_provider_order() {
        let first = Arc::new(MockProvider::new("openlibrary"));
        let second =
            Arc::new(MockProvider::new("googlebooks").with_book(ISBN, book("Effective Java")));
        let (service, _) = resolver(vec![first.clone(), second.clone()], 5);

        match service.resolve(&isbn()).await {
            Resolution::Found(book) => assert_eq!(book.source.as_str(), "googlebooks"),
            other => panic!("expected a hit, got {:?}", other),
        }
        assert_eq!(first.lookup_count(), 1);
        assert_eq!(second.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let provider =
            Arc::new(MockProvider::new("openlibrary").with_book(ISBN, book("Effective Java")));
        provider.push_failure(provider.unavailable());
        let (service, _) = resolver(vec![provider.clone()], 5);

        assert!(matches!(service.resolve(&isbn()).await, Resolution::Found(_)));
        assert_eq!(provider.lookup_count(), 2);
        assert_eq!(service.stats().failure_count, 0);
    }

    #[tokio::test]
    async fn test_circuit_opens_then_short_circuits_without_calls() {
        let provider = Arc::new(MockProvider::new("openlibrary"));
        provider.set_failure(Some(provider.unavailable()));
        let (service, _) = resolver(vec![provider.clone()], 2);

        for _ in 0..2 {
            match service.resolve(&isbn()).await {
                Resolution::Unavailable(failures) => {
                    assert_eq!(failures[0].kind, FailureKind::Transient)
                }
                other => panic!("expected unavailable, got {:?}", other),
            }
        }
        // 1 + max_retries attempts per call
        assert_eq!(provider.lookup_count(), 6);

        match service.resolve(&isbn()).await {
            Resolution::Unavailable(failures) => {
                assert_eq!(failures[0].kind, FailureKind::CircuitOpen);
                assert_eq!(failures[0].retry_after_secs, Some(30));
            }
            other => panic!("expected circuit open, got {:?}", other),
        }
        assert_eq!(provider.lookup_count(), 6);

        let stats = service.stats();
        assert_eq!(stats.short_circuited, 1);
        assert_eq!(stats.failure_count, 2);
        assert_eq!(stats.circuits[0].state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes_circuit() {
        let provider =
            Arc::new(MockProvider::new("openlibrary").with_book(ISBN, book("Effective Java")));
        provider.set_failure(Some(provider.unavailable()));
        let (service, clock) = resolver(vec![provider.clone()], 1);

        assert!(matches!(service.resolve(&isbn()).await, Resolution::Unavailable(_)));
        assert_eq!(service.stats().circuits[0].state, CircuitState::Open);

        provider.set_failure(None);
        clock.advance(Duration::from_secs(31));

        assert!(matches!(service.resolve(&isbn()).await, Resolution::Found(_)));
        assert_eq!(service.stats().circuits[0].state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_not_found_is_cached_and_not_counted_as_failure() {
        let provider = Arc::new(MockProvider::new("openlibrary"));
        let (service, clock) = resolver(vec![provider.clone()], 1);

        assert_eq!(service.resolve(&isbn()).await, Resolution::NotFound);
        assert_eq!(service.resolve(&isbn()).await, Resolution::NotFound);
        assert_eq!(provider.lookup_count(), 1);

        // Negative entries expire before positive ones would
        clock.advance(Duration::from_secs(61));
        assert_eq!(service.resolve(&isbn()).await, Resolution::NotFound);
        assert_eq!(provider.lookup_count(), 2);
        assert_eq!(service.stats().circuits[0].state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_retried_or_counted() {
        let provider = Arc::new(MockProvider::new("openlibrary"));
        provider.set_failure(Some(ProviderError::invalid("openlibrary", "no title")));
        let (service, _) = resolver(vec![provider.clone()], 1);

        for _ in 0..3 {
            match service.resolve(&isbn()).await {
                Resolution::Unavailable(failures) => {
                    assert_eq!(failures[0].kind, FailureKind::Rejected)
                }
                other => panic!("expected unavailable, got {:?}", other),
            }
        }
        assert_eq!(provider.lookup_count(), 3);
        assert_eq!(service.stats().circuits[0].state, CircuitState::Closed);
        assert_eq!(service.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_no_providers_is_not_found_without_caching() {
        let (service, _) = resolver(vec![], 5);
        assert_eq!(service.resolve(&isbn()).await, Resolution::NotFound);
        assert_eq!(service.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_reset_circuit_and_clear_cache() {
        let provider =
            Arc::new(MockProvider::new("openlibrary").with_book(ISBN, book("Effective Java")));
        provider.push_failure(provider.unavailable());
        provider.push_failure(provider.unavailable());
        provider.push_failure(provider.unavailable());
        let (service, _) = resolver(vec![provider.clone()], 1);

        assert!(matches!(service.resolve(&isbn()).await, Resolution::Unavailable(_)));
        assert!(matches!(
            service.reset_circuit(Some("nope")),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(service.reset_circuit(None).unwrap(), vec!["openlibrary".to_string()]);

        assert!(matches!(service.resolve(&isbn()).await, Resolution::Found(_)));
        assert_eq!(service.clear_cache(Some(&isbn())), 1);
        assert_eq!(service.clear_cache(None), 0);
    }

    #[tokio::test]
    async fn test_search_skips_open_circuits() {
        let broken = Arc::new(MockProvider::new("openlibrary"));
        broken.set_failure(Some(broken.unavailable()));
        let healthy =
            Arc::new(MockProvider::new("googlebooks").with_book(ISBN, book("Effective Java")));
        let (service, _) = resolver(vec![broken.clone(), healthy.clone()], 1);

        // Opens the first circuit; the second provider answers the lookup
        assert!(matches!(service.resolve(&isbn()).await, Resolution::Found(_)));

        let results = service.search_by_title("effective", 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(broken.search_count(), 0);
        assert_eq!(healthy.search_count(), 1);
    }
}
