//! Pricevault
//!
//! Price resolution and caching engine for crypto tax reporting. Resolves
//! the value of an asset at a point in time, expressed in a reference
//! currency, by combining per-venue price caches, venue-specific trade
//! fetchers, and multi-hop conversion paths across a topology of tradable
//! pairs.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{PriceError, PriceResult};

/// Initialize tracing for an embedding process that has no subscriber yet.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pricevault={log_level},sqlx=warn").into()),
        )
        .try_init();
}

use database::VenuePools;
use repositories::PriceRepository;
use services::{
    BatchPreloader, BinanceFetcher, KrakenFetcher, PairTopology, PathResolver, PriceService,
    VenueRegistry,
};
use std::sync::Arc;

/// Engine state wiring the store, venue registry, and services together.
pub struct PriceEngine {
    pub prices: Arc<PriceService>,
    pub preloader: BatchPreloader,
    pub repo: Arc<PriceRepository>,
}

impl PriceEngine {
    /// Create a new PriceEngine with the default venue set
    pub fn new(config: &AppConfig, topology: Arc<dyn PairTopology>) -> Self {
        let pools = Arc::new(VenuePools::new(&config.store));
        let repo = Arc::new(PriceRepository::new(pools));

        let mut registry = VenueRegistry::new();
        registry.register(Arc::new(BinanceFetcher::new(
            config.rate_limit(),
            config.http_timeout(),
        )));
        registry.register(Arc::new(KrakenFetcher::new(
            config.rate_limit(),
            config.http_timeout(),
        )));
        let registry = Arc::new(registry);

        let prices = Arc::new(PriceService::new(
            repo.clone(),
            registry.clone(),
            config.reference_currency.clone(),
        ));
        let resolver = PathResolver::new(topology);
        let preloader = BatchPreloader::new(
            repo.clone(),
            registry,
            resolver,
            config.reference_currency.clone(),
        );

        Self {
            prices,
            preloader,
            repo,
        }
    }
}
