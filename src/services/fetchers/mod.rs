//! Venue fetchers
//!
//! One implementation of [`VenueFetcher`] per supported venue, registered
//! in a [`VenueRegistry`] at startup. Unknown venue identifiers fail fast
//! at lookup time.

pub mod binance;
pub mod kraken;

pub use binance::{volume_weighted_average, BinanceFetcher};
pub use kraken::{closest_at_or_before, KrakenFetcher, TradeMatch};

use crate::error::PriceResult;
use crate::models::{AssetPair, Candle};
use crate::services::PriceService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability interface implemented once per supported venue.
#[async_trait]
pub trait VenueFetcher: Send + Sync {
    /// Venue identifier used for registry lookup and cache selection
    fn venue(&self) -> &str;

    /// Resolve the price of `pair` at `utc_time` from live venue data.
    ///
    /// `prices` is the cache-aware resolution entry point; fetchers that
    /// chain through a bridge asset recurse through it so intermediate
    /// hops land in the cache too.
    async fn fetch_price(
        &self,
        prices: &PriceService,
        pair: &AssetPair,
        utc_time: DateTime<Utc>,
    ) -> PriceResult<Decimal>;

    /// Fetch up to `limit` 1-minute candles for `symbol` starting at `start_ms`
    async fn fetch_candles(
        &self,
        symbol: &str,
        start_ms: i64,
        limit: u32,
    ) -> PriceResult<Vec<Candle>>;
}

/// Explicit registry mapping a venue identifier to its fetcher.
#[derive(Default)]
pub struct VenueRegistry {
    fetchers: HashMap<String, Arc<dyn VenueFetcher>>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self {
            fetchers: HashMap::new(),
        }
    }

    /// Register a fetcher under its own venue identifier
    pub fn register(&mut self, fetcher: Arc<dyn VenueFetcher>) {
        self.fetchers.insert(fetcher.venue().to_string(), fetcher);
    }

    /// Look up the fetcher for a venue
    pub fn get(&self, venue: &str) -> Option<Arc<dyn VenueFetcher>> {
        self.fetchers.get(venue).cloned()
    }

    /// Registered venue identifiers
    pub fn venues(&self) -> impl Iterator<Item = &str> {
        self.fetchers.keys().map(String::as_str)
    }
}
