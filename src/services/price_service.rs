//! Orchestrator: the single price/cost entry point for external callers.
//!
//! Resolution is cache-first: a hit never touches the network, a miss is
//! dispatched to the requesting venue's fetcher and the result is written
//! back through the cache before it is returned.

use crate::error::{PriceError, PriceResult};
use crate::models::{AssetPair, CostQuery};
use crate::repositories::PriceRepository;
use crate::services::fetchers::VenueRegistry;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct PriceService {
    repo: Arc<PriceRepository>,
    registry: Arc<VenueRegistry>,
    reference_currency: String,
}

impl PriceService {
    pub fn new(
        repo: Arc<PriceRepository>,
        registry: Arc<VenueRegistry>,
        reference_currency: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            registry,
            reference_currency: reference_currency.into(),
        }
    }

    /// Currency code prices are expressed in by default
    pub fn reference_currency(&self) -> &str {
        &self.reference_currency
    }

    /// Price of `base` in `reference` on `venue` at `utc_time`.
    ///
    /// Identity conversions are 1 without a lookup. Anything else is
    /// answered from the cache when possible; a miss is fetched from the
    /// venue and cached for future access.
    pub async fn get_price(
        &self,
        venue: &str,
        base: &str,
        utc_time: DateTime<Utc>,
        reference: &str,
    ) -> PriceResult<Decimal> {
        if base == reference {
            return Ok(Decimal::ONE);
        }

        let pair = AssetPair::new(base, reference);
        if let Some(price) = self.repo.get(venue, &pair, utc_time).await? {
            return Ok(price);
        }

        let fetcher = self
            .registry
            .get(venue)
            .ok_or_else(|| PriceError::UnknownVenue(venue.to_string()))?;
        let price = fetcher.fetch_price(self, &pair, utc_time).await?;
        self.repo.put(venue, &pair, utc_time, price).await?;
        Ok(price)
    }

    /// Price of `base` in the configured reference currency
    pub async fn get_reference_price(
        &self,
        venue: &str,
        base: &str,
        utc_time: DateTime<Utc>,
    ) -> PriceResult<Decimal> {
        self.get_price(venue, base, utc_time, &self.reference_currency)
            .await
    }

    /// Monetary cost of a priced operation (or the sold part of one) in
    /// `reference`: unit price times the queried quantity.
    pub async fn get_cost(&self, query: CostQuery<'_>, reference: &str) -> PriceResult<Decimal> {
        let op = query.operation();
        let price = self
            .get_price(&op.venue, &op.asset, op.utc_time, reference)
            .await?;
        Ok(price * query.amount())
    }
}
