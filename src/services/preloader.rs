//! Batch preloader: resolve many timestamps with few remote calls.
//!
//! Operation timestamps are grouped into bounded time batches; one candle
//! series per path hop covers a whole batch, and each requested timestamp
//! takes the candle closest to it. Resolved prices are written through the
//! price cache, so the per-operation lookups that follow never hit the
//! network.

use crate::error::{PriceError, PriceResult};
use crate::models::{AssetPair, Candle, Operation};
use crate::repositories::PriceRepository;
use crate::services::fetchers::VenueRegistry;
use crate::services::path_resolver::{PathResolver, PricePath};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Widest candle window a supported venue tolerates, in minutes.
const MAX_BATCH_SPAN_MIN: i64 = 300;
/// Guard subtracted from the span so alignment drift cannot overflow it.
const BATCH_GUARD_MIN: i64 = 4;
/// Candle series starts this far before the batch.
const CANDLE_MARGIN_MS: i64 = 2 * 60_000;

pub struct BatchPreloader {
    repo: Arc<PriceRepository>,
    registry: Arc<VenueRegistry>,
    resolver: Mutex<PathResolver>,
    reference_currency: String,
}

impl BatchPreloader {
    pub fn new(
        repo: Arc<PriceRepository>,
        registry: Arc<VenueRegistry>,
        resolver: PathResolver,
        reference_currency: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            registry,
            resolver: Mutex::new(resolver),
            reference_currency: reference_currency.into(),
        }
    }

    /// Resolve and cache the reference price of `asset` for every operation,
    /// batching remote calls. Returns the number of prices written.
    pub async fn preload(&self, operations: &[Operation], asset: &str) -> PriceResult<usize> {
        if asset == self.reference_currency {
            return Ok(0);
        }
        let pair = AssetPair::new(asset, self.reference_currency.clone());

        // Only operations the cache cannot already answer are worth a
        // remote call; the rest are grouped per venue.
        let mut grouped: HashMap<&str, Vec<&Operation>> = HashMap::new();
        for op in operations {
            if self.repo.get(&op.venue, &pair, op.utc_time).await?.is_some() {
                continue;
            }
            grouped.entry(op.venue.as_str()).or_default().push(op);
        }

        let mut written = 0;
        for (venue, ops) in grouped {
            written += self.preload_venue(venue, &pair, ops).await?;
        }
        Ok(written)
    }

    async fn preload_venue(
        &self,
        venue: &str,
        pair: &AssetPair,
        ops: Vec<&Operation>,
    ) -> PriceResult<usize> {
        let mut timestamps: Vec<DateTime<Utc>> = ops.iter().map(|op| op.utc_time).collect();
        timestamps.sort();
        timestamps.dedup();

        let max_span = chrono::Duration::minutes(MAX_BATCH_SPAN_MIN - BATCH_GUARD_MIN);
        let mut written = 0;
        for batch in batch_timestamps(&timestamps, max_span) {
            if let Some((first, last)) = batch.first().zip(batch.last()) {
                info!("Getting candle data from {first} to {last} for {pair}");
            }
            for (ts, price) in self.resolve_batch(venue, pair, &batch).await? {
                self.repo.put(venue, pair, ts, price).await?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Resolve one batch through the first candidate path whose every hop
    /// yields a complete, aligned sample set.
    async fn resolve_batch(
        &self,
        venue: &str,
        pair: &AssetPair,
        batch: &[DateTime<Utc>],
    ) -> PriceResult<Vec<(DateTime<Utc>, Decimal)>> {
        let Some((first, last)) = batch.first().zip(batch.last()) else {
            return Ok(Vec::new());
        };
        let first_ms = first.timestamp_millis();
        let last_ms = last.timestamp_millis();

        let paths = {
            let resolver = self.resolver.lock().await;
            resolver.candidate_paths(&pair.base, &pair.quote, first_ms, last_ms, venue)
        };
        if paths.is_empty() {
            warn!("No conversion path from {} to {} is known", pair.base, pair.quote);
            return Ok(Vec::new());
        }

        for path in paths {
            let symbols: Vec<&str> = path.edges.iter().map(|e| e.symbol.as_str()).collect();
            debug!("Found path over {}", symbols.join(" -> "));

            if let Some(resolved) = self.try_path(&path, batch, first_ms, last_ms).await? {
                return Ok(resolved);
            }
            // Do not try already-failed edges first again.
            self.resolver.lock().await.penalize(&path);
            debug!("Path failed, trying next");
        }

        warn!(
            "Every conversion path from {} to {} failed for this window",
            pair.base, pair.quote
        );
        Ok(Vec::new())
    }

    async fn try_path(
        &self,
        path: &PricePath,
        batch: &[DateTime<Utc>],
        first_ms: i64,
        last_ms: i64,
    ) -> PriceResult<Option<Vec<(DateTime<Utc>, Decimal)>>> {
        let since = first_ms - CANDLE_MARGIN_MS;
        let span_min = (last_ms - first_ms + 59_999) / 60_000;
        let limit = (span_min + 2) as u32;

        let mut combined: Vec<(DateTime<Utc>, Decimal)> = Vec::new();
        for edge in &path.edges {
            let fetcher = self
                .registry
                .get(&edge.venue)
                .ok_or_else(|| PriceError::UnknownVenue(edge.venue.clone()))?;
            let candles = match fetcher.fetch_candles(&edge.symbol, since, limit).await {
                Ok(candles) => candles,
                // A symbol the venue does not know is "no data" for this
                // path, not a failure of the whole preload.
                Err(e) if e.is_unknown_symbol() => return Ok(None),
                Err(e) => return Err(e),
            };
            if candles.is_empty() {
                return Ok(None);
            }

            let mut hop_prices: Vec<(DateTime<Utc>, Decimal)> = Vec::with_capacity(batch.len());
            for &ts in batch {
                let Some(candle) = nearest_candle(&candles, ts.timestamp_millis()) else {
                    return Ok(None);
                };
                let mut price = candle.midpoint();
                if edge.inverted {
                    if price.is_zero() {
                        return Ok(None);
                    }
                    price = Decimal::ONE / price;
                }
                hop_prices.push((ts, price));
            }

            combined = if combined.is_empty() {
                hop_prices
            } else {
                // Hops must resolve the same timestamps; anything else
                // means a temporal gap on one of them.
                if combined.len() != hop_prices.len() {
                    return Ok(None);
                }
                combined
                    .iter()
                    .zip(hop_prices.iter())
                    .map(|(&(ts, a), &(_, b))| (ts, a * b))
                    .collect()
            };
        }

        if combined.is_empty() {
            return Ok(None);
        }
        Ok(Some(combined))
    }
}

/// Split chronologically sorted timestamps into runs no longer than `max_span`.
pub fn batch_timestamps(
    timestamps: &[DateTime<Utc>],
    max_span: chrono::Duration,
) -> Vec<Vec<DateTime<Utc>>> {
    let mut batches: Vec<Vec<DateTime<Utc>>> = Vec::new();
    let mut current_first: Option<DateTime<Utc>> = None;
    for &ts in timestamps {
        if let (Some(first), Some(batch)) = (current_first, batches.last_mut()) {
            if ts < first + max_span {
                batch.push(ts);
                continue;
            }
        }
        current_first = Some(ts);
        batches.push(vec![ts]);
    }
    batches
}

/// The candle whose open time is numerically closest to `target_ms`;
/// ties go to the first closest found.
pub fn nearest_candle(candles: &[Candle], target_ms: i64) -> Option<&Candle> {
    candles.iter().min_by_key(|c| (c.open_time_ms - target_ms).abs())
}
