//! Kraken fetcher: nearest-trade search against the public trade history.
//!
//! The data point closest to the requested timestamp, but not newer than
//! it, is selected. One page of history is fetched starting `step` minutes
//! before the timestamp; if the page does not bracket the target the
//! offset is widened (up to a 120-minute ceiling), and if the page ends
//! before the target the scan restarts with a finer step, down to 1 minute.
//!
//! API documentation: https://www.kraken.com/features/api

use super::VenueFetcher;
use crate::error::{PriceError, PriceResult};
use crate::models::{AssetPair, Candle};
use crate::services::PriceService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const VENUE: &str = "kraken";
const API_ROOT: &str = "https://api.kraken.com/0/public";
/// Offset scan ceiling; no usable rate within this window means price 0.
const MAX_OFFSET_MIN: i64 = 120;
const INITIAL_STEP_MIN: i64 = 10;
const PAGE_RETRIES: u32 = 10;

/// Kraken's native pair names predate the canonical base+quote
/// concatenation; the common ones are aliased here.
pub(crate) fn native_pair(symbol: &str) -> &str {
    match symbol {
        "BTCEUR" => "XXBTZEUR",
        "BTCUSD" => "XXBTZUSD",
        "ETHEUR" => "XETHZEUR",
        "ETHUSD" => "XETHZUSD",
        "ETHBTC" => "XETHXXBT",
        "LTCEUR" => "XLTCZEUR",
        "LTCBTC" => "XLTCXXBT",
        "XRPEUR" => "XXRPZEUR",
        "XRPBTC" => "XXRPXXBT",
        "XLMEUR" => "XXLMZEUR",
        "XMREUR" => "XXMRZEUR",
        "ZECEUR" => "XZECZEUR",
        other => other,
    }
}

/// Where the target timestamp falls relative to a page of trades.
#[derive(Debug, PartialEq, Eq)]
pub enum TradeMatch {
    /// Every trade in the page is after the target; look further back.
    TooRecent,
    /// The target is at or past the newest trade; the page may have ended
    /// before reaching it.
    Overshot,
    /// Index of the most recent trade at or before the target.
    At(usize),
}

/// Binary-search a page of ascending trade timestamps for the most recent
/// entry at or before `target_ms`.
pub fn closest_at_or_before(timestamps_ms: &[i64], target_ms: i64) -> TradeMatch {
    let insertion = timestamps_ms.partition_point(|&ts| ts < target_ms);
    match insertion.checked_sub(1) {
        None => TradeMatch::TooRecent,
        Some(idx) if idx + 1 == timestamps_ms.len() => TradeMatch::Overshot,
        Some(idx) => TradeMatch::At(idx),
    }
}

pub struct KrakenFetcher {
    client: Client,
    root: String,
    rate_limit: Duration,
    http_timeout: Duration,
}

impl KrakenFetcher {
    pub fn new(rate_limit: Duration, http_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            root: API_ROOT.to_string(),
            rate_limit,
            http_timeout,
        }
    }

    /// Fetch one page of the trade history starting at `since_ns`.
    ///
    /// Venue-side error envelopes are retried with exponential backoff;
    /// exhausting the retries is a hard failure, because it means the
    /// service is unreachable rather than merely lacking data.
    async fn trade_page(&self, pair: &str, since_ns: i64) -> PriceResult<Vec<(i64, Decimal)>> {
        let url = format!("{}/Trades", self.root);
        let since = since_ns.to_string();

        for attempt in 1..=PAGE_RETRIES {
            tokio::time::sleep(self.rate_limit).await;
            debug!("Querying kraken trades for {pair} (since={since})");

            let response = self
                .client
                .get(&url)
                .query(&[("pair", pair), ("since", since.as_str())])
                .timeout(self.http_timeout)
                .send()
                .await?;
            let body: Value = response.error_for_status()?.json().await?;

            let errors = venue_errors(&body);
            if errors.is_empty() {
                return parse_trade_rows(&body, pair);
            }

            let sleep_s = 2u64.pow(attempt);
            warn!(
                "Could not retrieve kraken trades for {pair}: {errors:?}. \
                 Retry in {sleep_s} s ..."
            );
            tokio::time::sleep(Duration::from_secs(sleep_s)).await;
        }

        Err(PriceError::VenueUnavailable {
            venue: VENUE.to_string(),
            detail: format!("trade query for {pair} kept failing after {PAGE_RETRIES} retries"),
        })
    }
}

#[async_trait]
impl VenueFetcher for KrakenFetcher {
    fn venue(&self) -> &str {
        VENUE
    }

    async fn fetch_price(
        &self,
        _prices: &PriceService,
        pair: &AssetPair,
        utc_time: DateTime<Utc>,
    ) -> PriceResult<Decimal> {
        let target_ms = utc_time.timestamp_millis();
        let native = native_pair(&pair.symbol()).to_string();

        let mut step = INITIAL_STEP_MIN;
        'steps: while step >= 1 {
            let mut offset = 0;
            while offset < MAX_OFFSET_MIN {
                offset += step;
                let since_ns = (target_ms - offset * 60_000) * 1_000_000;
                let trades = self.trade_page(&native, since_ns).await?;
                let timestamps: Vec<i64> = trades.iter().map(|&(ts, _)| ts).collect();

                match closest_at_or_before(&timestamps, target_ms) {
                    // The whole page is newer than the target; widen the offset.
                    TradeMatch::TooRecent => continue,
                    TradeMatch::Overshot if step > 1 => {
                        // The initial offset skipped past the target; rescan
                        // with a finer step.
                        debug!("Querying trades for {native} at {utc_time}: reducing step");
                        step -= 1;
                        continue 'steps;
                    }
                    TradeMatch::Overshot => break 'steps,
                    TradeMatch::At(idx) => return Ok(trades[idx].1),
                }
            }
            break;
        }

        warn!(
            "Querying trades for {native} at {utc_time}: \
             failed to find a matching exchange rate"
        );
        Ok(Decimal::ZERO)
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        start_ms: i64,
        limit: u32,
    ) -> PriceResult<Vec<Candle>> {
        let native = native_pair(symbol);
        tokio::time::sleep(self.rate_limit).await;

        let url = format!("{}/OHLC", self.root);
        let since = (start_ms / 1000).to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("pair", native), ("interval", "1"), ("since", since.as_str())])
            .timeout(self.http_timeout)
            .send()
            .await?;
        let body: Value = response.error_for_status()?.json().await?;

        let errors = venue_errors(&body);
        if !errors.is_empty() {
            if errors.iter().any(|e| e.contains("Unknown asset pair")) {
                return Err(PriceError::UnknownSymbol {
                    venue: VENUE.to_string(),
                    symbol: symbol.to_string(),
                });
            }
            return Err(PriceError::VenueRejected {
                venue: VENUE.to_string(),
                detail: errors.join(", "),
            });
        }

        parse_ohlc_rows(&body, native, limit)
    }
}

fn venue_errors(body: &Value) -> Vec<String> {
    body.get("error")
        .and_then(Value::as_array)
        .map(|errs| {
            errs.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Extract (timestamp_ms, price) trade tuples, ascending by time.
///
/// Trade timestamps arrive as float seconds and are converted to integer
/// milliseconds for the binary search.
fn parse_trade_rows(body: &Value, pair: &str) -> PriceResult<Vec<(i64, Decimal)>> {
    let rows = body
        .pointer(&format!("/result/{pair}"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PriceError::MalformedResponse(format!("kraken result has no entry for {pair}"))
        })?;

    let mut trades = Vec::with_capacity(rows.len());
    for row in rows {
        let fields = row.as_array().ok_or_else(|| {
            PriceError::MalformedResponse("kraken trade row is not an array".to_string())
        })?;
        let price_raw = fields.first().and_then(Value::as_str).ok_or_else(|| {
            PriceError::MalformedResponse("kraken trade price is not a string".to_string())
        })?;
        let time_s = fields.get(2).and_then(Value::as_f64).ok_or_else(|| {
            PriceError::MalformedResponse("kraken trade time is not a number".to_string())
        })?;
        trades.push(((time_s * 1000.0) as i64, Decimal::from_str(price_raw)?));
    }
    Ok(trades)
}

fn parse_ohlc_rows(body: &Value, pair: &str, limit: u32) -> PriceResult<Vec<Candle>> {
    let rows = body
        .pointer(&format!("/result/{pair}"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PriceError::MalformedResponse(format!("kraken result has no entry for {pair}"))
        })?;

    let mut candles = Vec::with_capacity(rows.len().min(limit as usize));
    for row in rows.iter().take(limit as usize) {
        let fields = row.as_array().ok_or_else(|| {
            PriceError::MalformedResponse("kraken OHLC row is not an array".to_string())
        })?;
        let time_s = fields
            .first()
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .ok_or_else(|| {
                PriceError::MalformedResponse("kraken OHLC time is not a number".to_string())
            })?;
        candles.push(Candle {
            open_time_ms: time_s * 1000,
            open: decimal_index_field(fields, 1)?,
            high: decimal_index_field(fields, 2)?,
            low: decimal_index_field(fields, 3)?,
            close: decimal_index_field(fields, 4)?,
            volume: decimal_index_field(fields, 6)?,
        });
    }
    Ok(candles)
}

fn decimal_index_field(fields: &[Value], idx: usize) -> PriceResult<Decimal> {
    let raw = fields.get(idx).and_then(Value::as_str).ok_or_else(|| {
        PriceError::MalformedResponse(format!("kraken OHLC field {idx} is not a string"))
    })?;
    Ok(Decimal::from_str(raw)?)
}
