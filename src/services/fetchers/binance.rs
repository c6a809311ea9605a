//! Binance fetcher: average of all aggregate trades in a 1-minute window
//! centered on the requested timestamp.
//!
//! Pairs that do not trade directly (e.g. `TWTEUR`) are chained through
//! BTC: `TWTEUR = TWTBTC * BTCEUR`.
//!
//! API documentation:
//! https://github.com/binance/binance-spot-api-docs/blob/master/rest-api.md

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

const VENUE: &str = "binance";
const API_ROOT: &str = "https://api.binance.com/api/v3";
/// Venue error code for a pair that does not trade.
const INVALID_SYMBOL_CODE: i64 = -1121;
/// Hub asset for synthetic two-hop conversions.
const BRIDGE_ASSET: &str = "BTC";

/// Aggregate-trade query result: either the trades or an invalid-symbol signal.
#[derive(Debug)]
pub(crate) enum AggTrades {
    /// (price, quantity) per trade in the window.
    Trades(Vec<(Decimal, Decimal)>),
    InvalidSymbol,
}

pub struct BinanceFetcher {
    client: Client,
    root: String,
    rate_limit: Duration,
    http_timeout: Duration,
}

impl BinanceFetcher {
    pub fn new(rate_limit: Duration, http_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            root: API_ROOT.to_string(),
            rate_limit,
            http_timeout,
        }
    }

    async fn agg_trades(&self, symbol: &str, start_ms: i64, end_ms: i64) -> PriceResult<AggTrades> {
        tokio::time::sleep(self.rate_limit).await;

        let url = format!("{}/aggTrades", self.root);
        let start = start_ms.to_string();
        let end = end_ms.to_string();
        debug!("Calling {url}?symbol={symbol}&startTime={start}&endTime={end}");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("startTime", start.as_str()),
                ("endTime", end.as_str()),
            ])
            .timeout(self.http_timeout)
            .send()
            .await?;

        // Error envelopes arrive with a non-2xx status; parse the body
        // before checking the status so the code can be inspected.
        let body: Value = response.json().await?;
        parse_agg_trades(&body)
    }
}

#[async_trait]
impl VenueFetcher for BinanceFetcher {
    fn venue(&self) -> &str {
        VENUE
    }

    async fn fetch_price(
        &self,
        prices: &PriceService,
        pair: &AssetPair,
        utc_time: DateTime<Utc>,
    ) -> PriceResult<Decimal> {
        let symbol = pair.symbol();
        let (start_ms, end_ms) = minute_window(utc_time);

        match self.agg_trades(&symbol, start_ms, end_ms).await? {
            AggTrades::Trades(trades) => {
                if trades.is_empty() {
                    warn!("binance offers no price for `{symbol}` at {utc_time}");
                    return Ok(Decimal::ZERO);
                }
                Ok(volume_weighted_average(&trades))
            }
            AggTrades::InvalidSymbol if pair.quote == BRIDGE_ASSET => {
                // Already comparing against BTC: the pair may still trade
                // with the symbol order reversed, at the reciprocal price.
                let reversed = pair.swapped().symbol();
                match self.agg_trades(&reversed, start_ms, end_ms).await? {
                    AggTrades::InvalidSymbol => Err(PriceError::UnknownSymbol {
                        venue: VENUE.to_string(),
                        symbol,
                    }),
                    AggTrades::Trades(trades) => {
                        let price = volume_weighted_average(&trades);
                        if price.is_zero() {
                            warn!("binance offers no price for `{reversed}` at {utc_time}");
                            return Ok(Decimal::ZERO);
                        }
                        Ok(Decimal::ONE / price)
                    }
                }
            }
            AggTrades::InvalidSymbol => {
                // Almost anything is paired with BTC; chain through it via
                // the cache-aware entry point.
                let base_bridge = prices
                    .get_price(VENUE, &pair.base, utc_time, BRIDGE_ASSET)
                    .await?;
                let bridge_quote = prices
                    .get_price(VENUE, BRIDGE_ASSET, utc_time, &pair.quote)
                    .await?;
                Ok(base_bridge * bridge_quote)
            }
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        start_ms: i64,
        limit: u32,
    ) -> PriceResult<Vec<Candle>> {
        tokio::time::sleep(self.rate_limit).await;

        let url = format!("{}/klines", self.root);
        let start = start_ms.to_string();
        let limit_str = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", "1m"),
                ("startTime", start.as_str()),
                ("limit", limit_str.as_str()),
            ])
            .timeout(self.http_timeout)
            .send()
            .await?;

        let body: Value = response.json().await?;
        parse_klines(&body, symbol)
    }
}

/// Trade-volume-weighted average price: sum(price * quantity) / sum(quantity).
///
/// Exact decimal arithmetic; an empty or zero-volume window averages to zero.
pub fn volume_weighted_average(trades: &[(Decimal, Decimal)]) -> Decimal {
    let mut total_cost = Decimal::ZERO;
    let mut total_quantity = Decimal::ZERO;
    for (price, quantity) in trades {
        total_cost += *price * *quantity;
        total_quantity += *quantity;
    }
    if total_quantity.is_zero() {
        return Decimal::ZERO;
    }
    total_cost / total_quantity
}

/// 1-minute window centered on the timestamp, as epoch milliseconds.
fn minute_window(utc_time: DateTime<Utc>) -> (i64, i64) {
    let ts = utc_time.timestamp_millis();
    (ts - 30_000, ts + 30_000)
}

pub(crate) fn parse_agg_trades(body: &Value) -> PriceResult<AggTrades> {
    if let Some(code) = body.get("code").and_then(Value::as_i64) {
        let msg = body.get("msg").and_then(Value::as_str).unwrap_or_default();
        if code == INVALID_SYMBOL_CODE {
            return Ok(AggTrades::InvalidSymbol);
        }
        return Err(PriceError::VenueRejected {
            venue: VENUE.to_string(),
            detail: format!("{code}: {msg}"),
        });
    }

    let rows = body.as_array().ok_or_else(|| {
        PriceError::MalformedResponse("binance aggTrades response is not an array".to_string())
    })?;

    let mut trades = Vec::with_capacity(rows.len());
    for row in rows {
        let price = decimal_str_field(row, "p")?;
        let quantity = decimal_str_field(row, "q")?;
        trades.push((price, quantity));
    }
    Ok(AggTrades::Trades(trades))
}

fn parse_klines(body: &Value, symbol: &str) -> PriceResult<Vec<Candle>> {
    if let Some(code) = body.get("code").and_then(Value::as_i64) {
        let msg = body.get("msg").and_then(Value::as_str).unwrap_or_default();
        if code == INVALID_SYMBOL_CODE {
            return Err(PriceError::UnknownSymbol {
                venue: VENUE.to_string(),
                symbol: symbol.to_string(),
            });
        }
        return Err(PriceError::VenueRejected {
            venue: VENUE.to_string(),
            detail: format!("{code}: {msg}"),
        });
    }

    let rows = body.as_array().ok_or_else(|| {
        PriceError::MalformedResponse("binance kline response is not an array".to_string())
    })?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let fields = row.as_array().ok_or_else(|| {
            PriceError::MalformedResponse("binance kline row is not an array".to_string())
        })?;
        let open_time_ms = fields.first().and_then(Value::as_i64).ok_or_else(|| {
            PriceError::MalformedResponse("binance kline open time is missing".to_string())
        })?;
        candles.push(Candle {
            open_time_ms,
            open: decimal_index_field(fields, 1)?,
            high: decimal_index_field(fields, 2)?,
            low: decimal_index_field(fields, 3)?,
            close: decimal_index_field(fields, 4)?,
            volume: decimal_index_field(fields, 5)?,
        });
    }
    Ok(candles)
}

fn decimal_str_field(row: &Value, key: &str) -> PriceResult<Decimal> {
    let raw = row.get(key).and_then(Value::as_str).ok_or_else(|| {
        PriceError::MalformedResponse(format!("binance trade field `{key}` is not a string"))
    })?;
    Ok(Decimal::from_str(raw)?)
}

fn decimal_index_field(fields: &[Value], idx: usize) -> PriceResult<Decimal> {
    let raw = fields.get(idx).and_then(Value::as_str).ok_or_else(|| {
        PriceError::MalformedResponse(format!("binance kline field {idx} is not a string"))
    })?;
    Ok(Decimal::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_weighted_average_is_exact() {
        let trades = vec![
            (Decimal::from_str("10").unwrap(), Decimal::from_str("1").unwrap()),
            (Decimal::from_str("20").unwrap(), Decimal::from_str("3").unwrap()),
        ];
        assert_eq!(
            volume_weighted_average(&trades),
            Decimal::from_str("17.5").unwrap()
        );
    }

    #[test]
    fn test_volume_weighted_average_empty() {
        assert_eq!(volume_weighted_average(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_parse_agg_trades() {
        let body: Value = serde_json::from_str(
            r#"[{"a": 1, "p": "0.01633102", "q": "4.70443515", "T": 1498793709153},
                {"a": 2, "p": "0.01633103", "q": "1.00000000", "T": 1498793709163}]"#,
        )
        .unwrap();
        match parse_agg_trades(&body).unwrap() {
            AggTrades::Trades(trades) => {
                assert_eq!(trades.len(), 2);
                assert_eq!(trades[0].0, Decimal::from_str("0.01633102").unwrap());
            }
            AggTrades::InvalidSymbol => panic!("expected trades"),
        }
    }

    #[test]
    fn test_parse_invalid_symbol_envelope() {
        let body: Value =
            serde_json::from_str(r#"{"code": -1121, "msg": "Invalid symbol."}"#).unwrap();
        assert!(matches!(
            parse_agg_trades(&body).unwrap(),
            AggTrades::InvalidSymbol
        ));
    }

    #[test]
    fn test_parse_other_error_envelope_is_rejected() {
        let body: Value =
            serde_json::from_str(r#"{"code": -1003, "msg": "Too many requests."}"#).unwrap();
        assert!(matches!(
            parse_agg_trades(&body),
            Err(PriceError::VenueRejected { .. })
        ));
    }

    #[test]
    fn test_parse_klines() {
        let body: Value = serde_json::from_str(
            r#"[[1600000000000, "100.0", "110.0", "90.0", "105.0", "12.5", 1600000059999, "0", 1, "0", "0", "0"]]"#,
        )
        .unwrap();
        let candles = parse_klines(&body, "BTCEUR").unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open_time_ms, 1_600_000_000_000);
        assert_eq!(candles[0].midpoint(), Decimal::from_str("102.5").unwrap());
    }
}
