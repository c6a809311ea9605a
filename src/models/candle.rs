use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fixed-interval OHLCV sample as returned by a venue.
///
/// Candles are only an intermediate price estimate during batch preloads;
/// they are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, epoch milliseconds UTC.
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Representative price of the candle: midpoint of open and close
    pub fn midpoint(&self) -> Decimal {
        (self.open + self.close) / Decimal::TWO
    }
}
