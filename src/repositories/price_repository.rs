//! Repository for cached historical prices
//!
//! One SQLite database per venue, one table per asset pair, one row per
//! priced instant. Prices are stored as exact decimal strings so reads
//! round-trip bit-identically.

use crate::database::{StoreError, VenuePools};
use crate::models::AssetPair;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Outcome of a cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// Fresh row inserted.
    Inserted,
    /// An identical price was already stored; nothing to do.
    Unchanged,
    /// A different price is already stored; the stored value wins.
    Conflict { stored: Decimal },
}

pub struct PriceRepository {
    pools: Arc<VenuePools>,
}

impl PriceRepository {
    pub fn new(pools: Arc<VenuePools>) -> Self {
        Self { pools }
    }

    /// Get the cached price for an exact (venue, pair, timestamp) key.
    ///
    /// A venue database or pair table that does not exist yet is treated
    /// as a miss, never as an error.
    pub async fn get(
        &self,
        venue: &str,
        pair: &AssetPair,
        utc_time: DateTime<Utc>,
    ) -> Result<Option<Decimal>, StoreError> {
        if !self.pools.db_exists(venue) {
            return Ok(None);
        }

        let pool = self.pools.pool(venue).await?;
        let query = format!(
            "SELECT price FROM \"{}\" WHERE utc_time = ?1;",
            pair.table_name()
        );

        let row: Result<Option<(String,)>, sqlx::Error> = sqlx::query_as(&query)
            .bind(utc_time.timestamp_millis())
            .fetch_optional(&pool)
            .await;

        match row {
            Ok(Some((price,))) => {
                let price = Decimal::from_str(&price).map_err(|_| StoreError::CorruptPrice(price))?;
                Ok(Some(price))
            }
            Ok(None) => Ok(None),
            Err(e) if is_missing_table(&e) => Ok(None),
            Err(e) => Err(StoreError::Query(e)),
        }
    }

    /// Insert a price, creating the pair table lazily on first write.
    ///
    /// A row that already exists for the key is never overwritten: an
    /// identical price is a silent no-op, a different price is rejected
    /// with a conflict warning (the first stored value wins, so reruns
    /// never change previously reported figures).
    pub async fn put(
        &self,
        venue: &str,
        pair: &AssetPair,
        utc_time: DateTime<Utc>,
        price: Decimal,
    ) -> Result<PutOutcome, StoreError> {
        debug_assert!(!pair.is_identity());

        let pool = self.pools.pool(venue).await?;
        let table = pair.table_name();
        let insert = format!("INSERT INTO \"{table}\" (utc_time, price) VALUES (?1, ?2);");
        let ts = utc_time.timestamp_millis();
        let price_str = price.to_string();

        match sqlx::query(&insert)
            .bind(ts)
            .bind(price_str.as_str())
            .execute(&pool)
            .await
        {
            Ok(_) => Ok(PutOutcome::Inserted),
            Err(e) if is_missing_table(&e) => {
                let create = format!(
                    "CREATE TABLE IF NOT EXISTS \"{table}\" \
                     (utc_time INTEGER PRIMARY KEY, price TEXT NOT NULL);"
                );
                sqlx::query(&create).execute(&pool).await?;
                sqlx::query(&insert)
                    .bind(ts)
                    .bind(price_str.as_str())
                    .execute(&pool)
                    .await?;
                Ok(PutOutcome::Inserted)
            }
            Err(e) if is_unique_violation(&e) => {
                match self.get(venue, pair, utc_time).await? {
                    Some(stored) if stored == price => Ok(PutOutcome::Unchanged),
                    Some(stored) => {
                        warn!(
                            "Tried to write price to database, but a different price \
                             exists already (venue={venue}, pair={pair}, \
                             utc_time={utc_time}, price={price}, stored={stored})"
                        );
                        Ok(PutOutcome::Conflict { stored })
                    }
                    None => Err(StoreError::Query(e)),
                }
            }
            Err(e) => Err(StoreError::Query(e)),
        }
    }
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().starts_with("no such table"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}
