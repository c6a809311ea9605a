use crate::config::StoreConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors that can occur when working with the price store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open venue database: {0}")]
    Open(sqlx::Error),

    #[error("Database query error: {0}")]
    Query(sqlx::Error),

    #[error("Stored price is not a valid decimal: {0}")]
    CorruptPrice(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Query(err)
    }
}

/// Lazily opened SQLite connection pools, one database file per venue.
///
/// Read paths must not create an empty database as a side effect, so
/// callers check [`VenuePools::db_exists`] before reading.
pub struct VenuePools {
    root: PathBuf,
    max_connections: u32,
    pools: Mutex<HashMap<String, SqlitePool>>,
}

impl VenuePools {
    /// Create a new pool manager rooted at the configured data directory
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            root: config.data_path.clone(),
            max_connections: config.max_connections,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Path of a venue's database file
    pub fn db_path(&self, venue: &str) -> PathBuf {
        self.root.join(format!("{venue}.db"))
    }

    /// Whether a venue's database file exists on disk
    pub fn db_exists(&self, venue: &str) -> bool {
        self.db_path(venue).is_file()
    }

    /// Get (or lazily open) the pool for a venue, creating the database
    /// file on first use.
    pub async fn pool(&self, venue: &str) -> Result<SqlitePool, StoreError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(venue) {
            return Ok(pool.clone());
        }

        std::fs::create_dir_all(&self.root)?;

        let options = SqliteConnectOptions::new()
            .filename(self.db_path(venue))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await
            .map_err(StoreError::Open)?;

        debug!("Opened price database for venue `{venue}`");
        pools.insert(venue.to_string(), pool.clone());
        Ok(pool)
    }
}
