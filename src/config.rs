use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Price store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one SQLite database per venue.
    pub data_path: PathBuf,
    pub max_connections: u32,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    /// Currency code all prices are ultimately expressed in.
    pub reference_currency: String,
    pub log_level: String,
    /// Minimum delay before each remote venue call (cooperative throttling).
    pub rate_limit_ms: u64,
    pub http_timeout_secs: u64,
}

impl StoreConfig {
    /// Create store config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let data_path = env::var("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let max_connections = env::var("STORE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(5);

        if max_connections == 0 {
            return Err("STORE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        Ok(Self {
            data_path,
            max_connections,
        })
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            max_connections: 5,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables (honors `.env`)
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();

        let store = StoreConfig::from_env()?;

        let reference_currency = env::var("REFERENCE_CURRENCY")
            .unwrap_or_else(|_| "EUR".to_string())
            .to_uppercase();

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let rate_limit_ms = env::var("RATE_LIMIT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(250);

        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        if reference_currency.is_empty() {
            return Err("REFERENCE_CURRENCY must not be empty".to_string());
        }

        if http_timeout_secs == 0 {
            return Err("HTTP_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            store,
            reference_currency,
            log_level: log_level.to_lowercase(),
            rate_limit_ms,
            http_timeout_secs,
        })
    }

    /// Get rate-limit delay as Duration
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    /// Get HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            reference_currency: "EUR".to_string(),
            log_level: "info".to_string(),
            rate_limit_ms: 250,
            http_timeout_secs: 30,
        }
    }
}
