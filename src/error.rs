use crate::database::StoreError;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum PriceError {
    /// No fetcher is registered for the requested venue
    #[error("No price fetcher registered for venue `{0}`")]
    UnknownVenue(String),

    /// The requested pair does not trade on the venue, even after fallbacks
    #[error("Symbol `{symbol}` does not exist on {venue}")]
    UnknownSymbol { venue: String, symbol: String },

    /// The venue rejected a request with a non-retryable error envelope
    #[error("{venue} rejected the request: {detail}")]
    VenueRejected { venue: String, detail: String },

    /// The venue kept signalling errors after all retries were exhausted
    #[error("{venue} is unreachable: {detail}")]
    VenueUnavailable { venue: String, detail: String },

    /// Price store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A venue response did not have the documented shape
    #[error("Malformed venue response: {0}")]
    MalformedResponse(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Decimal parsing errors
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(#[from] rust_decimal::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for application errors
pub type PriceResult<T> = Result<T, PriceError>;

impl PriceError {
    /// Check if error means the pair cannot trade on the venue
    pub fn is_unknown_symbol(&self) -> bool {
        matches!(self, PriceError::UnknownSymbol { .. })
    }

    /// Check if error is fatal for the whole run rather than one lookup
    pub fn is_venue_unavailable(&self) -> bool {
        matches!(self, PriceError::VenueUnavailable { .. })
    }
}
