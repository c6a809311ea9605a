pub mod price_repository;

// Re-export for convenient access
pub use price_repository::{PriceRepository, PutOutcome};
