use serde::{Deserialize, Serialize};

/// A priceable relationship between two assets.
///
/// Symmetry is not assumed: a pair may trade on a venue in only one
/// direction, in which case the price of the reverse direction is the
/// reciprocal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub base: String,
    pub quote: String,
}

impl AssetPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Canonical concatenated trading symbol, e.g. `BTCEUR`
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Logical cache table for this pair, e.g. `BTC/EUR`
    pub fn table_name(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// The same pair with the asset order reversed
    pub fn swapped(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    /// Whether both sides are the same asset (price is 1 by definition)
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl std::fmt::Display for AssetPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
