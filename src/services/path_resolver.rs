//! Weighted search for conversion paths across the tradable-pair topology.
//!
//! A path chains tradable markets from a source asset to the reference
//! currency, possibly crossing venues and traversing markets against their
//! quoting direction. Candidate paths are ranked by a mutable priority
//! weight that decays whenever a path fails to yield usable candle data,
//! so healthier alternatives win subsequent searches.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// One tradable market in the pair topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketEdge {
    pub symbol: String,
    pub venue: String,
    pub base: String,
    pub quote: String,
}

impl MarketEdge {
    pub fn new(
        symbol: impl Into<String>,
        venue: impl Into<String>,
        base: impl Into<String>,
        quote: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
            base: base.into(),
            quote: quote.into(),
        }
    }
}

/// Supplies the tradable-pair topology for a time window.
pub trait PairTopology: Send + Sync {
    /// All markets tradable at some point inside `[start_ms, stop_ms]`
    fn markets(&self, start_ms: i64, stop_ms: i64) -> Vec<MarketEdge>;
}

/// One hop of a conversion path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceEdge {
    pub symbol: String,
    pub venue: String,
    /// Traversed quote -> base; hop prices must be inverted.
    pub inverted: bool,
}

/// Ordered hops chaining a source asset to the reference asset.
///
/// Transient: constructed per resolution request and discarded afterwards;
/// only the resolver's edge weights persist.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePath {
    pub edges: Vec<PriceEdge>,
    /// Snapshot of the combined edge weight at discovery time.
    pub weight: Decimal,
}

/// Weight multiplier applied to every edge of a failed path.
fn decay_factor() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

pub struct PathResolver {
    topology: Arc<dyn PairTopology>,
    max_hops: usize,
    /// (venue, symbol) -> current priority weight; baseline is 1.
    weights: HashMap<(String, String), Decimal>,
}

impl PathResolver {
    pub fn new(topology: Arc<dyn PairTopology>) -> Self {
        Self {
            topology,
            max_hops: 3,
            weights: HashMap::new(),
        }
    }

    /// Set the maximum number of hops per path
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Current priority weight of a market edge
    pub fn weight_of(&self, venue: &str, symbol: &str) -> Decimal {
        self.weights
            .get(&(venue.to_string(), symbol.to_string()))
            .copied()
            .unwrap_or(Decimal::ONE)
    }

    /// Ranked candidate paths from `base` to `reference` within the window.
    ///
    /// Highest weight first; weight ties go to the path with more hops on
    /// `preferred_venue`, then to the shorter path.
    pub fn candidate_paths(
        &self,
        base: &str,
        reference: &str,
        start_ms: i64,
        stop_ms: i64,
        preferred_venue: &str,
    ) -> Vec<PricePath> {
        if base == reference {
            return Vec::new();
        }

        let markets = self.topology.markets(start_ms, stop_ms);
        let mut found = Vec::new();
        let mut visited = vec![base.to_string()];
        let mut edges = Vec::new();
        self.collect_paths(&markets, base, reference, &mut visited, &mut edges, &mut found);

        found.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| {
                    preferred_hops(b, preferred_venue).cmp(&preferred_hops(a, preferred_venue))
                })
                .then_with(|| a.edges.len().cmp(&b.edges.len()))
        });
        found
    }

    /// Multiply every edge weight of a failed path by the decay factor so
    /// alternatives outrank it on subsequent searches. Best-effort
    /// self-tuning, not a hard exclusion.
    pub fn penalize(&mut self, path: &PricePath) {
        let decay = decay_factor();
        for edge in &path.edges {
            let weight = self
                .weights
                .entry((edge.venue.clone(), edge.symbol.clone()))
                .or_insert(Decimal::ONE);
            *weight *= decay;
        }
    }

    fn collect_paths(
        &self,
        markets: &[MarketEdge],
        asset: &str,
        reference: &str,
        visited: &mut Vec<String>,
        edges: &mut Vec<PriceEdge>,
        found: &mut Vec<PricePath>,
    ) {
        if edges.len() >= self.max_hops {
            return;
        }

        for market in markets {
            // A market connects its two assets in either direction; the
            // reverse direction marks the hop as inverted.
            let hop = if market.base == asset {
                Some((market.quote.as_str(), false))
            } else if market.quote == asset {
                Some((market.base.as_str(), true))
            } else {
                None
            };
            let Some((next, inverted)) = hop else {
                continue;
            };
            if visited.iter().any(|v| v == next) {
                continue;
            }

            edges.push(PriceEdge {
                symbol: market.symbol.clone(),
                venue: market.venue.clone(),
                inverted,
            });
            if next == reference {
                found.push(PricePath {
                    edges: edges.clone(),
                    weight: self.path_weight(edges),
                });
            } else {
                visited.push(next.to_string());
                self.collect_paths(markets, next, reference, visited, edges, found);
                visited.pop();
            }
            edges.pop();
        }
    }

    fn path_weight(&self, edges: &[PriceEdge]) -> Decimal {
        edges
            .iter()
            .fold(Decimal::ONE, |acc, e| acc * self.weight_of(&e.venue, &e.symbol))
    }
}

fn preferred_hops(path: &PricePath, venue: &str) -> usize {
    path.edges.iter().filter(|e| e.venue == venue).count()
}
