pub mod fetchers;
pub mod path_resolver;
pub mod preloader;
pub mod price_service;

pub use fetchers::{BinanceFetcher, KrakenFetcher, VenueFetcher, VenueRegistry};
pub use path_resolver::{MarketEdge, PairTopology, PathResolver, PriceEdge, PricePath};
pub use preloader::BatchPreloader;
pub use price_service::PriceService;
