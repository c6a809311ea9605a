mod helpers;

use helpers::*;
use pricevault::error::PriceError;
use pricevault::models::{AssetPair, CostQuery, Operation, SoldPortion};
use pricevault::services::path_resolver::MarketEdge;
use rust_decimal::Decimal;
use std::sync::Arc;

fn operation(venue: &str, asset: &str, secs: i64, change: &str) -> Operation {
    Operation {
        venue: venue.to_string(),
        asset: asset.to_string(),
        utc_time: ts(secs),
        change: dec(change),
    }
}

#[tokio::test]
async fn test_identity_price_is_one_without_any_remote_call() -> anyhow::Result<()> {
    let fetcher = Arc::new(ScriptedFetcher::new("binance"));
    let engine = engine_with("identity", vec![fetcher.clone()], StaticTopology(vec![]), "EUR");

    let price = engine.prices.get_price("binance", "EUR", ts(1_600_000_000), "EUR").await?;
    assert_eq!(price, Decimal::ONE);

    // Identity also holds for venues nobody registered a fetcher for.
    let price = engine.prices.get_price("coinbase", "BTC", ts(1_600_000_000), "BTC").await?;
    assert_eq!(price, Decimal::ONE);

    assert_eq!(fetcher.price_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_venue_fails_fast() {
    let engine = engine_with("unknown-venue", vec![], StaticTopology(vec![]), "EUR");

    let result = engine.prices.get_price("coinbase", "BTC", ts(1_600_000_000), "EUR").await;
    assert!(matches!(result, Err(PriceError::UnknownVenue(venue)) if venue == "coinbase"));
}

#[tokio::test]
async fn test_second_lookup_is_served_from_cache() -> anyhow::Result<()> {
    let when = ts(1_600_000_000);
    let fetcher = Arc::new(
        ScriptedFetcher::new("binance").with_price("BTCEUR", when, dec("50123.456")),
    );
    let engine = engine_with("idempotence", vec![fetcher.clone()], StaticTopology(vec![]), "EUR");

    let first = engine.prices.get_price("binance", "BTC", when, "EUR").await?;
    let second = engine.prices.get_price("binance", "BTC", when, "EUR").await?;

    assert_eq!(first, dec("50123.456"));
    assert_eq!(second, first);
    assert_eq!(second.to_string(), first.to_string());
    // The second call never reached the venue.
    assert_eq!(fetcher.price_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_zero_price_sentinel_is_cached_too() -> anyhow::Result<()> {
    let when = ts(1_600_000_000);
    let fetcher =
        Arc::new(ScriptedFetcher::new("binance").with_price("XYZEUR", when, Decimal::ZERO));
    let engine = engine_with("zero-sentinel", vec![fetcher.clone()], StaticTopology(vec![]), "EUR");

    assert_eq!(engine.prices.get_price("binance", "XYZ", when, "EUR").await?, Decimal::ZERO);
    assert_eq!(engine.prices.get_price("binance", "XYZ", when, "EUR").await?, Decimal::ZERO);
    // A rerun must not re-query a window the venue already reported empty.
    assert_eq!(fetcher.price_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_bridge_fallback_chains_and_caches_every_hop() -> anyhow::Result<()> {
    let when = ts(1_600_000_000);
    let fetcher = Arc::new(
        ScriptedFetcher::new("binance")
            .with_price("ADABTC", when, dec("0.00002"))
            .with_price("BTCEUR", when, dec("50000")),
    );
    let engine = engine_with("bridge", vec![fetcher.clone()], StaticTopology(vec![]), "EUR");

    let price = engine.prices.get_price("binance", "ADA", when, "EUR").await?;

    let ada_btc = engine.prices.get_price("binance", "ADA", when, "BTC").await?;
    let btc_eur = engine.prices.get_price("binance", "BTC", when, "EUR").await?;
    assert_eq!(price, ada_btc * btc_eur);
    assert_eq!(price, dec("1"));

    // Every hop of the chain landed in the cache on the way: ADA/EUR,
    // ADA/BTC and BTC/EUR each cost exactly one remote call.
    assert_eq!(fetcher.price_calls(), 3);
    for pair in [
        AssetPair::new("ADA", "EUR"),
        AssetPair::new("ADA", "BTC"),
        AssetPair::new("BTC", "EUR"),
    ] {
        assert!(engine.repo.get("binance", &pair, when).await?.is_some());
    }
    Ok(())
}

#[tokio::test]
async fn test_get_cost_scales_price_by_quantity() -> anyhow::Result<()> {
    let when = ts(1_600_000_000);
    let fetcher =
        Arc::new(ScriptedFetcher::new("binance").with_price("BTCEUR", when, dec("50000")));
    let engine = engine_with("cost", vec![fetcher.clone()], StaticTopology(vec![]), "EUR");

    let op = operation("binance", "BTC", 1_600_000_000, "2");
    let cost = engine.prices.get_cost(CostQuery::from(&op), "EUR").await?;
    assert_eq!(cost, dec("100000"));

    let sold = SoldPortion {
        op: op.clone(),
        sold: dec("0.5"),
    };
    let cost = engine.prices.get_cost(CostQuery::from(&sold), "EUR").await?;
    assert_eq!(cost, dec("25000"));

    // Both queries share one cached price resolution.
    assert_eq!(fetcher.price_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_preload_batches_candles_and_writes_through_cache() -> anyhow::Result<()> {
    let t1 = 1_600_000_000;
    let t2 = t1 + 600;
    let fetcher = Arc::new(ScriptedFetcher::new("binance").with_candles(
        "BTCEUR",
        vec![
            candle(t1 * 1000, "49900", "50100"),          // midpoint 50000
            candle(t2 * 1000 + 30_000, "50900", "51100"), // midpoint 51000
        ],
    ));
    let topology = StaticTopology(vec![MarketEdge::new("BTCEUR", "binance", "BTC", "EUR")]);
    let engine = engine_with("preload", vec![fetcher.clone()], topology, "EUR");

    let ops = vec![
        operation("binance", "BTC", t1, "1"),
        operation("binance", "BTC", t2, "1"),
    ];
    let written = engine.preloader.preload(&ops, "BTC").await?;
    assert_eq!(written, 2);
    // Both timestamps fit one batch: a single candle series covers them.
    assert_eq!(fetcher.candle_calls(), 1);

    let pair = AssetPair::new("BTC", "EUR");
    assert_eq!(engine.repo.get("binance", &pair, ts(t1)).await?, Some(dec("50000")));
    assert_eq!(engine.repo.get("binance", &pair, ts(t2)).await?, Some(dec("51000")));

    // Preloading again finds everything cached and stays off the network.
    let written = engine.preloader.preload(&ops, "BTC").await?;
    assert_eq!(written, 0);
    assert_eq!(fetcher.candle_calls(), 1);

    // The per-operation lookups that follow are pure cache hits.
    let price = engine.prices.get_price("binance", "BTC", ts(t1), "EUR").await?;
    assert_eq!(price, dec("50000"));
    assert_eq!(fetcher.price_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_preload_falls_back_to_alternative_path_and_inverts_hops() -> anyhow::Result<()> {
    let t1 = 1_600_000_000;
    // The preferred venue has the market but no candle data; the fallback
    // path only trades the reverse direction, so its prices are inverted.
    let binance = Arc::new(ScriptedFetcher::new("binance"));
    let kraken = Arc::new(ScriptedFetcher::new("kraken").with_candles(
        "EURBTC",
        vec![candle(t1 * 1000, "0.00002", "0.00002")],
    ));
    let topology = StaticTopology(vec![
        MarketEdge::new("BTCEUR", "binance", "BTC", "EUR"),
        MarketEdge::new("EURBTC", "kraken", "EUR", "BTC"),
    ]);
    let engine = engine_with("fallback", vec![binance.clone(), kraken.clone()], topology, "EUR");

    let ops = vec![operation("binance", "BTC", t1, "1")];
    let written = engine.preloader.preload(&ops, "BTC").await?;
    assert_eq!(written, 1);

    // The operation's venue keys the cache, even though the data came
    // from the fallback path's venue.
    let pair = AssetPair::new("BTC", "EUR");
    assert_eq!(engine.repo.get("binance", &pair, ts(t1)).await?, Some(dec("50000")));

    // The preferred path was attempted first and failed.
    assert_eq!(binance.candle_calls(), 1);
    assert_eq!(kraken.candle_calls(), 1);
    Ok(())
}
