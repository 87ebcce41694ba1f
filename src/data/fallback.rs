//! Static payloads served when an upstream fails and nothing is cached
//!
//! Everything here is deterministic, so repeated fallbacks render the same
//! placeholder content.

use super::{
    interval_minutes, BoostedToken, KlinePoint, KlineSeries, MarketOverview, MarketToken, RankedToken,
    TokenBoosts, Topic, TokenDetails,
};

const PLACEHOLDER_TOKENS: usize = 50;
const PLACEHOLDER_PRICE: f64 = 0.007354;

pub fn topics() -> Vec<Topic> {
    [("hot", "Hot", "热门"), ("new", "New", "新币"), ("meme", "Meme", "Meme")]
        .into_iter()
        .map(|(id, en, zh)| Topic {
            id: id.to_string(),
            name_en: en.to_string(),
            name_zh: zh.to_string(),
        })
        .collect()
}

/// Fifty placeholder rows alternating between BSC and Ethereum
pub fn ranked_tokens() -> Vec<RankedToken> {
    (0..PLACEHOLDER_TOKENS)
        .map(|i| {
            let step = i as f64;
            RankedToken {
                token: format!("0xtoken{}", i),
                chain: if i % 2 == 0 { "bsc" } else { "eth" }.to_string(),
                symbol: format!("TKN{}", i),
                name: format!("Token {}", i),
                logo_url: format!("https://example.com/token{}.png", i),
                current_price_usd: ((step * 37.0) % 1000.0) + 0.5,
                price_change_24h: ((step * 7.0) % 20.0) - 10.0,
                tx_volume_u_24h: (step + 1.0) * 125_000.0,
                holders: (i as u64 + 1) * 1_000,
                market_cap: "0".to_string(),
                fdv: "0".to_string(),
                risk_score: "0".to_string(),
            }
        })
        .collect()
}

/// Placeholder detail echoing the requested address and chain
pub fn token_details(address: &str, chain: &str) -> TokenDetails {
    TokenDetails {
        symbol: "BL".to_string(),
        name: "Blast".to_string(),
        address: address.to_string(),
        logo: "/LOGO.JPG".to_string(),
        price: PLACEHOLDER_PRICE,
        price_change: -0.53,
        volume_24h: 769.3006,
        market_cap: 44443.23,
        total_supply: 89.14,
        holders: 2798,
        lp_amount: 269.0,
        lock_percent: 99.97,
        chain: chain.to_string(),
    }
}

/// Synthetic candles ending at `now` (unix seconds)
///
/// Prices oscillate gently around the placeholder price; the same inputs
/// always give the same series.
pub fn kline_series(address: &str, chain: &str, interval: &str, limit: u32, now: i64) -> KlineSeries {
    let step = i64::from(interval_minutes(interval)) * 60;
    let count = i64::from(limit);
    let points = (0..count)
        .map(|i| {
            let phase = i as f64 / 6.0;
            let open = PLACEHOLDER_PRICE * (1.0 + 0.01 * phase.sin());
            let close = PLACEHOLDER_PRICE * (1.0 + 0.01 * (phase + 1.0 / 6.0).sin());
            KlinePoint {
                time: now - (count - i) * step,
                open,
                high: open.max(close) * 1.005,
                low: open.min(close) * 0.995,
                close,
                volume: 100.0 + ((i * 137) % 2000) as f64,
            }
        })
        .collect();
    KlineSeries {
        points,
        token_id: format!("{}-{}", address, chain),
        interval: interval.to_string(),
        limit,
    }
}

fn tile(id: &str, symbol: &str, name: &str, price: f64, color: &str) -> MarketToken {
    MarketToken {
        id: id.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        price,
        change: 0.0,
        icon: symbol.to_lowercase(),
        color: color.to_string(),
    }
}

pub fn market_overview() -> MarketOverview {
    MarketOverview {
        popular_tokens: vec![
            tile("bitcoin", "BTC", "Bitcoin", 65000.0, "#F7931A"),
            tile("ethereum", "ETH", "Ethereum", 3500.0, "#627EEA"),
            tile("binancecoin", "BNB", "BNB", 600.0, "#F3BA2F"),
            tile("solana", "SOL", "Solana", 140.0, "#00FFA3"),
            tile("cardano", "ADA", "Cardano", 1.2, "#0033AD"),
        ],
        trending_tokens: vec![
            tile("pepe", "PEPE", "Pepe", 0.000001, "#00B300"),
            tile("worldcoin", "WLD", "Worldcoin", 5.0, "#2B6CB0"),
            tile("sui", "SUI", "Sui", 1.5, "#6B46C1"),
            tile("bonk", "BONK", "Bonk", 0.00001, "#DD6B20"),
            tile("blast", "BLAST", "Blast", 0.5, "#805AD5"),
        ],
    }
}

/// Five large caps with fixed prices
pub fn token_boosts() -> TokenBoosts {
    let tokens: Vec<BoostedToken> = [
        ("Bitcoin", "BTC", "bitcoin", "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", "ethereum", 62541.23),
        ("Ethereum", "ETH", "ethereum", "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "ethereum", 3458.92),
        ("Binance Coin", "BNB", "bnb", "0xB8c77482e45F1F44dE1745F52C74426C631bDD52", "binance-smart-chain", 598.47),
        ("Solana", "SOL", "solana", "So11111111111111111111111111111111111111112", "solana", 142.37),
        ("XRP", "XRP", "xrp", "native", "ripple", 0.5023),
    ]
    .into_iter()
    .map(|(name, symbol, slug, address, chain, price)| BoostedToken {
        name: name.to_string(),
        symbol: symbol.to_string(),
        address: address.to_string(),
        chain: chain.to_string(),
        logo: Some(format!(
            "https://cryptologos.cc/logos/{}-{}-logo.png",
            slug,
            symbol.to_lowercase()
        )),
        price: Some(price),
        boost_amount: 0.0,
        url: None,
    })
    .collect();
    TokenBoosts {
        count: tokens.len(),
        tokens,
    }
}
