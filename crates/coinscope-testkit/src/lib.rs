// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use coinscope_app::{Candidate, CoinDetail, CoinId, CoinLookup, LookupFailure, MarketCoin};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use time::{Date, Month};

const MARKET_ROWS: [(&str, &str, &str, f64, f64); 10] = [
    ("bitcoin", "btc", "Bitcoin", 64_250.12, 1.84),
    ("ethereum", "eth", "Ethereum", 3_120.55, -0.72),
    ("tether", "usdt", "Tether", 1.0, 0.01),
    ("solana", "sol", "Solana", 142.9, 4.12),
    ("binancecoin", "bnb", "BNB", 585.3, 0.35),
    ("usd-coin", "usdc", "USDC", 1.0, 0.0),
    ("ripple", "xrp", "XRP", 0.5123, -2.05),
    ("dogecoin", "doge", "Dogecoin", 0.1234, 6.4),
    ("cardano", "ada", "Cardano", 0.4412, -1.1),
    ("tron", "trx", "TRON", 0.1189, 0.9),
];

pub fn candidate(id: &str, name: &str, symbol: &str) -> Candidate {
    Candidate {
        id: CoinId::new(id),
        name: name.to_owned(),
        symbol: symbol.to_owned(),
        thumb: format!("https://assets.example.test/{id}/thumb.png"),
    }
}

pub fn bitcoin() -> Candidate {
    candidate("bitcoin", "Bitcoin", "btc")
}

pub fn bitcoin_cash() -> Candidate {
    candidate("bitcoin-cash", "Bitcoin Cash", "bch")
}

pub fn wrapped_bitcoin() -> Candidate {
    candidate("wrapped-bitcoin", "Wrapped Bitcoin", "wbtc")
}

pub fn ethereum() -> Candidate {
    candidate("ethereum", "Ethereum", "eth")
}

/// Ranked listing including the stablecoins the client is expected to drop.
pub fn market_coins() -> Vec<MarketCoin> {
    MARKET_ROWS
        .iter()
        .enumerate()
        .map(|(index, (id, symbol, name, price, change))| MarketCoin {
            id: CoinId::new(*id),
            symbol: (*symbol).to_owned(),
            name: (*name).to_owned(),
            image: format!("https://assets.example.test/{id}/large.png"),
            current_price: *price,
            market_cap_rank: Some(index as u32 + 1),
            price_change_24h: Some(*change),
            sparkline_7d: sparkline(*price, *change),
        })
        .collect()
}

pub fn coin_detail(id: &str) -> Result<CoinDetail> {
    let (_, symbol, name, price, change) = MARKET_ROWS
        .iter()
        .find(|row| row.0 == id)
        .ok_or_else(|| anyhow!("no fixture for coin {id:?}"))?;
    Ok(CoinDetail {
        id: CoinId::new(id),
        name: (*name).to_owned(),
        symbol: (*symbol).to_owned(),
        image: format!("https://assets.example.test/{id}/large.png"),
        current_price: Some(*price),
        market_cap: Some(price * 19_700_000.0),
        total_volume: Some(price * 410_000.0),
        high_24h: Some(price * 1.02),
        low_24h: Some(price * 0.97),
        price_change_24h: Some(*change),
        summary: format!("{name} is a fixture coin."),
        genesis_date: Date::from_calendar_date(2009, Month::January, 3).ok(),
        homepage: Some(format!("https://{id}.example.test")),
        github: None,
    })
}

fn sparkline(price: f64, change: f64) -> Vec<f64> {
    let step = price * change / 100.0 / 24.0;
    (0..24_u32).map(|hour| price + step * f64::from(hour)).collect()
}

/// Lookup provider that answers from a script and records every query.
#[derive(Default)]
pub struct ScriptedLookup {
    responses: Mutex<BTreeMap<String, Result<Vec<Candidate>, LookupFailure>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, query: &str, candidates: Vec<Candidate>) -> Self {
        lock(&self.responses).insert(query.to_owned(), Ok(candidates));
        self
    }

    pub fn fail(self, query: &str, status: u16) -> Self {
        lock(&self.responses).insert(
            query.to_owned(),
            Err(LookupFailure::Status {
                status,
                message: String::new(),
            }),
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl CoinLookup for ScriptedLookup {
    fn lookup(&self, query: &str) -> Result<Vec<Candidate>, LookupFailure> {
        lock(&self.calls).push(query.to_owned());
        lock(&self.responses)
            .get(query)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Deterministic stand-in for wall-clock time in debounce tests.
#[derive(Debug, Clone, Copy)]
pub struct ManualClock {
    start: Instant,
    elapsed: Duration,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn now(&self) -> Instant {
        self.start + self.elapsed
    }

    pub fn advance_ms(&mut self, millis: u64) -> Instant {
        self.elapsed += Duration::from_millis(millis);
        self.now()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
