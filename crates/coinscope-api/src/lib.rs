// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod auth;

pub use auth::{AuthClient, INVALID_CREDENTIALS, Session};

use anyhow::{Context, Result, bail};
use coinscope_app::{
    Candidate, CoinDetail, CoinId, CoinLookup, LookupFailure, MarketCoin, first_sentence,
};
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use time::Date;
use url::Url;

pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:8000";
/// Stablecoins never make it into the popular listing.
pub const EXCLUDED_COIN_IDS: [&str; 3] = ["tether", "usd-coin", "binance-usd"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Public market-data API (`/search`, `/coins/markets`, `/coins/{id}`).
    Public,
    /// Companion backend that caches the public API (`/api/coins/...`).
    Local,
}

impl Backend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Local => "local",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::Public => DEFAULT_PUBLIC_BASE_URL,
            Self::Local => DEFAULT_LOCAL_BASE_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketClient {
    base_url: String,
    backend: Backend,
    timeout: Duration,
    http: HttpClient,
}

impl MarketClient {
    pub fn new(base_url: &str, backend: Backend, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("market.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("market.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("market.base_url {base_url:?} must use http or https");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("coinscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            backend,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Coins whose name or symbol match `query`, in provider order.
    pub fn search(&self, query: &str) -> Result<Vec<Candidate>, LookupFailure> {
        let query = query.trim();
        match self.backend {
            Backend::Public => {
                let url = self.endpoint(&["search"], &[("query", query)])?;
                let parsed: PublicSearchResponse = self.get_json(url, "search response")?;
                Ok(parsed.coins)
            }
            Backend::Local => {
                let url = self.endpoint(&["api", "coins", "local-search"], &[("q", query)])?;
                self.get_json(url, "search response")
            }
        }
    }

    /// Top coins by market cap with 24h change and a 7-day sparkline.
    pub fn popular(&self, limit: usize) -> Result<Vec<MarketCoin>> {
        let url = match self.backend {
            Backend::Public => {
                let per_page = (limit + EXCLUDED_COIN_IDS.len()).to_string();
                self.endpoint(
                    &["coins", "markets"],
                    &[
                        ("vs_currency", "usd"),
                        ("order", "market_cap_desc"),
                        ("per_page", per_page.as_str()),
                        ("page", "1"),
                        ("sparkline", "true"),
                        ("price_change_percentage", "24h"),
                    ],
                )?
            }
            Backend::Local => self.endpoint(&["api", "coins", "popular"], &[])?,
        };

        let rows: Vec<MarketRow> = self.get_json(url, "popular coins").context("load popular coins")?;
        Ok(rows
            .into_iter()
            .filter(|row| !EXCLUDED_COIN_IDS.contains(&row.id.as_str()))
            .take(limit)
            .map(MarketRow::into_market_coin)
            .collect())
    }

    pub fn coin_detail(&self, id: &CoinId) -> Result<CoinDetail> {
        let id = id.as_str().trim().to_lowercase();
        if id.is_empty() {
            bail!("coin id must not be empty");
        }

        let url = match self.backend {
            Backend::Public => self.endpoint(
                &["coins", id.as_str()],
                &[("localization", "false"), ("sparkline", "true")],
            )?,
            Backend::Local => self.endpoint(&["api", "coins", id.as_str(), "details"], &[])?,
        };

        let envelope: DetailEnvelope = self
            .get_json(url, "coin details")
            .with_context(|| format!("load details for {id}"))?;
        match envelope {
            DetailEnvelope::Failure { error } => bail!("{error}"),
            DetailEnvelope::Detail(row) => Ok(row.into_coin_detail()),
        }
    }

    fn endpoint(&self, segments: &[&str], params: &[(&str, &str)]) -> Result<Url, LookupFailure> {
        let invalid = |reason: String| LookupFailure::Transport {
            base_url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|error| invalid(error.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("base URL cannot take a path".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        context: &'static str,
    ) -> Result<T, LookupFailure> {
        tracing::debug!(url = %url, "market request");
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|error| connection_error(&self.base_url, &error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        response.json().map_err(|error| LookupFailure::Decode {
            context,
            reason: error.to_string(),
        })
    }
}

impl CoinLookup for MarketClient {
    fn lookup(&self, query: &str) -> Result<Vec<Candidate>, LookupFailure> {
        self.search(query)
    }
}

fn connection_error(base_url: &str, error: &reqwest::Error) -> LookupFailure {
    let reason = if error.is_timeout() {
        "request timed out".to_owned()
    } else {
        error.to_string()
    };
    LookupFailure::Transport {
        base_url: base_url.to_owned(),
        reason,
    }
}

fn clean_error_response(status: StatusCode, body: &str) -> LookupFailure {
    let status_code = status.as_u16();
    let message = if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body) {
        parsed.message().unwrap_or_default()
    } else if body.len() < 100 && !body.contains('{') {
        body.trim().to_owned()
    } else {
        String::new()
    };

    LookupFailure::Status {
        status: status_code,
        message,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    status: Option<ErrorStatus>,
}

impl ErrorEnvelope {
    fn message(self) -> Option<String> {
        self.error
            .or(self.detail)
            .or_else(|| self.status.and_then(|status| status.error_message))
            .filter(|message| !message.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublicSearchResponse {
    #[serde(default)]
    coins: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct MarketRow {
    id: CoinId,
    symbol: String,
    name: String,
    #[serde(default)]
    image: String,
    current_price: Option<f64>,
    market_cap_rank: Option<u32>,
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    sparkline_in_7d: Option<SparklineRow>,
}

#[derive(Debug, Deserialize)]
struct SparklineRow {
    #[serde(default)]
    price: Vec<Option<f64>>,
}

impl MarketRow {
    fn into_market_coin(self) -> MarketCoin {
        let sparkline_7d = self
            .sparkline_in_7d
            .map(|sparkline| {
                sparkline
                    .price
                    .into_iter()
                    .flatten()
                    .filter(|price| price.is_finite())
                    .collect()
            })
            .unwrap_or_default();

        MarketCoin {
            id: self.id,
            symbol: self.symbol,
            name: self.name,
            image: self.image,
            current_price: self.current_price.unwrap_or(f64::NAN),
            market_cap_rank: self.market_cap_rank,
            price_change_24h: self.price_change_percentage_24h,
            sparkline_7d,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetailEnvelope {
    Failure { error: String },
    Detail(Box<DetailRow>),
}

#[derive(Debug, Deserialize)]
struct DetailRow {
    id: CoinId,
    name: String,
    symbol: String,
    #[serde(default)]
    image: ImageRow,
    #[serde(default)]
    market_data: MarketDataRow,
    #[serde(default)]
    description: DescriptionRow,
    #[serde(default)]
    genesis_date: Option<String>,
    #[serde(default)]
    links: LinksRow,
}

#[derive(Debug, Default, Deserialize)]
struct ImageRow {
    #[serde(default)]
    large: String,
}

#[derive(Debug, Default, Deserialize)]
struct UsdRow {
    #[serde(default)]
    usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct MarketDataRow {
    #[serde(default)]
    current_price: UsdRow,
    #[serde(default)]
    market_cap: UsdRow,
    #[serde(default)]
    total_volume: UsdRow,
    #[serde(default)]
    high_24h: UsdRow,
    #[serde(default)]
    low_24h: UsdRow,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DescriptionRow {
    #[serde(default)]
    en: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LinksRow {
    #[serde(default)]
    homepage: Vec<String>,
    #[serde(default)]
    repos_url: ReposRow,
}

#[derive(Debug, Default, Deserialize)]
struct ReposRow {
    #[serde(default)]
    github: Vec<String>,
}

impl DetailRow {
    fn into_coin_detail(self) -> CoinDetail {
        let genesis_date = self
            .genesis_date
            .as_deref()
            .and_then(|raw| Date::parse(raw, time::macros::format_description!("[year]-[month]-[day]")).ok());
        let first_link = |links: Vec<String>| links.into_iter().find(|link| !link.trim().is_empty());

        CoinDetail {
            id: self.id,
            name: self.name,
            symbol: self.symbol,
            image: self.image.large,
            current_price: self.market_data.current_price.usd,
            market_cap: self.market_data.market_cap.usd,
            total_volume: self.market_data.total_volume.usd,
            high_24h: self.market_data.high_24h.usd,
            low_24h: self.market_data.low_24h.usd,
            price_change_24h: self.market_data.price_change_percentage_24h,
            summary: first_sentence(self.description.en.as_deref().unwrap_or_default()),
            genesis_date,
            homepage: first_link(self.links.homepage),
            github: first_link(self.links.repos_url.github),
        }
    }
}
