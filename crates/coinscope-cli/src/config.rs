// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use coinscope_api::Backend;
use coinscope_app::{DEFAULT_MAX_RESULTS, DEFAULT_MIN_CHARS, SearchConfig};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const APP_NAME: &str = "coinscope";
pub const CONFIG_PATH_ENV: &str = "COINSCOPE_CONFIG_PATH";

const CONFIG_VERSION: i64 = 1;
const DEFAULT_MARKET_TIMEOUT: &str = "10s";
const DEFAULT_AUTH_TIMEOUT: &str = "10s";
const DEFAULT_DEBOUNCE: &str = "400ms";
const DEFAULT_POPULAR_LIMIT: usize = 12;
const DEFAULT_PAGE_SIZE: usize = 6;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub market: Market,
    #[serde(default)]
    pub search: Search,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            market: Market::default(),
            search: Search::default(),
            ui: Ui::default(),
            auth: Auth::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Market {
    pub backend: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Search {
    pub min_chars: Option<i64>,
    pub debounce: Option<String>,
    pub max_results: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    pub popular_limit: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Auth {
    pub enabled: Option<bool>,
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub path: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no `version`; add `version = {CONFIG_VERSION}` at the top",
                    path.display()
                )
            })?;
        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {version} in {}; expected version = {CONFIG_VERSION}",
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let path = path.display();

        if let Some(backend) = &self.market.backend
            && Backend::parse(backend).is_none()
        {
            bail!("market.backend in {path} must be \"public\" or \"local\", got {backend:?}");
        }

        for (key, raw) in [
            ("market.timeout", self.market.timeout.as_deref()),
            ("auth.timeout", self.auth.timeout.as_deref()),
        ] {
            if let Some(raw) = raw {
                let parsed = parse_duration(raw).with_context(|| format!("{key} in {path}"))?;
                if parsed.is_zero() {
                    bail!("{key} in {path} must be positive, got {raw}");
                }
            }
        }
        if let Some(raw) = &self.search.debounce {
            parse_duration(raw).with_context(|| format!("search.debounce in {path}"))?;
        }

        for (key, value) in [
            ("search.min_chars", self.search.min_chars),
            ("search.max_results", self.search.max_results),
            ("ui.popular_limit", self.ui.popular_limit),
            ("ui.page_size", self.ui.page_size),
        ] {
            if let Some(value) = value
                && value <= 0
            {
                bail!("{key} in {path} must be positive, got {value}");
            }
        }

        if self.auth_enabled() {
            if blank(self.auth.url.as_deref()) {
                bail!("auth.enabled is true in {path} but auth.url is not set");
            }
            if blank(self.auth.anon_key.as_deref()) {
                bail!("auth.enabled is true in {path} but auth.anon_key is not set");
            }
        }

        if let Some(level) = &self.log.level {
            EnvFilter::try_new(level)
                .with_context(|| format!("log.level {level:?} in {path} is not a valid filter"))?;
        }

        Ok(())
    }

    pub fn backend(&self) -> Backend {
        self.market
            .backend
            .as_deref()
            .and_then(Backend::parse)
            .unwrap_or(Backend::Public)
    }

    pub fn market_base_url(&self) -> &str {
        match &self.market.base_url {
            Some(url) => url.trim_end_matches('/'),
            None => self.backend().default_base_url(),
        }
    }

    pub fn market_timeout(&self) -> Result<Duration> {
        parse_duration(
            self.market
                .timeout
                .as_deref()
                .unwrap_or(DEFAULT_MARKET_TIMEOUT),
        )
    }

    pub fn search_config(&self) -> Result<SearchConfig> {
        Ok(SearchConfig {
            min_chars: positive_or(self.search.min_chars, DEFAULT_MIN_CHARS),
            debounce: parse_duration(self.search.debounce.as_deref().unwrap_or(DEFAULT_DEBOUNCE))?,
            max_results: positive_or(self.search.max_results, DEFAULT_MAX_RESULTS),
        })
    }

    pub fn popular_limit(&self) -> usize {
        positive_or(self.ui.popular_limit, DEFAULT_POPULAR_LIMIT)
    }

    pub fn page_size(&self) -> usize {
        positive_or(self.ui.page_size, DEFAULT_PAGE_SIZE)
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth.enabled.unwrap_or(false)
    }

    /// URL and anon key of the auth server, when sign-in is turned on.
    pub fn auth_endpoint(&self) -> Option<(&str, &str)> {
        if !self.auth_enabled() {
            return None;
        }
        let url = self.auth.url.as_deref()?.trim();
        let key = self.auth.anon_key.as_deref()?.trim();
        (!url.is_empty() && !key.is_empty()).then_some((url, key))
    }

    pub fn auth_timeout(&self) -> Result<Duration> {
        parse_duration(self.auth.timeout.as_deref().unwrap_or(DEFAULT_AUTH_TIMEOUT))
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log.path {
            return Ok(PathBuf::from(path));
        }
        let cache_root = dirs::cache_dir()
            .ok_or_else(|| anyhow!("cannot resolve cache directory; set [log] path"))?;
        Ok(cache_root.join(APP_NAME).join("coinscope.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            r#"# coinscope config
# Place this file at: {path}

version = {CONFIG_VERSION}

[market]
# "public" talks to CoinGecko, "local" to a self-hosted mirror.
backend = "public"
# base_url = "{local}"
timeout = "{DEFAULT_MARKET_TIMEOUT}"

[search]
min_chars = {DEFAULT_MIN_CHARS}
debounce = "{DEFAULT_DEBOUNCE}"
max_results = {DEFAULT_MAX_RESULTS}

[ui]
popular_limit = {DEFAULT_POPULAR_LIMIT}
page_size = {DEFAULT_PAGE_SIZE}

[auth]
enabled = false
# url = "https://your-project.supabase.co"
# anon_key = "..."
timeout = "{DEFAULT_AUTH_TIMEOUT}"

[log]
level = "{DEFAULT_LOG_LEVEL}"
# path = "/absolute/path/to/coinscope.log"
"#,
            path = path.display(),
            local = Backend::Local.default_base_url(),
        )
    }
}

fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|value| value.trim().is_empty())
}

fn positive_or(value: Option<i64>, fallback: usize) -> usize {
    value
        .and_then(|value| usize::try_from(value).ok())
        .filter(|value| *value > 0)
        .unwrap_or(fallback)
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, millis_per_unit) = if let Some(value) = raw.strip_suffix("ms") {
        (value, 1)
    } else if let Some(value) = raw.strip_suffix('s') {
        (value, 1_000)
    } else if let Some(value) = raw.strip_suffix('m') {
        (value, 60_000)
    } else {
        bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 400ms or 10s)");
    };

    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid duration {raw:?}"))?;
    Ok(Duration::from_millis(value.saturating_mul(millis_per_unit)))
}
