// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::Date;

use crate::ids::*;

/// One search hit as returned by the lookup provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CoinId,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub thumb: String,
}

impl Candidate {
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.symbol.to_uppercase())
    }
}

/// A row of the ranked market listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketCoin {
    pub id: CoinId,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub current_price: f64,
    pub market_cap_rank: Option<u32>,
    pub price_change_24h: Option<f64>,
    pub sparkline_7d: Vec<f64>,
}

impl MarketCoin {
    pub fn is_rising(&self) -> bool {
        self.price_change_24h.unwrap_or(0.0) >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoinDetail {
    pub id: CoinId,
    pub name: String,
    pub symbol: String,
    pub image: String,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub total_volume: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub summary: String,
    pub genesis_date: Option<Date>,
    pub homepage: Option<String>,
    pub github: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabKind {
    Coins,
    Alerts,
}

impl TabKind {
    pub const ALL: [Self; 2] = [Self::Coins, Self::Alerts];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Coins => "coins",
            Self::Alerts => "alerts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    SignIn,
    SignUp,
}

impl AuthMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SignIn => "Login",
            Self::SignUp => "Sign Up",
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::SignIn => Self::SignUp,
            Self::SignUp => Self::SignIn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Browse,
    Search,
    Auth(AuthMode),
}

/// Signed-in identity as exposed by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    Created,
    AlreadyRegistered,
}

impl SignUpOutcome {
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Created => "Account created successfully! Please confirm your email.",
            Self::AlreadyRegistered => "This email is already registered. Try logging in instead.",
        }
    }
}
