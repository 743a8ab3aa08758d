// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Log subscriber setup.
//!
//! The terminal belongs to the UI, so events go to a file. Filter priority,
//! highest first: `COINSCOPE_LOG`, `RUST_LOG`, `-v`/`-q`, then `[log] level`.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub const LOG_ENV: &str = "COINSCOPE_LOG";

const FALLBACK_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// `-v` beats `-q` when both are given.
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    /// Level forced by the flags; `None` defers to the config file.
    pub const fn forced_level(self) -> Option<Level> {
        match self {
            Self::Quiet => Some(Level::ERROR),
            Self::Normal => None,
            Self::Verbose => Some(Level::DEBUG),
        }
    }
}

/// Installs the global subscriber, appending to `path`.
pub fn init(verbosity: Verbosity, config_level: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(build_env_filter(verbosity, config_level))
        .with(layer)
        .try_init()
        .context("install log subscriber")?;
    Ok(())
}

fn build_env_filter(verbosity: Verbosity, config_level: &str) -> EnvFilter {
    // An unparseable override falls through to the next source.
    if let Ok(directives) = std::env::var(LOG_ENV)
        && let Ok(filter) = EnvFilter::try_new(&directives)
    {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(level) = verbosity.forced_level() {
        return EnvFilter::new(level.as_str().to_ascii_lowercase());
    }

    EnvFilter::try_new(config_level).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}
