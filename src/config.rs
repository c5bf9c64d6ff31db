//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The `[timing]` table is optional; missing keys take the engine defaults.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

use crate::engine::CycleTimings;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub trading: TradingConfig,
    #[serde(default)]
    pub timing: CycleTimings,
    #[serde(default)]
    pub paper: PaperConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    /// Substring the page location must contain before and while trading.
    pub location_pattern: String,
    /// Balances denominated in this currency are never treated as a position.
    pub quote_currency: String,
    /// Used for auto-start when no saved settings exist.
    #[serde(default)]
    pub default_amount: Option<Decimal>,
    #[serde(default)]
    pub max_trade_count: u32,
    #[serde(default)]
    pub auto_start: bool,
    /// Where the last-used settings are kept; `None` disables persistence.
    #[serde(default)]
    pub settings_file: Option<String>,
}

/// Simulated page used when no live browser adapter is linked.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PaperConfig {
    pub quote_balance: Decimal,
    pub price: Decimal,
    pub fill_delay_polls: u32,
    pub confirm_dialogs: bool,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            quote_balance: dec!(1000),
            price: dec!(1),
            fill_delay_polls: 3,
            confirm_dialogs: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
