//! Persistence layer.
//!
//! Remembers the last-used trade amount and trade-count limit in a small
//! JSON file so the next session can start from them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Default settings file path.
const DEFAULT_SETTINGS_FILE: &str = "trader_settings.json";

/// Last-used session parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSettings {
    pub amount: Decimal,
    /// 0 means unlimited.
    pub max_trade_count: u32,
    pub saved_at: DateTime<Utc>,
}

impl TradeSettings {
    pub fn new(amount: Decimal, max_trade_count: u32) -> Self {
        Self {
            amount,
            max_trade_count,
            saved_at: Utc::now(),
        }
    }
}

/// Save trade settings to a JSON file.
pub fn save_settings(settings: &TradeSettings, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);
    let json = serde_json::to_string_pretty(settings)
        .context("Failed to serialise trade settings")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write settings to {path}"))?;

    debug!(path, amount = %settings.amount, max_trades = settings.max_trade_count, "Settings saved");
    Ok(())
}

/// Load trade settings from a JSON file.
/// Returns None if the file doesn't exist.
pub fn load_settings(path: Option<&str>) -> Result<Option<TradeSettings>> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved settings found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read settings from {path}"))?;

    let settings: TradeSettings = serde_json::from_str(&json)
        .context(format!("Failed to parse settings from {path}"))?;

    info!(
        path,
        amount = %settings.amount,
        max_trades = settings.max_trade_count,
        "Settings loaded from disk"
    );

    Ok(Some(settings))
}

/// Delete the settings file.
pub fn delete_settings(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SETTINGS_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete settings file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
