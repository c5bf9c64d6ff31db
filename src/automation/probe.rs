//! Order-completion probe.
//!
//! Whether an order is "done" is read off the page heuristically, so the
//! predicate sits behind the `OrderProbe` trait. `PageProbe` reads the
//! open-orders table and balance readouts through a `UiAutomation`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::{controls::locate_all, Control, UiAutomation};
use crate::types::Side;

/// Status fragments that mark an order as still working.
const OUTSTANDING_STATUSES: &[&str] = &["new", "partially", "部分成交", "新订单", "未成交"];

/// Source of truth for order completion and held position.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderProbe: Send + Sync {
    /// Number of orders on `side` whose status reads new / partially filled.
    async fn outstanding_orders(&self, side: Side) -> Result<usize>;

    /// Largest available balance not denominated in the quote currency.
    async fn position_balance(&self) -> Result<Decimal>;
}

/// `OrderProbe` backed by the trading page itself.
pub struct PageProbe {
    ui: Arc<dyn UiAutomation>,
    quote_currency: String,
}

impl PageProbe {
    pub fn new(ui: Arc<dyn UiAutomation>, quote_currency: impl Into<String>) -> Self {
        Self {
            ui,
            quote_currency: quote_currency.into(),
        }
    }
}

#[async_trait]
impl OrderProbe for PageProbe {
    async fn outstanding_orders(&self, side: Side) -> Result<usize> {
        let rows = locate_all(self.ui.as_ref(), Control::OpenOrderRow(side)).await?;
        let mut outstanding = 0;
        for row in &rows {
            let text = self
                .ui
                .query_text(row)
                .await
                .with_context(|| format!("Failed to read open {side} order row"))?;
            if is_outstanding_status(&text) {
                outstanding += 1;
            }
        }
        debug!(side = %side, rows = rows.len(), outstanding, "Open orders read");
        Ok(outstanding)
    }

    async fn position_balance(&self) -> Result<Decimal> {
        let readouts = locate_all(self.ui.as_ref(), Control::AvailableBalance).await?;
        let mut best = Decimal::ZERO;
        for readout in &readouts {
            let text = self
                .ui
                .query_text(readout)
                .await
                .context("Failed to read balance")?;
            if text.contains(self.quote_currency.as_str()) {
                continue;
            }
            if let Some(value) = extract_decimal(&text) {
                best = best.max(value);
            }
        }
        debug!(balance = %best, readouts = readouts.len(), "Position balance read");
        Ok(best)
    }
}

/// Whether an order row's text describes a still-working order.
pub fn is_outstanding_status(text: &str) -> bool {
    let lower = text.to_lowercase();
    OUTSTANDING_STATUSES.iter().any(|s| {
        if s.is_ascii() {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word.starts_with(s))
        } else {
            lower.contains(s)
        }
    })
}

/// First decimal number in `text`, ignoring thousands separators.
pub fn extract_decimal(text: &str) -> Option<Decimal> {
    let mut buf = String::new();
    let mut started = false;
    for c in text.chars() {
        if c.is_ascii_digit() || (started && c == '.') {
            started = true;
            buf.push(c);
        } else if started && c == ',' {
            continue;
        } else if started {
            break;
        }
    }
    let trimmed = buf.trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
