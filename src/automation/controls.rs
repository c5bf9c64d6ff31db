//! Control catalogue and ordered lookup strategies.
//!
//! Each `Control` names something the engine needs on the page. Its
//! `strategies()` list the heuristics to try, highest priority first;
//! `locate` walks that list against an adapter and returns the first hit.

use anyhow::Result;
use std::fmt;
use tracing::debug;

use super::{ElementHandle, UiAutomation};
use crate::types::Side;

/// Something the engine needs to find on the trading page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// The buy/sell tab strip; its presence means the trading surface loaded.
    TradingPanel,
    /// Any "log in" prompt.
    LoginPrompt,
    Tab(Side),
    /// Total (quote-currency) amount field on the buy form.
    TotalAmountInput,
    SubmitButton(Side),
    QuantitySlider,
    /// "100%" / "Max" shortcut, used when no slider is present.
    MaxQuantityButton,
    ConfirmDialog,
    DialogConfirmButton(Side),
    /// One row of the open-orders table for a side.
    OpenOrderRow(Side),
    /// An "available balance" readout. A page usually shows several.
    AvailableBalance,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::TradingPanel => write!(f, "trading panel"),
            Control::LoginPrompt => write!(f, "login prompt"),
            Control::Tab(side) => write!(f, "{side} tab"),
            Control::TotalAmountInput => write!(f, "total amount input"),
            Control::SubmitButton(side) => write!(f, "{side} button"),
            Control::QuantitySlider => write!(f, "quantity slider"),
            Control::MaxQuantityButton => write!(f, "max quantity button"),
            Control::ConfirmDialog => write!(f, "confirmation dialog"),
            Control::DialogConfirmButton(side) => write!(f, "{side} confirm button"),
            Control::OpenOrderRow(side) => write!(f, "open {side} order row"),
            Control::AvailableBalance => write!(f, "available balance"),
        }
    }
}

/// One way of finding an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Element id.
    Id(&'static str),
    /// Structural selector, interpreted by the adapter.
    Css(&'static str),
    /// Elements matched by `scope` whose text contains any of `any_of`.
    Text {
        scope: &'static str,
        any_of: &'static [&'static str],
    },
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Id(id) => write!(f, "id={id}"),
            Strategy::Css(sel) => write!(f, "css={sel}"),
            Strategy::Text { scope, any_of } => write!(f, "text({scope}) in {any_of:?}"),
        }
    }
}

/// A single lookup request handed to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lookup {
    pub control: Control,
    pub strategy: Strategy,
    /// Position of `strategy` in the control's chain (0 = preferred).
    pub rank: usize,
}

const BUY_WORDS: &[&str] = &["买入", "Buy"];
const SELL_WORDS: &[&str] = &["卖出", "Sell"];
const LOGIN_WORDS: &[&str] = &["登录", "Log In"];
const TOTAL_WORDS: &[&str] = &["成交额", "Total"];
const MAX_WORDS: &[&str] = &["100%", "Max"];
const BALANCE_WORDS: &[&str] = &["可用", "Available"];
const CONFIRM_BUY_WORDS: &[&str] = &["确认买入", "继续", "确认", "Confirm Buy", "Continue", "Confirm"];
const CONFIRM_SELL_WORDS: &[&str] = &["确认卖出", "继续", "确认", "Confirm Sell", "Continue", "Confirm"];

impl Control {
    /// Lookup heuristics for this control, highest priority first.
    pub fn strategies(&self) -> Vec<Strategy> {
        use Strategy::*;
        match self {
            Control::TradingPanel => vec![Css(".bn-tabs__buySell"), Css("[role=\"tablist\"]")],
            Control::LoginPrompt => vec![
                Css("[class*=\"login\"]"),
                Text { scope: "button, a", any_of: LOGIN_WORDS },
            ],
            Control::Tab(Side::Buy) => vec![
                Css("[role=\"tab\"][aria-controls*=\"bn-tab-pane-0\"]"),
                Css("[data-tab-key=\"BUY\"]"),
                Css(".bn-tab:first-child"),
                Text { scope: ".bn-tab", any_of: BUY_WORDS },
            ],
            Control::Tab(Side::Sell) => vec![
                Css("[role=\"tab\"][aria-controls*=\"bn-tab-pane-1\"]"),
                Css("[data-tab-key=\"SELL\"]"),
                Css(".bn-tab:nth-child(2)"),
                Text { scope: ".bn-tab", any_of: SELL_WORDS },
            ],
            Control::TotalAmountInput => vec![
                Id("limitTotal"),
                Css("input[placeholder*=\"最小\"]"),
                Css("input[step=\"1e-8\"]"),
                Text { scope: ".w-full input[type=\"text\"]", any_of: TOTAL_WORDS },
            ],
            Control::SubmitButton(Side::Buy) => vec![
                Css(".bn-button__buy"),
                Css("button[class*=\"buy\"]"),
                Text { scope: "button", any_of: BUY_WORDS },
            ],
            Control::SubmitButton(Side::Sell) => vec![
                Css(".bn-button__sell"),
                Css("button[class*=\"sell\"]"),
                Text { scope: "button", any_of: SELL_WORDS },
            ],
            Control::QuantitySlider => vec![
                Css("input[type=\"range\"]"),
                Css(".bn-slider"),
                Css("[role=\"slider\"]"),
            ],
            Control::MaxQuantityButton => vec![Text { scope: "button, div", any_of: MAX_WORDS }],
            Control::ConfirmDialog => vec![
                Css("[role=\"dialog\"]"),
                Css(".bn-modal"),
                Css("[class*=\"modal\"][class*=\"confirm\"]"),
            ],
            Control::DialogConfirmButton(side) => {
                let words = match side {
                    Side::Buy => CONFIRM_BUY_WORDS,
                    Side::Sell => CONFIRM_SELL_WORDS,
                };
                vec![
                    Css("[role=\"dialog\"] .bn-button__primary"),
                    Css(".bn-modal button[class*=\"primary\"]"),
                    Text { scope: "[role=\"dialog\"] button", any_of: words },
                    Css("[role=\"dialog\"] button:last-of-type"),
                ]
            }
            Control::OpenOrderRow(side) => {
                let (css, words) = match side {
                    Side::Buy => ("[data-order-side=\"BUY\"]", BUY_WORDS),
                    Side::Sell => ("[data-order-side=\"SELL\"]", SELL_WORDS),
                };
                vec![Css(css), Text { scope: ".bn-web-table-row", any_of: words }]
            }
            Control::AvailableBalance => vec![
                Css("[class*=\"可用\"]"),
                Css("[class*=\"Available\"]"),
                Text { scope: "div", any_of: BALANCE_WORDS },
            ],
        }
    }

    /// The chain as adapter-ready lookups.
    pub fn lookups(&self) -> Vec<Lookup> {
        self.strategies()
            .into_iter()
            .enumerate()
            .map(|(rank, strategy)| Lookup {
                control: *self,
                strategy,
                rank,
            })
            .collect()
    }
}

/// Walk `control`'s strategies in order and return the first element found.
///
/// An adapter error on one strategy counts as a miss; the next strategy
/// is still tried.
pub async fn locate(ui: &dyn UiAutomation, control: Control) -> Option<ElementHandle> {
    for lookup in control.lookups() {
        match ui.find_control(&lookup).await {
            Ok(Some(handle)) => {
                debug!(control = %control, strategy = %lookup.strategy, rank = lookup.rank, "Control located");
                return Some(handle);
            }
            Ok(None) => {}
            Err(e) => {
                debug!(control = %control, strategy = %lookup.strategy, error = %e, "Lookup strategy failed");
            }
        }
    }
    debug!(control = %control, "Control not found by any strategy");
    None
}

/// Like `locate`, but returns every element matched by the first strategy
/// that matches anything.
pub async fn locate_all(ui: &dyn UiAutomation, control: Control) -> Result<Vec<ElementHandle>> {
    let mut last_error = None;
    for lookup in control.lookups() {
        match ui.find_all(&lookup).await {
            Ok(found) if !found.is_empty() => return Ok(found),
            Ok(_) => {}
            Err(e) => {
                debug!(control = %control, strategy = %lookup.strategy, error = %e, "Lookup strategy failed");
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) => Err(e.context(format!("Failed to look up {control}"))),
        None => Ok(Vec::new()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
