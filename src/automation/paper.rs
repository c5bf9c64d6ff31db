//! Paper trading page.
//!
//! An in-memory stand-in for the host trading page. It answers the
//! preferred lookup strategy for each control, keeps quote and base
//! balances, and fills orders after a configurable number of order-table
//! reads. Used by the binary when no live browser adapter is linked, and
//! by tests that want a well-behaved page.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{Control, ElementHandle, Lookup, UiAutomation};
use crate::types::Side;

/// Location reported by the paper page.
pub const PAPER_LOCATION: &str = "https://www.binance.com/zh-CN/alpha/bsc/paper";

const TAB_BUY: &str = "tab-buy";
const TAB_SELL: &str = "tab-sell";
const PANEL: &str = "panel";
const TOTAL: &str = "total";
const SUBMIT_BUY: &str = "submit-buy";
const SUBMIT_SELL: &str = "submit-sell";
const SLIDER: &str = "slider";
const DIALOG: &str = "dialog";
const DIALOG_CONFIRM: &str = "dialog-confirm";
const BALANCE_QUOTE: &str = "balance-quote";
const BALANCE_BASE: &str = "balance-base";
const ORDER_PREFIX: &str = "order-";

#[derive(Debug, Clone)]
struct PaperOrder {
    id: u64,
    side: Side,
    quantity: Decimal,
    polls_left: u32,
}

#[derive(Debug)]
struct PaperState {
    online: bool,
    location: String,
    active_tab: Side,
    total_input: String,
    slider_pct: u32,
    quote_balance: Decimal,
    base_balance: Decimal,
    orders: Vec<PaperOrder>,
    pending_dialog: Option<Side>,
    next_order_id: u64,
    fills: u64,
}

/// Simulated trading page.
pub struct PaperPage {
    quote_currency: String,
    base_asset: String,
    price: Decimal,
    fill_after_polls: u32,
    confirm_dialogs: bool,
    state: Mutex<PaperState>,
}

impl PaperPage {
    /// A page holding `quote_balance` of `quote_currency`, quoting the base
    /// asset at `price`. Orders fill on the first order-table read.
    pub fn new(quote_currency: &str, quote_balance: Decimal, price: Decimal) -> Self {
        Self {
            quote_currency: quote_currency.to_string(),
            base_asset: "ALPHA".to_string(),
            price,
            fill_after_polls: 1,
            confirm_dialogs: false,
            state: Mutex::new(PaperState {
                online: true,
                location: PAPER_LOCATION.to_string(),
                active_tab: Side::Buy,
                total_input: String::new(),
                slider_pct: 0,
                quote_balance,
                base_balance: Decimal::ZERO,
                orders: Vec::new(),
                pending_dialog: None,
                next_order_id: 1,
                fills: 0,
            }),
        }
    }

    /// Orders stay open for `polls` order-table reads before filling.
    pub fn with_fill_delay(mut self, polls: u32) -> Self {
        self.fill_after_polls = polls.max(1);
        self
    }

    /// Show a confirmation dialog after each submit; the order is only
    /// placed once the dialog is confirmed.
    pub fn with_confirm_dialogs(mut self, enabled: bool) -> Self {
        self.confirm_dialogs = enabled;
        self
    }

    pub fn seed_position(&self, base: Decimal) {
        self.state().base_balance = base;
    }

    pub fn set_online(&self, online: bool) {
        self.state().online = online;
    }

    pub fn set_location(&self, location: &str) {
        self.state().location = location.to_string();
    }

    pub fn quote_balance(&self) -> Decimal {
        self.state().quote_balance
    }

    pub fn base_balance(&self) -> Decimal {
        self.state().base_balance
    }

    pub fn active_tab(&self) -> Side {
        self.state().active_tab
    }

    pub fn open_orders(&self) -> usize {
        self.state().orders.len()
    }

    /// Number of orders filled so far.
    pub fn fills(&self) -> u64 {
        self.state().fills
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle_for(&self, control: Control, state: &PaperState) -> Option<&'static str> {
        match control {
            Control::TradingPanel => Some(PANEL),
            Control::LoginPrompt => None,
            Control::Tab(Side::Buy) => Some(TAB_BUY),
            Control::Tab(Side::Sell) => Some(TAB_SELL),
            Control::TotalAmountInput => Some(TOTAL),
            Control::SubmitButton(Side::Buy) => Some(SUBMIT_BUY),
            Control::SubmitButton(Side::Sell) => Some(SUBMIT_SELL),
            Control::QuantitySlider => Some(SLIDER),
            Control::MaxQuantityButton => None,
            Control::ConfirmDialog => state.pending_dialog.map(|_| DIALOG),
            Control::DialogConfirmButton(side) => {
                (state.pending_dialog == Some(side)).then_some(DIALOG_CONFIRM)
            }
            Control::OpenOrderRow(_) | Control::AvailableBalance => None,
        }
    }

    fn buy_total(&self, state: &PaperState) -> Option<Decimal> {
        let total: Decimal = state.total_input.trim().parse().ok()?;
        (total > Decimal::ZERO && total <= state.quote_balance).then_some(total)
    }

    fn sell_quantity(&self, state: &PaperState) -> Decimal {
        (state.base_balance * Decimal::from(state.slider_pct) / dec!(100)).round_dp(8)
    }

    fn submit(&self, side: Side, state: &mut PaperState) {
        if self.confirm_dialogs {
            state.pending_dialog = Some(side);
        } else {
            self.place(side, state);
        }
    }

    fn place(&self, side: Side, state: &mut PaperState) {
        let quantity = match side {
            Side::Buy => {
                let Some(total) = self.buy_total(state) else { return };
                state.quote_balance -= total;
                (total / self.price).round_dp(8)
            }
            Side::Sell => {
                let quantity = self.sell_quantity(state);
                if quantity.is_zero() {
                    return;
                }
                state.base_balance -= quantity;
                quantity
            }
        };
        let id = state.next_order_id;
        state.next_order_id += 1;
        state.orders.push(PaperOrder {
            id,
            side,
            quantity,
            polls_left: self.fill_after_polls,
        });
        info!(order_id = id, side = %side, quantity = %quantity, "[PAPER] Order placed");
    }

    /// Advance open orders on `side` by one read and settle any that fill.
    fn age_orders(&self, side: Side, state: &mut PaperState) {
        let mut filled = Vec::new();
        for order in state.orders.iter_mut().filter(|o| o.side == side) {
            order.polls_left = order.polls_left.saturating_sub(1);
            if order.polls_left == 0 {
                filled.push(order.id);
            }
        }
        for id in filled {
            if let Some(pos) = state.orders.iter().position(|o| o.id == id) {
                let order = state.orders.remove(pos);
                match order.side {
                    Side::Buy => state.base_balance += order.quantity,
                    Side::Sell => state.quote_balance += order.quantity * self.price,
                }
                state.fills += 1;
                info!(order_id = order.id, side = %order.side, "[PAPER] Order filled");
            }
        }
    }
}

#[async_trait]
impl UiAutomation for PaperPage {
    async fn find_control(&self, lookup: &Lookup) -> Result<Option<ElementHandle>> {
        if lookup.rank != 0 {
            return Ok(None);
        }
        let state = self.state();
        Ok(self.handle_for(lookup.control, &state).map(ElementHandle::new))
    }

    async fn find_all(&self, lookup: &Lookup) -> Result<Vec<ElementHandle>> {
        if lookup.rank != 0 {
            return Ok(Vec::new());
        }
        let mut state = self.state();
        match lookup.control {
            Control::OpenOrderRow(side) => {
                self.age_orders(side, &mut state);
                Ok(state
                    .orders
                    .iter()
                    .filter(|o| o.side == side)
                    .map(|o| ElementHandle::new(format!("{ORDER_PREFIX}{}", o.id)))
                    .collect())
            }
            Control::AvailableBalance => Ok(vec![
                ElementHandle::new(BALANCE_QUOTE),
                ElementHandle::new(BALANCE_BASE),
            ]),
            other => Ok(self
                .handle_for(other, &state)
                .map(ElementHandle::new)
                .into_iter()
                .collect()),
        }
    }

    async fn click(&self, handle: &ElementHandle) -> Result<()> {
        let mut state = self.state();
        debug!(element = %handle, "[PAPER] click");
        match handle.id.as_str() {
            TAB_BUY => state.active_tab = Side::Buy,
            TAB_SELL => state.active_tab = Side::Sell,
            SUBMIT_BUY if state.active_tab == Side::Buy => self.submit(Side::Buy, &mut state),
            SUBMIT_SELL if state.active_tab == Side::Sell => self.submit(Side::Sell, &mut state),
            SUBMIT_BUY | SUBMIT_SELL => {}
            DIALOG_CONFIRM => {
                if let Some(side) = state.pending_dialog.take() {
                    self.place(side, &mut state);
                }
            }
            PANEL | TOTAL | SLIDER | DIALOG | BALANCE_QUOTE | BALANCE_BASE => {}
            other if other.starts_with(ORDER_PREFIX) => {}
            other => bail!("Unknown paper element: {other}"),
        }
        Ok(())
    }

    async fn set_value(&self, handle: &ElementHandle, value: &str) -> Result<()> {
        let mut state = self.state();
        match handle.id.as_str() {
            TOTAL => state.total_input = value.to_string(),
            SLIDER => {
                let pct: u32 = value
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("Slider value is not an integer: {value}"))?;
                state.slider_pct = pct.min(100);
            }
            other => bail!("Element {other} does not accept a value"),
        }
        Ok(())
    }

    async fn query_text(&self, handle: &ElementHandle) -> Result<String> {
        let state = self.state();
        let text = match handle.id.as_str() {
            BALANCE_QUOTE => format!("Available {} {}", state.quote_balance, self.quote_currency),
            BALANCE_BASE => format!("Available {} {}", state.base_balance, self.base_asset),
            TAB_BUY => "Buy".to_string(),
            TAB_SELL => "Sell".to_string(),
            SUBMIT_BUY => format!("Buy {}", self.base_asset),
            SUBMIT_SELL => format!("Sell {}", self.base_asset),
            DIALOG_CONFIRM => "Confirm".to_string(),
            id if id.starts_with(ORDER_PREFIX) => {
                let order_id: u64 = id[ORDER_PREFIX.len()..].parse()?;
                let order = state
                    .orders
                    .iter()
                    .find(|o| o.id == order_id)
                    .ok_or_else(|| anyhow!("Order row {order_id} is gone"))?;
                format!("{} {} New {}", self.base_asset, order.side, order.quantity)
            }
            _ => String::new(),
        };
        Ok(text)
    }

    async fn attribute(&self, handle: &ElementHandle, name: &str) -> Result<Option<String>> {
        let state = self.state();
        let value = match (handle.id.as_str(), name) {
            (TAB_BUY, "aria-selected") => Some((state.active_tab == Side::Buy).to_string()),
            (TAB_SELL, "aria-selected") => Some((state.active_tab == Side::Sell).to_string()),
            (SUBMIT_BUY, "disabled") => self.buy_total(&state).is_none().then(String::new),
            (SUBMIT_SELL, "disabled") => self.sell_quantity(&state).is_zero().then(String::new),
            (SLIDER, "max") => Some("100".to_string()),
            (SLIDER, "value") => Some(state.slider_pct.to_string()),
            _ => None,
        };
        Ok(value)
    }

    async fn is_online(&self) -> bool {
        self.state().online
    }

    async fn current_location_matches(&self, pattern: &str) -> bool {
        self.state().location.contains(pattern)
    }

    fn name(&self) -> &str {
        "paper"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
