//! Mock trading page for integration testing.
//!
//! A scripted `UiAutomation` implementation: every control can be moved to
//! a fallback lookup rank or removed, clicks can be made to fail, and
//! fills can be delayed, withheld, or made to leave dust behind. All state
//! is in-memory and every adapter call is recorded.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use alpha_trader::automation::{Control, ElementHandle, Lookup, UiAutomation};
use alpha_trader::types::Side;

pub const LOCATION: &str = "https://www.binance.com/zh-CN/alpha/bsc/0xmock";
pub const PATTERN: &str = "binance.com/zh-CN/alpha/";

#[derive(Debug, Clone)]
struct MockOrder {
    id: u64,
    side: Side,
    quantity: Decimal,
    polls_left: u32,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<String>,
    online: bool,
    location: String,
    logged_in: bool,
    ranks: HashMap<Control, usize>,
    missing: HashSet<Control>,
    active_tab: Side,
    tabs_respond: bool,
    total: String,
    slider_pct: u32,
    failing_submits: u32,
    dialogs: bool,
    dialog_confirmable: bool,
    open_dialog: Option<Side>,
    quote: Decimal,
    position: Decimal,
    orders: Vec<MockOrder>,
    /// Reads of the order table before an order fills; 0 never fills.
    fill_after: u32,
    credit_buys: bool,
    sell_dust: Decimal,
    next_id: u64,
    buys_placed: u32,
    sells_placed: u32,
}

/// Scripted trading page. Prices are fixed at 1 quote per unit.
#[derive(Clone)]
pub struct MockPage {
    state: Arc<Mutex<MockState>>,
}

impl MockPage {
    pub fn new(quote: Decimal) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                online: true,
                location: LOCATION.to_string(),
                logged_in: true,
                ranks: HashMap::new(),
                missing: HashSet::new(),
                active_tab: Side::Buy,
                tabs_respond: true,
                total: String::new(),
                slider_pct: 0,
                failing_submits: 0,
                dialogs: false,
                dialog_confirmable: true,
                open_dialog: None,
                quote,
                position: Decimal::ZERO,
                orders: Vec::new(),
                fill_after: 1,
                credit_buys: true,
                sell_dust: Decimal::ZERO,
                next_id: 1,
                buys_placed: 0,
                sells_placed: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    // -- Scripting ----------------------------------------------------------

    /// Answer lookups for `control` only at `rank`.
    pub fn answer_at(&self, control: Control, rank: usize) {
        self.state().ranks.insert(control, rank);
    }

    pub fn remove(&self, control: Control) {
        self.state().missing.insert(control);
    }

    pub fn set_online(&self, online: bool) {
        self.state().online = online;
    }

    pub fn set_location(&self, location: &str) {
        self.state().location = location.to_string();
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.state().logged_in = logged_in;
    }

    /// Clicking a tab no longer activates it.
    pub fn freeze_tabs(&self) {
        self.state().tabs_respond = false;
    }

    /// The next `n` submit clicks fail.
    pub fn fail_submits(&self, n: u32) {
        self.state().failing_submits = n;
    }

    pub fn with_dialogs(&self, confirmable: bool) {
        let mut s = self.state();
        s.dialogs = true;
        s.dialog_confirmable = confirmable;
    }

    pub fn fill_after(&self, reads: u32) {
        self.state().fill_after = reads;
    }

    pub fn never_fill(&self) {
        self.state().fill_after = 0;
    }

    /// Buy fills stop crediting the position.
    pub fn withhold_buy_credit(&self) {
        self.state().credit_buys = false;
    }

    /// Each sell fill leaves `dust` of the position behind.
    pub fn leave_dust(&self, dust: Decimal) {
        self.state().sell_dust = dust;
    }

    pub fn seed_position(&self, position: Decimal) {
        self.state().position = position;
    }

    // -- Inspection ---------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn clicks_on(&self, id: &str) -> usize {
        let target = format!("click {id}");
        self.state().calls.iter().filter(|c| **c == target).count()
    }

    pub fn buys_placed(&self) -> u32 {
        self.state().buys_placed
    }

    pub fn sells_placed(&self) -> u32 {
        self.state().sells_placed
    }

    pub fn position(&self) -> Decimal {
        self.state().position
    }

    pub fn quote(&self) -> Decimal {
        self.state().quote
    }

    pub fn active_tab(&self) -> Side {
        self.state().active_tab
    }

    pub fn total_input(&self) -> String {
        self.state().total.clone()
    }
}

fn element_id(control: Control) -> &'static str {
    match control {
        Control::TradingPanel => "panel",
        Control::LoginPrompt => "login",
        Control::Tab(Side::Buy) => "tab-buy",
        Control::Tab(Side::Sell) => "tab-sell",
        Control::TotalAmountInput => "total",
        Control::SubmitButton(Side::Buy) => "submit-buy",
        Control::SubmitButton(Side::Sell) => "submit-sell",
        Control::QuantitySlider => "slider",
        Control::MaxQuantityButton => "max",
        Control::ConfirmDialog => "dialog",
        Control::DialogConfirmButton(_) => "dialog-confirm",
        Control::OpenOrderRow(_) => "order",
        Control::AvailableBalance => "balance",
    }
}

impl MockState {
    fn answers(&self, lookup: &Lookup) -> bool {
        if self.missing.contains(&lookup.control) {
            return false;
        }
        let rank = self.ranks.get(&lookup.control).copied().unwrap_or(0);
        if lookup.rank != rank {
            return false;
        }
        match lookup.control {
            Control::LoginPrompt => !self.logged_in,
            Control::ConfirmDialog => self.open_dialog.is_some(),
            Control::DialogConfirmButton(side) => {
                self.dialog_confirmable && self.open_dialog == Some(side)
            }
            _ => true,
        }
    }

    fn buy_total(&self) -> Option<Decimal> {
        let total: Decimal = self.total.trim().parse().ok()?;
        (total > Decimal::ZERO && total <= self.quote).then_some(total)
    }

    fn sell_quantity(&self) -> Decimal {
        self.position * Decimal::from(self.slider_pct) / Decimal::from(100)
    }

    fn submit(&mut self, side: Side) {
        if self.active_tab != side {
            return;
        }
        if self.dialogs {
            self.open_dialog = Some(side);
        } else {
            self.place(side);
        }
    }

    fn place(&mut self, side: Side) {
        let quantity = match side {
            Side::Buy => {
                let Some(total) = self.buy_total() else { return };
                self.quote -= total;
                self.buys_placed += 1;
                total
            }
            Side::Sell => {
                let quantity = self.sell_quantity();
                if quantity.is_zero() {
                    return;
                }
                self.position -= quantity;
                self.sells_placed += 1;
                quantity
            }
        };
        let id = self.next_id;
        self.next_id += 1;
        self.orders.push(MockOrder {
            id,
            side,
            quantity,
            polls_left: self.fill_after,
        });
    }

    fn age(&mut self, side: Side) {
        if self.fill_after == 0 {
            return;
        }
        let mut filled = Vec::new();
        for order in self.orders.iter_mut().filter(|o| o.side == side) {
            order.polls_left = order.polls_left.saturating_sub(1);
            if order.polls_left == 0 {
                filled.push(order.clone());
            }
        }
        self.orders.retain(|o| !filled.iter().any(|f| f.id == o.id));
        for order in filled {
            match order.side {
                Side::Buy if self.credit_buys => self.position += order.quantity,
                Side::Buy => {}
                Side::Sell => {
                    self.quote += order.quantity;
                    self.position += self.sell_dust;
                }
            }
        }
    }
}

#[async_trait]
impl UiAutomation for MockPage {
    async fn find_control(&self, lookup: &Lookup) -> Result<Option<ElementHandle>> {
        let mut s = self.state();
        s.calls.push(format!("find {}#{}", lookup.control, lookup.rank));
        Ok(s.answers(lookup)
            .then(|| ElementHandle::new(element_id(lookup.control))))
    }

    async fn find_all(&self, lookup: &Lookup) -> Result<Vec<ElementHandle>> {
        let mut s = self.state();
        s.calls.push(format!("find_all {}#{}", lookup.control, lookup.rank));
        if !s.answers(lookup) {
            return Ok(Vec::new());
        }
        match lookup.control {
            Control::OpenOrderRow(side) => {
                s.age(side);
                Ok(s.orders
                    .iter()
                    .filter(|o| o.side == side)
                    .map(|o| ElementHandle::new(format!("order-{}", o.id)))
                    .collect())
            }
            Control::AvailableBalance => Ok(vec![
                ElementHandle::new("balance-quote"),
                ElementHandle::new("balance-base"),
            ]),
            other => Ok(vec![ElementHandle::new(element_id(other))]),
        }
    }

    async fn click(&self, handle: &ElementHandle) -> Result<()> {
        let mut s = self.state();
        s.calls.push(format!("click {}", handle.id));
        match handle.id.as_str() {
            "tab-buy" if s.tabs_respond => s.active_tab = Side::Buy,
            "tab-sell" if s.tabs_respond => s.active_tab = Side::Sell,
            "submit-buy" | "submit-sell" if s.failing_submits > 0 => {
                s.failing_submits -= 1;
                bail!("element is detached from the page");
            }
            "submit-buy" => s.submit(Side::Buy),
            "submit-sell" => s.submit(Side::Sell),
            "max" => s.slider_pct = 100,
            "dialog-confirm" => {
                if let Some(side) = s.open_dialog.take() {
                    s.place(side);
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn set_value(&self, handle: &ElementHandle, value: &str) -> Result<()> {
        let mut s = self.state();
        s.calls.push(format!("set {}={}", handle.id, value));
        match handle.id.as_str() {
            "total" => s.total = value.to_string(),
            "slider" => {
                s.slider_pct = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("bad slider value {value}"))?
                    .min(100)
            }
            other => bail!("{other} does not take a value"),
        }
        Ok(())
    }

    async fn query_text(&self, handle: &ElementHandle) -> Result<String> {
        let mut s = self.state();
        s.calls.push(format!("text {}", handle.id));
        let text = match handle.id.as_str() {
            "balance-quote" => format!("Available {} USDT", s.quote),
            "balance-base" => format!("Available {} ALPHA", s.position),
            id if id.starts_with("order-") => {
                let order_id: u64 = id["order-".len()..].parse()?;
                let order = s
                    .orders
                    .iter()
                    .find(|o| o.id == order_id)
                    .ok_or_else(|| anyhow!("order row {order_id} vanished"))?;
                format!("ALPHA {} New {}", order.side, order.quantity)
            }
            _ => String::new(),
        };
        Ok(text)
    }

    async fn attribute(&self, handle: &ElementHandle, name: &str) -> Result<Option<String>> {
        let mut s = self.state();
        s.calls.push(format!("attr {}.{}", handle.id, name));
        let value = match (handle.id.as_str(), name) {
            ("tab-buy", "aria-selected") => Some((s.active_tab == Side::Buy).to_string()),
            ("tab-sell", "aria-selected") => Some((s.active_tab == Side::Sell).to_string()),
            ("submit-buy", "disabled") => s.buy_total().is_none().then(String::new),
            ("submit-sell", "disabled") => s.sell_quantity().is_zero().then(String::new),
            ("slider", "max") => Some("100".to_string()),
            _ => None,
        };
        Ok(value)
    }

    async fn is_online(&self) -> bool {
        let mut s = self.state();
        s.calls.push("is_online".to_string());
        s.online
    }

    async fn current_location_matches(&self, pattern: &str) -> bool {
        let mut s = self.state();
        s.calls.push("location".to_string());
        s.location.contains(pattern)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
