//! Shared types for the ALPHA-TRADER agent.
//!
//! These types form the data model used across all modules.
//! They are kept free of engine logic so that automation, engine,
//! session, and dashboard modules can depend on them without cycles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest amount (in quote currency) accepted by `start`.
pub const MIN_TRADE_AMOUNT: Decimal = dec!(0.1);

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Position of the trading cycle state machine.
///
/// Exactly one value is active at a time. `EmergencyStop` and `AutoStop`
/// resolve back to `Idle` once liquidation has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    Buying,
    MonitoringBuy,
    Selling,
    MonitoringSell,
    EmergencyStop,
    AutoStop,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Idle => "idle",
            CycleState::Buying => "buying",
            CycleState::MonitoringBuy => "monitoring_buy",
            CycleState::Selling => "selling",
            CycleState::MonitoringSell => "monitoring_sell",
            CycleState::EmergencyStop => "emergency_stop",
            CycleState::AutoStop => "auto_stop",
        };
        write!(f, "{s}")
    }
}

/// How a single order-completion wait resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderWaitOutcome {
    Completed,
    CancelledByStop,
    TimedOut,
}

impl fmt::Display for OrderWaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderWaitOutcome::Completed => write!(f, "completed"),
            OrderWaitOutcome::CancelledByStop => write!(f, "cancelled-by-stop"),
            OrderWaitOutcome::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// Why a run of the trading loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// `stop()` was called.
    Stopped,
    /// The consecutive-error budget was exhausted.
    ErrorBudget,
    /// The trade-count limit was reached and the position liquidated.
    AutoStop,
    /// `emergency_stop()` was called.
    EmergencyStop,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Stopped => write!(f, "stopped"),
            EndReason::ErrorBudget => write!(f, "too many consecutive errors"),
            EndReason::AutoStop => write!(f, "trade limit reached"),
            EndReason::EmergencyStop => write!(f, "emergency stop"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Live trading session. Owned by the session controller and reset
/// whenever a run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Option<String>,
    pub running: bool,
    /// Quote-currency amount spent on each buy.
    pub amount: Decimal,
    /// 0 means unlimited.
    pub max_trade_count: u32,
    pub current_trade_count: u32,
    pub state: CycleState,
    pub consecutive_errors: u32,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: None,
            running: false,
            amount: Decimal::ZERO,
            max_trade_count: 0,
            current_trade_count: 0,
            state: CycleState::Idle,
            consecutive_errors: 0,
            started_at: None,
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = if self.max_trade_count == 0 {
            "∞".to_string()
        } else {
            self.max_trade_count.to_string()
        };
        write!(
            f,
            "{} | amount={} | trades={}/{} | errors={}",
            self.state, self.amount, self.current_trade_count, limit, self.consecutive_errors,
        )
    }
}

impl Session {
    /// Start a fresh session with the given parameters.
    pub fn begin(amount: Decimal, max_trade_count: u32) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            running: true,
            amount,
            max_trade_count,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Trades left before the limit is hit. `None` when unlimited.
    pub fn remaining_trades(&self) -> Option<u32> {
        if self.max_trade_count == 0 {
            None
        } else {
            Some(self.max_trade_count.saturating_sub(self.current_trade_count))
        }
    }

    /// Whether the trade-count limit has been reached.
    pub fn limit_reached(&self) -> bool {
        self.remaining_trades() == Some(0)
    }

    /// Drop back to an idle, empty session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Outcome of the most recent run, kept after the session itself is reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub ended_by: EndReason,
    pub trades_completed: u32,
    pub consecutive_errors: u32,
    pub ended_at: DateTime<Utc>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ended by {} after {} trade(s) (errors={})",
            self.ended_by, self.trades_completed, self.consecutive_errors,
        )
    }
}

/// Result of a liquidation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiquidationReport {
    /// No position was found after the balance re-checks.
    NothingToSell,
    /// The position was sold and the balance reads zero.
    Sold { balance: Decimal },
    /// A balance is still showing after the sell completed.
    Residual { remaining: Decimal },
    /// Liquidation could not be carried out.
    Failed { reason: String },
}

impl LiquidationReport {
    /// Whether the account is believed to be flat afterwards.
    pub fn is_flat(&self) -> bool {
        matches!(self, LiquidationReport::NothingToSell | LiquidationReport::Sold { .. })
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ALPHA-TRADER.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TraderError {
    #[error("Invalid amount: {0}")]
    Validation(String),

    #[error("Safety check failed: {0}")]
    Precondition(String),

    #[error("UI action failed: {0}")]
    TransientUi(String),

    #[error("Cycle failed: {0}")]
    Cycle(String),

    #[error("Liquidation failed: {0}")]
    Liquidation(String),

    #[error("A trading session is already running")]
    AlreadyRunning,

    #[error("Another order monitor is already polling")]
    PollBusy,
}

/// Parse a user-supplied amount, rejecting anything below the minimum.
pub fn parse_amount(input: &str) -> Result<Decimal, TraderError> {
    let trimmed = input.trim();
    let amount: Decimal = trimmed
        .parse()
        .map_err(|_| TraderError::Validation(format!("'{trimmed}' is not a number")))?;
    validate_amount(amount)?;
    Ok(amount)
}

/// Reject amounts below `MIN_TRADE_AMOUNT`.
pub fn validate_amount(amount: Decimal) -> Result<(), TraderError> {
    if amount < MIN_TRADE_AMOUNT {
        return Err(TraderError::Validation(format!(
            "{amount} is below the minimum of {MIN_TRADE_AMOUNT}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
