//! Safety gate.
//!
//! One-shot preconditions checked before a session starts, and the lighter
//! runtime checks made at the top of every loop iteration.

use std::sync::Arc;
use tracing::debug;

use crate::activity::ActivityLog;
use crate::automation::{locate, Control, UiAutomation};
use crate::types::TraderError;

pub struct SafetyGate {
    ui: Arc<dyn UiAutomation>,
    activity: ActivityLog,
    location_pattern: String,
}

impl SafetyGate {
    pub fn new(ui: Arc<dyn UiAutomation>, activity: ActivityLog, location_pattern: impl Into<String>) -> Self {
        Self {
            ui,
            activity,
            location_pattern: location_pattern.into(),
        }
    }

    /// Verify the page is fit for trading. Each failure is logged with its
    /// reason and refuses the start.
    pub async fn check_preconditions(&self) -> Result<(), TraderError> {
        if !self.ui.current_location_matches(&self.location_pattern).await {
            return Err(self.refuse(format!(
                "not on the trading page (expected a location containing '{}')",
                self.location_pattern
            )));
        }

        if locate(self.ui.as_ref(), Control::LoginPrompt).await.is_some() {
            return Err(self.refuse("not logged in, please log in first".to_string()));
        }

        if locate(self.ui.as_ref(), Control::TradingPanel).await.is_none() {
            return Err(self.refuse("trading interface not found, refresh the page".to_string()));
        }

        if !self.ui.is_online().await {
            return Err(self.refuse("network connection is down".to_string()));
        }

        self.activity.success("Safety checks passed");
        Ok(())
    }

    /// Cheap per-iteration check. `false` means wait and try again.
    pub async fn check_runtime(&self) -> bool {
        if !self.ui.is_online().await {
            self.activity.error("Network connection lost, waiting to reconnect...");
            return false;
        }
        if !self.ui.current_location_matches(&self.location_pattern).await {
            self.activity.error("Page has left the trading interface");
            return false;
        }
        debug!("Runtime checks passed");
        true
    }

    fn refuse(&self, reason: String) -> TraderError {
        self.activity.error(format!("Safety check failed: {reason}"));
        TraderError::Precondition(reason)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
