//! Action executor.
//!
//! Performs the individual UI steps of a buy or sell (tab switch, amount
//! injection, size maximisation, submit, confirmation dialog) and wraps
//! whole sequences in a bounded retry.

use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{pause, CycleTimings};
use crate::activity::ActivityLog;
use crate::automation::{locate, Control, ElementHandle, UiAutomation};
use crate::types::{Side, TraderError};

/// Map an adapter error into a retryable UI failure.
fn ui_failure(what: &str, e: anyhow::Error) -> TraderError {
    TraderError::TransientUi(format!("{what}: {e:#}"))
}

#[derive(Clone)]
pub struct ActionExecutor {
    ui: Arc<dyn UiAutomation>,
    activity: ActivityLog,
    timings: CycleTimings,
}

impl ActionExecutor {
    pub fn new(ui: Arc<dyn UiAutomation>, activity: ActivityLog, timings: CycleTimings) -> Self {
        Self { ui, activity, timings }
    }

    // -- Retry wrapper ----------------------------------------------------

    /// Run `action` until it succeeds, at most `max_retries` times, waiting
    /// `retry_delay` between attempts. Every failure is logged with its
    /// attempt index. Exhaustion escalates to `TraderError::Cycle`.
    ///
    /// Cancellation stops further attempts and returns the last failure.
    pub async fn perform_with_retry<F, Fut>(
        &self,
        label: &str,
        max_retries: u32,
        retry_delay: Duration,
        cancel: &CancellationToken,
        mut action: F,
    ) -> Result<(), TraderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), TraderError>>,
    {
        let max_retries = max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match action().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.activity
                        .error(format!("{label} failed ({attempt}/{max_retries}): {e}"));
                    if attempt >= max_retries {
                        return Err(TraderError::Cycle(format!(
                            "{label} failed after {max_retries} attempts: {e}"
                        )));
                    }
                    if !pause(cancel, retry_delay).await {
                        debug!(label, attempt, "Retry abandoned, session stopped");
                        return Err(e);
                    }
                }
            }
        }
    }

    pub async fn execute_buy_with_retry(
        &self,
        amount: Decimal,
        cancel: &CancellationToken,
    ) -> Result<(), TraderError> {
        self.perform_with_retry(
            "Buy",
            self.timings.max_action_retries,
            self.timings.retry_delay(),
            cancel,
            move || self.execute_buy(amount),
        )
        .await
    }

    pub async fn execute_sell_with_retry(&self, cancel: &CancellationToken) -> Result<(), TraderError> {
        self.perform_with_retry(
            "Sell",
            self.timings.max_action_retries,
            self.timings.retry_delay(),
            cancel,
            move || self.execute_sell(),
        )
        .await
    }

    // -- Sequences --------------------------------------------------------

    /// Buy tab → amount → buy button → optional confirmation.
    pub async fn execute_buy(&self, amount: Decimal) -> Result<(), TraderError> {
        self.activity.info("Starting buy");
        self.switch_tab(Side::Buy).await?;
        self.set_total_amount(amount).await?;
        self.click_submit(Side::Buy).await?;
        self.dismiss_confirmation(Side::Buy).await?;
        self.activity.success("Buy order submitted");
        Ok(())
    }

    /// Sell tab → max size → sell button → optional confirmation.
    pub async fn execute_sell(&self) -> Result<(), TraderError> {
        self.activity.info("Starting sell");
        self.switch_tab(Side::Sell).await?;
        self.maximize_quantity().await?;
        self.click_submit(Side::Sell).await?;
        self.dismiss_confirmation(Side::Sell).await?;
        self.activity.success("Sell order submitted");
        Ok(())
    }

    // -- Steps ------------------------------------------------------------

    /// Make `side`'s tab the active one, verifying by polling its
    /// selected/active attributes.
    pub async fn switch_tab(&self, side: Side) -> Result<(), TraderError> {
        let tab = locate(self.ui.as_ref(), Control::Tab(side))
            .await
            .ok_or_else(|| TraderError::TransientUi(format!("{side} tab not found")))?;

        if self.is_tab_active(&tab).await {
            debug!(side = %side, "Tab already active");
            return Ok(());
        }

        self.ui
            .click(&tab)
            .await
            .map_err(|e| ui_failure(&format!("clicking {side} tab"), e))?;

        for attempt in 1..=self.timings.tab_verify_attempts {
            tokio::time::sleep(self.timings.tab_verify_interval()).await;
            if self.is_tab_active(&tab).await {
                debug!(side = %side, attempt, "Tab activation verified");
                self.activity.info(format!("Switched to {side} tab"));
                return Ok(());
            }
        }

        Err(TraderError::TransientUi(format!(
            "{side} tab did not become active after {} checks",
            self.timings.tab_verify_attempts
        )))
    }

    async fn is_tab_active(&self, tab: &ElementHandle) -> bool {
        if self.attr(tab, "aria-selected").await.as_deref() == Some("true") {
            return true;
        }
        if self.attr(tab, "data-state").await.as_deref() == Some("active") {
            return true;
        }
        self.attr(tab, "class")
            .await
            .map(|c| c.split_whitespace().any(|class| class == "active" || class.ends_with("--active")))
            .unwrap_or(false)
    }

    /// Inject the quote-currency total into the buy form.
    pub async fn set_total_amount(&self, amount: Decimal) -> Result<(), TraderError> {
        let input = locate(self.ui.as_ref(), Control::TotalAmountInput)
            .await
            .ok_or_else(|| TraderError::TransientUi("total amount input not found".to_string()))?;

        let value = amount.normalize().to_string();
        self.ui
            .set_value(&input, &value)
            .await
            .map_err(|e| ui_failure("setting total amount", e))?;

        tokio::time::sleep(self.timings.input_settle()).await;
        self.activity.info(format!("Total amount set: {value}"));
        Ok(())
    }

    /// Press the submit button for `side`. It must exist and be enabled.
    pub async fn click_submit(&self, side: Side) -> Result<(), TraderError> {
        let button = locate(self.ui.as_ref(), Control::SubmitButton(side))
            .await
            .ok_or_else(|| TraderError::TransientUi(format!("{side} button not found")))?;

        if self.is_disabled(&button).await {
            return Err(TraderError::TransientUi(format!("{side} button is disabled")));
        }

        self.ui
            .click(&button)
            .await
            .map_err(|e| ui_failure(&format!("clicking {side} button"), e))?;

        tokio::time::sleep(self.timings.click_settle()).await;
        self.activity.success(format!("Clicked {side} button"));
        Ok(())
    }

    async fn is_disabled(&self, element: &ElementHandle) -> bool {
        self.attr(element, "disabled").await.is_some()
            || self.attr(element, "aria-disabled").await.as_deref() == Some("true")
    }

    /// Drive the sell size to 100%. Prefers the slider, falls back to a
    /// "100%"/"Max" control, and proceeds (logged) if neither exists.
    pub async fn maximize_quantity(&self) -> Result<(), TraderError> {
        if let Some(slider) = locate(self.ui.as_ref(), Control::QuantitySlider).await {
            let max = self
                .attr(&slider, "max")
                .await
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "100".to_string());
            self.ui
                .set_value(&slider, &max)
                .await
                .map_err(|e| ui_failure("moving quantity slider", e))?;
            tokio::time::sleep(self.timings.input_settle()).await;
            self.activity.info("Sell quantity set to maximum");
            return Ok(());
        }

        if let Some(button) = locate(self.ui.as_ref(), Control::MaxQuantityButton).await {
            self.ui
                .click(&button)
                .await
                .map_err(|e| ui_failure("clicking max quantity button", e))?;
            tokio::time::sleep(self.timings.input_settle()).await;
            self.activity.info("Clicked max quantity button");
            return Ok(());
        }

        self.activity
            .error("No quantity control found, selling with the current quantity");
        Ok(())
    }

    /// Confirm a post-submit dialog if one appears. Returns whether a
    /// dialog was dismissed. A dialog without a usable confirm control is
    /// a failure.
    pub async fn dismiss_confirmation(&self, side: Side) -> Result<bool, TraderError> {
        tokio::time::sleep(self.timings.dialog_wait()).await;

        if locate(self.ui.as_ref(), Control::ConfirmDialog).await.is_none() {
            debug!(side = %side, "No confirmation dialog");
            return Ok(false);
        }

        let confirm = locate(self.ui.as_ref(), Control::DialogConfirmButton(side))
            .await
            .ok_or_else(|| {
                TraderError::TransientUi(format!("{side} confirmation dialog has no confirm button"))
            })?;

        self.ui
            .click(&confirm)
            .await
            .map_err(|e| ui_failure("confirming dialog", e))?;

        self.activity.info(format!("Confirmed {side} dialog"));
        Ok(true)
    }

    async fn attr(&self, element: &ElementHandle, name: &str) -> Option<String> {
        match self.ui.attribute(element, name).await {
            Ok(value) => value,
            Err(e) => {
                warn!(element = %element, attribute = name, error = %e, "Attribute read failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
