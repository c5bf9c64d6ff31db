//! UI automation seam.
//!
//! Defines the `UiAutomation` trait through which the engine reads and
//! drives the trading page, plus:
//! - `controls`: the catalogue of page controls and their ordered lookup strategies
//! - `probe`: the pluggable order-completion predicate
//! - `paper`: an in-memory simulated trading page

pub mod controls;
pub mod paper;
pub mod probe;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

pub use controls::{locate, locate_all, Control, Lookup, Strategy};

/// Opaque reference to an element resolved by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// Abstraction over the host trading page.
///
/// Implementors resolve lookups to elements and manipulate them. The engine
/// never assumes a specific markup: it hands the adapter one `Lookup` at a
/// time, in priority order, and takes the first hit.
#[async_trait]
pub trait UiAutomation: Send + Sync {
    /// Resolve a single lookup strategy to the first matching element.
    async fn find_control(&self, lookup: &Lookup) -> Result<Option<ElementHandle>>;

    /// Resolve a lookup strategy to every matching element.
    async fn find_all(&self, lookup: &Lookup) -> Result<Vec<ElementHandle>>;

    /// Activate an element (mouse click equivalent).
    async fn click(&self, handle: &ElementHandle) -> Result<()>;

    /// Replace an input's value.
    ///
    /// Must dispatch the input and change notifications the host page's
    /// reactive framework listens for, otherwise the page keeps its old value.
    async fn set_value(&self, handle: &ElementHandle, value: &str) -> Result<()>;

    /// Visible text content of an element.
    async fn query_text(&self, handle: &ElementHandle) -> Result<String>;

    /// Attribute value, or `None` if the attribute is absent.
    async fn attribute(&self, handle: &ElementHandle, name: &str) -> Result<Option<String>>;

    /// Whether the browser reports network connectivity.
    async fn is_online(&self) -> bool;

    /// Whether the current page location contains `pattern`.
    async fn current_location_matches(&self, pattern: &str) -> bool;

    /// Adapter name for logging and identification.
    fn name(&self) -> &str;
}
