//! ALPHA-TRADER — Autonomous buy/sell cycle driver
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod activity;
pub mod automation;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod session;
pub mod storage;
pub mod types;
