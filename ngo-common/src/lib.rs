//! # NGO Site Common Library
//!
//! Shared code for the NGO site back-office services:
//! - Error type
//! - Configuration loading and root folder resolution
//! - SQLite bootstrap and schema migrations
//! - Event types (MediaEvent) and the broadcast EventBus
//! - SSE helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
