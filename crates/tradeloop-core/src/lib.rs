//! Tradeloop Core Library
//!
//! Shared types, broker/scoring clients, and ledger/coordination stores for
//! the tradeloop trading backend.

pub mod api;
pub mod config;
pub mod coord;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Error, Result};
