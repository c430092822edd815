//! Error types for the tradeloop backend.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Broker API error: {message}")]
    Broker { message: String, status: Option<u16> },

    #[error("Broker order {order_id} not found")]
    BrokerNotFound { order_id: String },

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Invalid trade: {0}")]
    InvalidTrade(String),
}

impl Error {
    /// True when the failure means "the broker definitively has no such
    /// record", as opposed to "the lookup itself failed".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::BrokerNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
