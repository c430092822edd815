//! Configuration management for the tradeloop backend.

use crate::{Error, Result};
use std::env;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis: RedisConfig,
    pub broker: BrokerConfig,
    pub scoring: ScoringConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Key prefix so multiple deployments can share one redis.
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Trading API base URL (orders, positions, activities, clock).
    pub base_url: String,
    /// Market data base URL (quotes).
    pub data_url: String,
    pub key_id: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Model gateway endpoint for signal evaluation.
    pub url: String,
    pub api_key: String,
    /// Per-call timeout in milliseconds (callers may race a shorter one).
    pub call_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Bearer token required on all run-trigger endpoints.
    pub run_token: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
                namespace: env::var("REDIS_NAMESPACE").unwrap_or_else(|_| "tradeloop".to_string()),
            },
            broker: BrokerConfig {
                base_url: env::var("BROKER_BASE_URL")
                    .unwrap_or_else(|_| "https://paper-api.alpaca.markets".to_string()),
                data_url: env::var("BROKER_DATA_URL")
                    .unwrap_or_else(|_| "https://data.alpaca.markets".to_string()),
                key_id: env::var("BROKER_KEY_ID").map_err(|_| Error::Config {
                    message: "BROKER_KEY_ID environment variable not set".to_string(),
                })?,
                secret_key: env::var("BROKER_SECRET_KEY").map_err(|_| Error::Config {
                    message: "BROKER_SECRET_KEY environment variable not set".to_string(),
                })?,
            },
            scoring: ScoringConfig {
                url: env::var("SCORING_URL").map_err(|_| Error::Config {
                    message: "SCORING_URL environment variable not set".to_string(),
                })?,
                api_key: env::var("SCORING_API_KEY").unwrap_or_default(),
                call_timeout_ms: env::var("SCORING_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(25_000),
            },
            auth: AuthConfig {
                run_token: env::var("RUN_TOKEN").map_err(|_| Error::Config {
                    message: "RUN_TOKEN environment variable not set".to_string(),
                })?,
            },
        })
    }
}
