//! Application state shared across handlers.

use std::sync::Arc;

use entry_engine::{EntryConfig, EntryEngine};
use reconciler::{ReconcileConfig, Reconciler};
use scoring_drain::{BreakerConfig, Drain, DrainConfig, ScoringBreaker};
use tradeloop_core::api::{Brokerage, HttpScoringClient, RestBroker, ScoringModel};
use tradeloop_core::config::Config;
use tradeloop_core::coord::{CoordStore, RedisCoord};
use tradeloop_core::store::{LedgerStore, RedisLedger};

/// Shared application state: the three engines plus the trigger token.
pub struct AppState {
    pub drain: Drain,
    pub entry: EntryEngine,
    pub reconciler: Reconciler,
    /// Bearer token required on every run endpoint.
    pub run_token: String,
}

impl AppState {
    pub fn new(drain: Drain, entry: EntryEngine, reconciler: Reconciler, run_token: String) -> Self {
        Self {
            drain,
            entry,
            reconciler,
            run_token,
        }
    }

    /// Wire the engines against live redis and broker/scoring endpoints.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let ledger: Arc<dyn LedgerStore> = Arc::new(
            RedisLedger::connect(&config.redis.url, &config.redis.namespace).await?,
        );
        let coord: Arc<dyn CoordStore> = Arc::new(
            RedisCoord::connect(&config.redis.url, &config.redis.namespace).await?,
        );
        let broker: Arc<dyn Brokerage> = Arc::new(RestBroker::new(&config.broker));
        let scorer: Arc<dyn ScoringModel> = Arc::new(HttpScoringClient::new(&config.scoring));

        let drain = Drain::new(
            ledger.clone(),
            scorer.clone(),
            ScoringBreaker::new(coord.clone(), BreakerConfig::from_env()),
            DrainConfig::from_env(),
        );
        let entry = EntryEngine::new(
            ledger.clone(),
            broker.clone(),
            scorer,
            coord.clone(),
            EntryConfig::from_env(),
        );
        let reconciler = Reconciler::new(ledger, broker, coord, ReconcileConfig::from_env());

        Ok(Self::new(
            drain,
            entry,
            reconciler,
            config.auth.run_token.clone(),
        ))
    }
}
