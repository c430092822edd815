//! External API clients: brokerage and the quality-scoring model.

pub mod broker;
pub mod scoring;

pub use broker::{
    BracketLegs, BracketOrderRequest, BrokerOrder, BrokerPosition, Brokerage, FillActivity,
    MarketClock, Quote, RestBroker,
};
pub use scoring::{Evaluation, HttpScoringClient, ScoreCandidate, ScoreFailure, ScoringModel, SideEval};
