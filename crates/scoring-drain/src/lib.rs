//! AI scoring drain.
//!
//! Claims PENDING signals, scores them against a wall-clock deadline with a
//! fixed-width worker pool, and applies results under the scored-signal write
//! guard. A process-wide circuit breaker short-circuits calls to a failing
//! model for a cooldown window.

pub mod breaker;
pub mod drain;
pub mod qualify;
pub mod retry;

pub use breaker::{BreakerConfig, ScoringBreaker};
pub use drain::{Drain, DrainConfig, DrainOptions};
pub use qualify::{qualify, QualifyConfig, Qualification};
pub use retry::RetryPolicy;
