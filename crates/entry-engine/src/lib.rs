//! Auto-entry decision engine.
//!
//! Converts qualifying AUTO_PENDING trades into broker bracket orders under
//! admission gates, per-ticker deduplication and per-trade locks. At most one
//! order per ticker per run, never a double submission.

pub mod bracket;
pub mod engine;
pub mod gates;
pub mod sizing;

pub use bracket::{compute_bracket, Bracket};
pub use engine::{EntryConfig, EntryEngine, EntryOptions};
pub use gates::GateReport;
pub use sizing::{size_position, Sizing};
