//! Core domain types for the tradeloop backend.

pub mod run;
pub mod signal;
pub mod trade;

pub use run::*;
pub use signal::*;
pub use trade::*;
