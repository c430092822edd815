//! Broker reconciliation loop.
//!
//! Compares locally OPEN trades against the broker's authoritative orders and
//! positions, closes stale trades with computed realized P&L, mirrors broker
//! order status, and synthesizes trade records for untracked positions so the
//! ledger never under-reports real exposure.

pub mod legs;
pub mod pnl;
pub mod reconcile;

pub use legs::{exit_fill, leg_ids, ExitFill};
pub use pnl::{realized_pnl, realized_r};
pub use reconcile::{ReconcileConfig, ReconcileOptions, Reconciler};
