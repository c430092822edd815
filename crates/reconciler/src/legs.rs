//! Bounded walker over nested broker order legs.
//!
//! The `legs` nesting is broker-controlled input of arbitrary shape; every
//! traversal here is bounded by depth and node count so a malformed payload
//! can never recurse or iterate unboundedly.

use rust_decimal::Decimal;
use tradeloop_core::api::BrokerOrder;
use tracing::warn;

/// Maximum nesting depth honored when walking order legs.
pub const MAX_LEG_DEPTH: usize = 4;
/// Maximum total nodes visited per order tree.
pub const MAX_LEG_NODES: usize = 64;

/// An exit execution extracted from a filled child leg.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitFill {
    pub order_id: String,
    pub price: Decimal,
    pub qty: Option<Decimal>,
    /// "stop" or "take_profit", by the filled leg's order type.
    pub via: &'static str,
}

/// Pre-order traversal of an order and its legs, bounded by
/// [`MAX_LEG_DEPTH`] and [`MAX_LEG_NODES`].
fn walk(order: &BrokerOrder) -> Vec<&BrokerOrder> {
    let mut out = Vec::new();
    let mut stack: Vec<(&BrokerOrder, usize)> = vec![(order, 0)];
    let mut truncated = false;
    while let Some((node, depth)) = stack.pop() {
        if out.len() >= MAX_LEG_NODES {
            truncated = true;
            break;
        }
        out.push(node);
        if depth >= MAX_LEG_DEPTH {
            truncated = true;
            continue;
        }
        if let Some(children) = node.legs.as_deref() {
            for child in children {
                stack.push((child, depth + 1));
            }
        }
    }
    if truncated {
        warn!(order_id = %order.id, nodes = out.len(), "Order leg tree truncated at walk bounds");
    }
    out
}

/// Every order id in the tree, parent first.
pub fn leg_ids(order: &BrokerOrder) -> Vec<String> {
    walk(order).into_iter().map(|o| o.id.clone()).collect()
}

/// The filled exit leg, if any. The parent node is the entry and is never a
/// candidate; only descendants count.
pub fn exit_fill(order: &BrokerOrder) -> Option<ExitFill> {
    walk(order)
        .into_iter()
        .skip(1)
        .find(|leg| leg.status == "filled" && leg.filled_avg_price.is_some())
        .and_then(|leg| {
            Some(ExitFill {
                order_id: leg.id.clone(),
                price: leg.filled_avg_price?,
                qty: leg.filled_qty,
                via: if leg.is_stop_type() { "stop" } else { "take_profit" },
            })
        })
}
