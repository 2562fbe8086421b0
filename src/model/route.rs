use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Platform;
use super::book::Direction;

/// One consumed price level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub platform: Platform,
    pub price: f64,
    pub price_cents: f64,
    /// Shares taken from this level.
    pub size: f64,
    /// Stablecoin spent on this level.
    pub cost: f64,
}

/// Per-venue slice of a route. `market`/`token` are filled in from the event
/// catalog when the route is served; the routing walk itself only knows
/// prices and sizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformAllocation {
    pub spent: f64,
    pub qty: f64,
    pub avg_price: f64,
    pub avg_price_cents: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// The split-budget plan produced by `engine::router::find_optimal_route`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub direction: Direction,
    pub budget: f64,
    pub total_spent: f64,
    pub total_qty: f64,
    pub avg_price: f64,
    pub avg_price_cents: f64,
    /// Budget (buy) or shares (sell) that found no liquidity.
    pub unfilled: f64,
    pub platforms_used: usize,
    pub per_platform: BTreeMap<Platform, PlatformAllocation>,
    pub fills: Vec<Fill>,
}
