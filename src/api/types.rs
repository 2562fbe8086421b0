use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::pool::PooledLevel;
use crate::model::Platform;
use crate::model::book::Orderbook;
use crate::model::route::Route;

// ── Request types ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EventQuery {
    pub event_id: String,
}

#[derive(Deserialize)]
pub struct OrderbookQuery {
    pub event_id: String,
    pub team: String,
}

#[derive(Deserialize)]
pub struct RouteQuery {
    pub event_id: String,
    pub team: String,
    #[serde(default = "default_side")]
    pub side: String,
    pub budget: f64,
    #[serde(default = "default_direction")]
    pub direction: String,
}

fn default_side() -> String {
    "yes".to_string()
}
fn default_direction() -> String {
    "buy".to_string()
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub wallet: String,
    pub event_id: String,
    pub team: String,
    pub side: String,
    pub budget: f64,
    pub route: Route,
    pub from_chain: u64,
    #[serde(default)]
    pub approve_tx_hash: Option<String>,
}

#[derive(Deserialize)]
pub struct SellRequest {
    pub order_id: String,
    #[serde(default)]
    pub amount: Option<f64>,
    pub to_chain: u64,
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Deserialize)]
pub struct PositionsQuery {
    pub wallet: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
}

// ── Response types ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConfigResponse {
    pub wc_project_id: String,
    /// chain id -> router contract address
    pub routers: BTreeMap<u64, String>,
    pub relayer_address: Option<String>,
}

/// Per-venue book or the error that venue produced; one bad venue never
/// fails the whole response.
#[derive(Serialize)]
#[serde(untagged)]
pub enum PlatformBook {
    Book(Orderbook),
    Error { error: String },
}

#[derive(Serialize)]
pub struct PooledSide {
    pub platform: &'static str,
    pub team: String,
    pub side: String,
    pub asks: Vec<PooledLevel>,
    pub bids: Vec<PooledLevel>,
    pub best_ask: f64,
    pub best_bid: f64,
}

#[derive(Serialize)]
pub struct SideBooks {
    pub platforms: BTreeMap<Platform, PlatformBook>,
    pub pooled: PooledSide,
}

#[derive(Serialize)]
pub struct RouteResponse {
    #[serde(flatten)]
    pub route: Route,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_errors: Option<BTreeMap<Platform, String>>,
}

/// A filled buy position with its live on-chain share balance.
#[derive(Serialize)]
pub struct Position {
    pub order_id: String,
    pub event_id: String,
    pub team: String,
    pub side: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub qty: f64,
    pub spent: f64,
    pub avg_price: f64,
    /// Live balance on the address actually holding the shares.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares_balance: Option<f64>,
    /// Shares live on the venue's custody wallet, not the user's.
    pub kept: bool,
}
