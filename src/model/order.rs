use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Platform;
use super::book::{Direction, Side};

pub const MAX_TRADE_RETRIES: u32 = 5;
pub const MAX_SETTLE_POLLS: u32 = 10;
pub const MAX_BRIDGE_RETRIES: u32 = 5;

/// Lifecycle states. Buys walk pending → sent → bridged → matched → filled;
/// sells walk shares_pulled → sell_matched → sell_settled → bridging_back →
/// completed. Everything else is an off-path terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Sent,
    Bridged,
    Matched,
    Filled,
    Failed,
    TradeFailed,
    Killed,
    SharesPulled,
    SellMatched,
    SellSettled,
    BridgingBack,
    Completed,
    BridgeFailed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Failed
                | OrderStatus::TradeFailed
                | OrderStatus::Killed
                | OrderStatus::Completed
                | OrderStatus::BridgeFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeLegStatus {
    Pending,
    Done,
    Failed,
}

/// One bridge transaction toward a target chain. Same-chain legs are created
/// already `done` with no transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeLeg {
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_tx: Option<String>,
    pub status: BridgeLegStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiving_tx: Option<String>,
}

/// Frozen-at-creation plan for one venue. Authoritative source of
/// (market, token) for the order; route fills never override it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub spent: f64,
    pub qty: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub amount: f64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TradeResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.order_id.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettleResult {
    /// Shares (buy) or stablecoin proceeds (sell) observed on settlement.
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
    /// Venue keeps shares on its custody wallet; no outbound transfer.
    #[serde(default)]
    pub kept: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferResult {
    pub fn settled(&self) -> bool {
        self.kept || (self.tx.is_some() && self.error.is_none())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Retries {
    pub trade: u32,
    pub settle: u32,
    pub bridge: u32,
}

/// The durable order record. Persisted as JSON; mutated only by the progress
/// loop after creation (kill excepted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub direction: Direction,
    pub wallet: String,
    pub event_id: String,
    pub outcome: String,
    pub side: Side,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_chain: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_chain: Option<u64>,
    pub platforms: BTreeMap<Platform, PlatformPlan>,
    pub status: OrderStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_tx: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bridges: BTreeMap<u64, BridgeLeg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiving_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_back_tx: Option<String>,

    /// Sell orders only: the buy they unwind and the single venue involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sell_platform: Option<Platform>,
    /// Stablecoin balance snapshot taken just before the sell was placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_snapshot: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proceeds: Option<f64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trade_results: BTreeMap<Platform, TradeResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settle_results: BTreeMap<Platform, SettleResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transfer_results: BTreeMap<Platform, TransferResult>,

    #[serde(default)]
    pub retries: Retries,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl Order {
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    pub fn new_buy(
        wallet: String,
        event_id: String,
        outcome: String,
        side: Side,
        budget: f64,
        from_chain: u64,
        platforms: BTreeMap<Platform, PlatformPlan>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Order {
            id: Self::new_id(),
            direction: Direction::Buy,
            wallet,
            event_id,
            outcome,
            side,
            budget: Some(budget),
            shares_amount: None,
            from_chain: Some(from_chain),
            to_chain: None,
            platforms,
            status: OrderStatus::Pending,
            approve_tx: None,
            pull_tx: None,
            bridges: BTreeMap::new(),
            receiving_tx: None,
            bridge_back_tx: None,
            buy_id: None,
            sell_platform: None,
            balance_snapshot: None,
            proceeds: None,
            trade_results: BTreeMap::new(),
            settle_results: BTreeMap::new(),
            transfer_results: BTreeMap::new(),
            retries: Retries::default(),
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn new_sell(
        buy: &Order,
        platform: Platform,
        shares_amount: f64,
        to_chain: u64,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let mut platforms = BTreeMap::new();
        if let Some(plan) = buy.platforms.get(&platform) {
            platforms.insert(platform, plan.clone());
        }
        Order {
            id: Self::new_id(),
            direction: Direction::Sell,
            wallet: buy.wallet.clone(),
            event_id: buy.event_id.clone(),
            outcome: buy.outcome.clone(),
            side: buy.side,
            budget: None,
            shares_amount: Some(shares_amount),
            from_chain: None,
            to_chain: Some(to_chain),
            platforms,
            status: OrderStatus::Pending,
            approve_tx: None,
            pull_tx: None,
            bridges: BTreeMap::new(),
            receiving_tx: None,
            bridge_back_tx: None,
            buy_id: Some(buy.id.clone()),
            sell_platform: Some(platform),
            balance_snapshot: None,
            proceeds: None,
            trade_results: BTreeMap::new(),
            settle_results: BTreeMap::new(),
            transfer_results: BTreeMap::new(),
            retries: Retries::default(),
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn fail(&mut self, status: OrderStatus, error: impl Into<String>) {
        self.status = status;
        self.error = Some(error.into());
        self.touch();
    }

    /// Terminal kill: absorbing. Counters are pushed past their bounds so no
    /// later code path can re-enter a retried transition.
    pub fn kill(&mut self) {
        self.status = OrderStatus::Killed;
        self.retries.trade = MAX_TRADE_RETRIES + 1;
        self.retries.settle = MAX_SETTLE_POLLS + 1;
        self.retries.bridge = MAX_BRIDGE_RETRIES + 1;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_eight_chars() {
        let id = Order::new_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn kill_is_absorbing_and_inflates_counters() {
        let mut order = Order::new_buy(
            "0xabc".into(),
            "ev".into(),
            "home".into(),
            Side::Yes,
            10.0,
            8453,
            BTreeMap::new(),
        );
        order.status = OrderStatus::Bridged;
        order.kill();
        assert_eq!(order.status, OrderStatus::Killed);
        assert!(order.status.is_terminal());
        assert!(order.retries.trade > MAX_TRADE_RETRIES);
        assert!(order.retries.settle > MAX_SETTLE_POLLS);
        assert!(order.retries.bridge > MAX_BRIDGE_RETRIES);
    }

    #[test]
    fn order_round_trips_through_json() {
        let mut platforms = BTreeMap::new();
        platforms.insert(
            Platform::Limitless,
            PlatformPlan { market: Some("slug".into()), token: None, spent: 6.0, qty: 12.0 },
        );
        let mut order = Order::new_buy(
            "0xabc".into(),
            "ev".into(),
            "home".into(),
            Side::Yes,
            6.0,
            8453,
            platforms,
        );
        order.bridges.insert(
            137,
            BridgeLeg {
                amount: 4.0,
                bridge_tx: Some("0xdead".into()),
                status: BridgeLegStatus::Pending,
                receiving_tx: None,
            },
        );
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, order.id);
        assert_eq!(back.bridges[&137].amount, 4.0);
        assert_eq!(back.platforms[&Platform::Limitless].qty, 12.0);
        assert!(json.contains("\"status\":\"pending\""));
    }
}
