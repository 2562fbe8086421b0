#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use premarket_router::model::Platform;
use premarket_router::model::book::{Direction, Level, Orderbook, Side};
use premarket_router::model::chain::Chain;
use premarket_router::model::event::{Event, EventCatalog, RoutingKey};
use premarket_router::model::route::{PlatformAllocation, Route};
use premarket_router::relay::{BridgeStatus, OrderMeta, Relay, RelayError};
use premarket_router::run::progress::EngineContext;
use premarket_router::run::store::OrderStore;
use premarket_router::venues::{
    AdapterRegistry, IncomingTransfer, OperatorApproval, OrderState, PlacedOrder, VenueAdapter,
    VenueError, VenueResult, evm,
};

pub const USER: &str = "0x1111111111111111111111111111111111111111";
pub const RELAYER: &str = "0x2222222222222222222222222222222222222222";

// ── Mock venue ──────────────────────────────────────────────────────

/// A venue with controllable book, balances, and failure injection.
pub struct MockVenue {
    pub platform: Platform,
    pub chain: Chain,
    pub custody: Address,
    pub keeps: bool,
    pub book: Mutex<Orderbook>,
    /// Stablecoin on the custody wallet, venue units.
    pub stablecoin: Mutex<f64>,
    /// Outcome shares on the custody wallet, venue units.
    pub shares: Mutex<f64>,
    /// When set, place_order fails with this message.
    pub reject_orders: Mutex<Option<String>>,
    /// When true, fills settle instantly (shares appear on buys, stablecoin
    /// on sells).
    pub auto_settle: bool,
    pub placed: Mutex<Vec<(Direction, f64, f64)>>,
    pub share_transfers: Mutex<Vec<(Address, f64)>>,
    pub stablecoin_transfers: Mutex<Vec<(Address, f64)>>,
}

impl MockVenue {
    pub fn new(platform: Platform, chain: Chain, custody: &str) -> Self {
        let book = Orderbook::new(
            platform,
            "home",
            Side::Yes,
            vec![Level::new(0.50, 100.0)],
            vec![Level::new(0.48, 100.0)],
        );
        MockVenue {
            platform,
            chain,
            custody: custody.parse().unwrap(),
            keeps: false,
            book: Mutex::new(book),
            stablecoin: Mutex::new(100.0),
            shares: Mutex::new(0.0),
            reject_orders: Mutex::new(None),
            auto_settle: true,
            placed: Mutex::new(Vec::new()),
            share_transfers: Mutex::new(Vec::new()),
            stablecoin_transfers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_book(&self, asks: &[(f64, f64)], bids: &[(f64, f64)]) {
        *self.book.lock().unwrap() = Orderbook::new(
            self.platform,
            "home",
            Side::Yes,
            asks.iter().map(|&(p, s)| Level::new(p, s)).collect(),
            bids.iter().map(|&(p, s)| Level::new(p, s)).collect(),
        );
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn decimals(&self) -> u8 {
        6
    }

    fn operator_address(&self) -> Address {
        self.custody
    }

    fn shares_contract(&self) -> Address {
        Address::repeat_byte(0xcc)
    }

    fn min_order_value(&self) -> f64 {
        1.0
    }

    fn keeps_shares_in_custody(&self) -> bool {
        self.keeps
    }

    fn floor_amount(&self, amount: f64, _direction: Direction) -> f64 {
        (amount * 100.0).floor() / 100.0
    }

    async fn fetch_book(
        &self,
        _key: &RoutingKey,
        _outcome: &str,
        _side: Side,
    ) -> VenueResult<Orderbook> {
        Ok(self.book.lock().unwrap().clone())
    }

    async fn place_order(
        &self,
        _token: &str,
        _market: Option<&str>,
        amount: f64,
        price: f64,
        direction: Direction,
    ) -> VenueResult<PlacedOrder> {
        if let Some(reason) = self.reject_orders.lock().unwrap().clone() {
            return Err(VenueError::UpstreamRejected(reason));
        }
        self.placed.lock().unwrap().push((direction, amount, price));
        if self.auto_settle {
            match direction {
                Direction::Buy => {
                    *self.shares.lock().unwrap() += amount / price;
                    *self.stablecoin.lock().unwrap() -= amount;
                }
                Direction::Sell => {
                    *self.shares.lock().unwrap() -= amount;
                    *self.stablecoin.lock().unwrap() += amount * price;
                }
            }
        }
        Ok(PlacedOrder {
            order_id: Some(format!("mock-{}", self.placed.lock().unwrap().len())),
            status: "MATCHED".into(),
        })
    }

    async fn order_status(&self, order_id: &str) -> VenueResult<OrderState> {
        Ok(OrderState {
            order_id: order_id.to_string(),
            status: "FILLED".into(),
            filled_raw: U256::ZERO,
            remaining_raw: U256::ZERO,
        })
    }

    async fn balance_stablecoin(&self, _address: Option<Address>) -> VenueResult<U256> {
        Ok(evm::to_units(*self.stablecoin.lock().unwrap(), 6))
    }

    async fn balance_shares(&self, _address: Address, _token: &str) -> VenueResult<U256> {
        Ok(evm::to_units(*self.shares.lock().unwrap(), 6))
    }

    async fn transfer_stablecoin_to(&self, to: Address, amount: U256) -> VenueResult<String> {
        let units = evm::from_units(amount, 6);
        *self.stablecoin.lock().unwrap() -= units;
        self.stablecoin_transfers.lock().unwrap().push((to, units));
        Ok(format!("0xstable-{}", self.stablecoin_transfers.lock().unwrap().len()))
    }

    async fn transfer_shares_to(
        &self,
        to: Address,
        _token: &str,
        amount: U256,
    ) -> VenueResult<String> {
        let units = evm::from_units(amount, 6);
        *self.shares.lock().unwrap() -= units;
        self.share_transfers.lock().unwrap().push((to, units));
        Ok(format!("0xshares-{}", self.share_transfers.lock().unwrap().len()))
    }

    async fn pull_stablecoin_from(&self, _user: Address, _amount: U256) -> VenueResult<String> {
        Ok("0xpull-stable".into())
    }

    async fn pull_shares_from(
        &self,
        _user: Address,
        _token: &str,
        _amount: U256,
    ) -> VenueResult<String> {
        Ok("0xpull-shares".into())
    }

    async fn check_operator_approval(&self, _owner: Address) -> VenueResult<OperatorApproval> {
        Ok(OperatorApproval { erc20_allowance: U256::MAX, erc1155_approved: true })
    }

    async fn find_incoming_stablecoin(
        &self,
        _min_amount: U256,
        _blocks_back: u64,
    ) -> VenueResult<Option<IncomingTransfer>> {
        Ok(None)
    }

    async fn setup_approvals(&self) -> VenueResult<Vec<(String, String)>> {
        Ok(vec![])
    }
}

// ── Mock relay ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockRelay {
    pub user_balance: Mutex<U256>,
    pub user_allowance: Mutex<U256>,
    pub pulls: Mutex<Vec<f64>>,
    pub share_pulls: Mutex<Vec<f64>>,
    pub transfers: Mutex<Vec<(u64, f64)>>,
    pub bridges: Mutex<Vec<(u64, u64, f64)>>,
    pub bridge_statuses: Mutex<HashMap<String, BridgeStatus>>,
}

impl MockRelay {
    pub fn funded() -> Self {
        MockRelay {
            user_balance: Mutex::new(U256::MAX),
            user_allowance: Mutex::new(U256::MAX),
            ..Default::default()
        }
    }

    pub fn set_bridge_status(&self, tx: &str, status: BridgeStatus) {
        self.bridge_statuses.lock().unwrap().insert(tx.to_string(), status);
    }
}

#[async_trait]
impl Relay for MockRelay {
    fn relayer_address(&self) -> Address {
        RELAYER.parse().unwrap()
    }

    async fn user_stablecoin_state(
        &self,
        _chain: &Chain,
        _user: Address,
    ) -> Result<(U256, U256), RelayError> {
        Ok((*self.user_balance.lock().unwrap(), *self.user_allowance.lock().unwrap()))
    }

    async fn pull_stablecoin(
        &self,
        chain: &Chain,
        _user: Address,
        amount_raw: U256,
        _platform_tag: &str,
        _meta: &OrderMeta,
    ) -> Result<String, RelayError> {
        self.pulls
            .lock()
            .unwrap()
            .push(evm::from_units(amount_raw, chain.stablecoin_decimals));
        Ok("0xpull".into())
    }

    async fn pull_shares(
        &self,
        _chain: &Chain,
        _shares_contract: Address,
        _user: Address,
        _token_id: U256,
        amount_raw: U256,
        _platform_tag: &str,
        _meta: &OrderMeta,
    ) -> Result<String, RelayError> {
        self.share_pulls.lock().unwrap().push(evm::from_units(amount_raw, 6));
        Ok("0xpull-1155".into())
    }

    async fn transfer_stablecoin(
        &self,
        chain: &Chain,
        _to: Address,
        amount_raw: U256,
    ) -> Result<String, RelayError> {
        self.transfers
            .lock()
            .unwrap()
            .push((chain.id, evm::from_units(amount_raw, chain.stablecoin_decimals)));
        Ok("0xhandoff".into())
    }

    async fn bridge(
        &self,
        from: &Chain,
        to: &Chain,
        amount: f64,
        _to_address: Address,
    ) -> Result<String, RelayError> {
        if amount < 1.0 {
            return Err(RelayError::AmountTooSmall { amount });
        }
        let mut bridges = self.bridges.lock().unwrap();
        bridges.push((from.id, to.id, amount));
        Ok(format!("0xbridge-{}", bridges.len()))
    }

    async fn bridge_status(&self, tx_hash: &str) -> Result<BridgeStatus, RelayError> {
        Ok(self
            .bridge_statuses
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .unwrap_or(BridgeStatus::Pending))
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

/// Catalog with one event ("ev") and one outcome ("home") listing every
/// venue with both routing-key shapes populated.
pub fn catalog() -> EventCatalog {
    let key = |market: &str| RoutingKey {
        market: Some(market.into()),
        yes: Some("111".into()),
        no: Some("222".into()),
    };
    let mut venues = HashMap::new();
    venues.insert(Platform::Polymarket, key("558934"));
    venues.insert(Platform::Limitless, key("ev-home"));
    venues.insert(Platform::Opinion, key("601277"));

    let mut outcomes = HashMap::new();
    outcomes.insert("home".to_string(), venues);

    let mut events = HashMap::new();
    events.insert(
        "ev".to_string(),
        Event { title: "Test Event".into(), outcomes },
    );
    EventCatalog::from_events(events)
}

pub fn context(
    venues: Vec<Arc<dyn VenueAdapter>>,
    relay: Arc<dyn Relay>,
    dir: &tempfile::TempDir,
) -> Arc<EngineContext> {
    Arc::new(EngineContext {
        registry: AdapterRegistry::from_adapters(venues),
        relay,
        store: OrderStore::new(dir.path().join("orders.json")),
        catalog: catalog(),
    })
}

/// Route with the given per-venue (spent, qty) splits.
pub fn route(splits: &[(Platform, f64, f64)]) -> Route {
    let mut per_platform = BTreeMap::new();
    let mut total_spent = 0.0;
    let mut total_qty = 0.0;
    for &(platform, spent, qty) in splits {
        total_spent += spent;
        total_qty += qty;
        per_platform.insert(
            platform,
            PlatformAllocation {
                spent,
                qty,
                avg_price: if qty > 0.0 { spent / qty } else { 0.0 },
                avg_price_cents: 0.0,
                market: None,
                token: None,
            },
        );
    }
    Route {
        direction: Direction::Buy,
        budget: total_spent,
        total_spent,
        total_qty,
        avg_price: if total_qty > 0.0 { total_spent / total_qty } else { 0.0 },
        avg_price_cents: 0.0,
        unfilled: 0.0,
        platforms_used: splits.len(),
        per_platform,
        fills: Vec::new(),
    }
}
