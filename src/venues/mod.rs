pub mod evm;
pub mod limitless;
pub mod opinion;
pub mod polymarket;
pub mod safe;
pub mod signing;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::model::Platform;
use crate::model::book::{BestOffer, Direction, Orderbook, Side};
use crate::model::chain::Chain;
use crate::model::event::RoutingKey;
use crate::run::config::RuntimeConfig;

// ── Results ─────────────────────────────────────────────────────────

/// Venue response to a placed order.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: Option<String>,
    pub status: String,
}

/// Venue-side view of an existing order, raw units.
#[derive(Debug, Clone)]
pub struct OrderState {
    pub order_id: String,
    pub status: String,
    pub filled_raw: U256,
    pub remaining_raw: U256,
}

#[derive(Debug, Clone)]
pub struct OperatorApproval {
    pub erc20_allowance: U256,
    pub erc1155_approved: bool,
}

/// A transfer into the custody wallet found by scanning recent blocks.
#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    pub tx_hash: String,
    pub amount: U256,
    pub block: u64,
}

// ── Errors ──────────────────────────────────────────────────────────

/// Categorized venue failure. The state machine keys its retry decisions off
/// the variant, never the message.
#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error("venue not configured")]
    NotConfigured,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream rejected: {0}")]
    UpstreamRejected(String),
    #[error("insufficient liquidity")]
    InsufficientLiquidity,
    #[error("order value {value:.2} below venue minimum {minimum:.2}")]
    BelowMinimum { value: f64, minimum: f64 },
    #[error("transaction reverted: {0}")]
    OnChainRevert(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type VenueResult<T> = Result<T, VenueError>;

impl From<reqwest::Error> for VenueError {
    fn from(err: reqwest::Error) -> Self {
        VenueError::UpstreamUnavailable(err.to_string())
    }
}

// ── Adapter contract ────────────────────────────────────────────────

/// Uniform contract over heterogeneous trading venues.
///
/// Implementations differ in chain, stablecoin decimals, custody model and
/// signing scheme; none of that leaks past this trait. Amounts at this
/// boundary are venue quote-stablecoin units (f64) for order placement and
/// raw integers (U256, venue decimals) for balances and transfers.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn platform(&self) -> Platform;
    fn chain(&self) -> &Chain;
    fn decimals(&self) -> u8;
    /// Address that holds funds and shares while the venue trades:
    /// the signing EOA for direct/proxy custody, the smart wallet otherwise.
    fn operator_address(&self) -> Address;
    /// The venue's conditional-token (ERC1155) contract.
    fn shares_contract(&self) -> Address;
    /// Floor for a single order's notional value, venue-imposed.
    fn min_order_value(&self) -> f64;
    /// True when bought shares stay on the custody wallet instead of being
    /// forwarded to the user.
    fn keeps_shares_in_custody(&self) -> bool {
        false
    }
    /// Round an order amount down to the venue's accepted precision.
    fn floor_amount(&self, amount: f64, direction: Direction) -> f64;

    /// Venue-local share token id for (key, side). Venues with per-side
    /// token ids read them off the key; slug-addressed venues ask their API.
    async fn resolve_token(&self, key: &RoutingKey, side: Side) -> VenueResult<String> {
        key.token_for(side)
            .map(str::to_string)
            .ok_or_else(|| VenueError::Other(anyhow::anyhow!("routing key has no {side} token")))
    }

    async fn fetch_book(&self, key: &RoutingKey, outcome: &str, side: Side)
    -> VenueResult<Orderbook>;

    async fn best_offer(
        &self,
        key: &RoutingKey,
        outcome: &str,
        side: Side,
        direction: Direction,
    ) -> VenueResult<BestOffer> {
        Ok(self.fetch_book(key, outcome, side).await?.best_offer(direction))
    }

    /// Place a fill-or-kill order. For BUY `amount` is stablecoin to spend;
    /// for SELL it is shares.
    async fn place_order(
        &self,
        token: &str,
        market: Option<&str>,
        amount: f64,
        price: f64,
        direction: Direction,
    ) -> VenueResult<PlacedOrder>;

    async fn order_status(&self, order_id: &str) -> VenueResult<OrderState>;

    /// Stablecoin balance in raw units; defaults to the custody wallet.
    async fn balance_stablecoin(&self, address: Option<Address>) -> VenueResult<U256>;
    async fn balance_shares(&self, address: Address, token: &str) -> VenueResult<U256>;

    async fn transfer_stablecoin_to(&self, to: Address, amount: U256) -> VenueResult<String>;
    async fn transfer_shares_to(&self, to: Address, token: &str, amount: U256)
    -> VenueResult<String>;

    /// Pull from a user that has approved the operator. Requires prior ERC20
    /// allowance / ERC1155 approval-for-all.
    async fn pull_stablecoin_from(&self, user: Address, amount: U256) -> VenueResult<String>;
    async fn pull_shares_from(&self, user: Address, token: &str, amount: U256)
    -> VenueResult<String>;

    async fn check_operator_approval(&self, owner: Address) -> VenueResult<OperatorApproval>;

    /// Scan recent blocks for a stablecoin transfer into the custody wallet.
    async fn find_incoming_stablecoin(
        &self,
        min_amount: U256,
        blocks_back: u64,
    ) -> VenueResult<Option<IncomingTransfer>>;

    /// One-time relayer-side approvals of the venue's exchange contracts.
    /// Returns (label, tx-or-note) pairs.
    async fn setup_approvals(&self) -> VenueResult<Vec<(String, String)>>;
}

// ── Registry ────────────────────────────────────────────────────────

/// Explicit per-process adapter registry built once at startup. A venue with
/// missing configuration is simply absent, never a startup failure.
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn VenueAdapter>>,
}

impl AdapterRegistry {
    pub fn build(config: &RuntimeConfig) -> Self {
        let mut adapters: HashMap<Platform, Arc<dyn VenueAdapter>> = HashMap::new();

        match &config.polymarket {
            Some(cfg) => match polymarket::PolymarketAdapter::new(cfg) {
                Ok(adapter) => {
                    adapters.insert(Platform::Polymarket, Arc::new(adapter));
                }
                Err(err) => tracing::warn!("polymarket adapter disabled: {err:#}"),
            },
            None => tracing::warn!("polymarket adapter disabled: keys not configured"),
        }
        match &config.limitless {
            Some(cfg) => match limitless::LimitlessAdapter::new(cfg) {
                Ok(adapter) => {
                    adapters.insert(Platform::Limitless, Arc::new(adapter));
                }
                Err(err) => tracing::warn!("limitless adapter disabled: {err:#}"),
            },
            None => tracing::warn!("limitless adapter disabled: keys not configured"),
        }
        match &config.opinion {
            Some(cfg) => match opinion::OpinionAdapter::new(cfg) {
                Ok(adapter) => {
                    adapters.insert(Platform::Opinion, Arc::new(adapter));
                }
                Err(err) => tracing::warn!("opinion adapter disabled: {err:#}"),
            },
            None => tracing::warn!("opinion adapter disabled: keys not configured"),
        }

        tracing::info!(
            enabled = ?adapters.keys().collect::<Vec<_>>(),
            "adapter registry initialized"
        );
        AdapterRegistry { adapters }
    }

    /// Assemble a registry from pre-built adapters. Tests inject mocks here.
    pub fn from_adapters(adapters: Vec<Arc<dyn VenueAdapter>>) -> Self {
        AdapterRegistry {
            adapters: adapters.into_iter().map(|a| (a.platform(), a)).collect(),
        }
    }

    pub fn get(&self, platform: Platform) -> VenueResult<Arc<dyn VenueAdapter>> {
        self.adapters
            .get(&platform)
            .cloned()
            .ok_or(VenueError::NotConfigured)
    }

    pub fn enabled(&self) -> impl Iterator<Item = (Platform, Arc<dyn VenueAdapter>)> + '_ {
        self.adapters.iter().map(|(p, a)| (*p, a.clone()))
    }

    pub fn is_enabled(&self, platform: Platform) -> bool {
        self.adapters.contains_key(&platform)
    }
}
