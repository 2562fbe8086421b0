pub mod lifi;
pub mod router;

pub use router::LifiRelay;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::Serialize;

use crate::model::chain::Chain;

/// Order context embedded as metadata bytes in every router-contract call,
/// so pulls can be traced back to orders on a block explorer.
#[derive(Debug, Clone, Serialize)]
pub struct OrderMeta {
    pub order_id: String,
    pub event_id: String,
    pub outcome: String,
    pub side: String,
}

/// Terminal and non-terminal bridge states as reported by the quote service.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeStatus {
    Pending,
    Done {
        receiving_tx: Option<String>,
        chain_id: Option<u64>,
    },
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay not configured: {0}")]
    NotConfigured(String),
    #[error("bridge quote failed: {0}")]
    QuoteFailed(String),
    #[error("BRIDGE_AMOUNT_TOO_SMALL: {amount:.2} is below the bridge floor")]
    AmountTooSmall { amount: f64 },
    #[error("bridge submit failed: {0}")]
    SubmitFailed(String),
    #[error("bridge status failed: {0}")]
    StatusFailed(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Chain-side operations the order state machine depends on: pulls through
/// the per-chain router contract, bridge submission, and status polling.
/// A trait so tests can drive the state machine without touching a chain.
#[async_trait]
pub trait Relay: Send + Sync {
    /// The relay-controlled address that receives pulled funds.
    fn relayer_address(&self) -> Address;

    /// (balance, allowance-to-router) of the chain's stablecoin for `user`.
    /// Checked before any pull so shortfalls fail the order synchronously.
    async fn user_stablecoin_state(
        &self,
        chain: &Chain,
        user: Address,
    ) -> Result<(U256, U256), RelayError>;

    /// Pull the user's stablecoin through the router contract.
    async fn pull_stablecoin(
        &self,
        chain: &Chain,
        user: Address,
        amount_raw: U256,
        platform_tag: &str,
        meta: &OrderMeta,
    ) -> Result<String, RelayError>;

    /// Pull outcome shares (ERC1155) through the router contract.
    async fn pull_shares(
        &self,
        chain: &Chain,
        shares_contract: Address,
        user: Address,
        token_id: U256,
        amount_raw: U256,
        platform_tag: &str,
        meta: &OrderMeta,
    ) -> Result<String, RelayError>;

    /// Plain stablecoin transfer from the relay wallet. Used to hand
    /// same-chain funds to a venue's custody wallet without a bridge.
    async fn transfer_stablecoin(
        &self,
        chain: &Chain,
        to: Address,
        amount_raw: U256,
    ) -> Result<String, RelayError>;

    /// Quote and submit one bridge of `amount` stablecoin units from the
    /// relay wallet on `from` to `to_address` on `to`. Returns the source
    /// chain transaction hash used for status polling.
    async fn bridge(
        &self,
        from: &Chain,
        to: &Chain,
        amount: f64,
        to_address: Address,
    ) -> Result<String, RelayError>;

    async fn bridge_status(&self, tx_hash: &str) -> Result<BridgeStatus, RelayError>;
}

/// Stand-in when no owner key is configured: read-only endpoints keep
/// working, anything that would move funds reports the missing config.
pub struct DisabledRelay;

#[async_trait]
impl Relay for DisabledRelay {
    fn relayer_address(&self) -> Address {
        Address::ZERO
    }

    async fn user_stablecoin_state(
        &self,
        _chain: &Chain,
        _user: Address,
    ) -> Result<(U256, U256), RelayError> {
        Err(RelayError::NotConfigured("owner key not set".into()))
    }

    async fn pull_stablecoin(
        &self,
        _chain: &Chain,
        _user: Address,
        _amount_raw: U256,
        _platform_tag: &str,
        _meta: &OrderMeta,
    ) -> Result<String, RelayError> {
        Err(RelayError::NotConfigured("owner key not set".into()))
    }

    async fn pull_shares(
        &self,
        _chain: &Chain,
        _shares_contract: Address,
        _user: Address,
        _token_id: U256,
        _amount_raw: U256,
        _platform_tag: &str,
        _meta: &OrderMeta,
    ) -> Result<String, RelayError> {
        Err(RelayError::NotConfigured("owner key not set".into()))
    }

    async fn transfer_stablecoin(
        &self,
        _chain: &Chain,
        _to: Address,
        _amount_raw: U256,
    ) -> Result<String, RelayError> {
        Err(RelayError::NotConfigured("owner key not set".into()))
    }

    async fn bridge(
        &self,
        _from: &Chain,
        _to: &Chain,
        _amount: f64,
        _to_address: Address,
    ) -> Result<String, RelayError> {
        Err(RelayError::NotConfigured("owner key not set".into()))
    }

    async fn bridge_status(&self, _tx_hash: &str) -> Result<BridgeStatus, RelayError> {
        Err(RelayError::NotConfigured("owner key not set".into()))
    }
}
