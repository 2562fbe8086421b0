use std::collections::HashMap;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::model::chain::Chain;
use crate::run::config::RuntimeConfig;
use crate::venues::evm::{self, IERC20};

use super::lifi::{self, LifiClient};
use super::{BridgeStatus, OrderMeta, Relay, RelayError};

/// The bridge aggregator refuses dust; anything under a dollar can only move
/// same-chain.
const BRIDGE_MIN_USD: f64 = 1.0;

sol! {
    #[sol(rpc)]
    contract IRouter {
        function transferERC20(
            address token,
            address from,
            string platformTag,
            uint256 amount,
            bytes metadata
        ) external;
        function transferERC1155(
            address token,
            address from,
            string platformTag,
            uint256 tokenId,
            uint256 amount,
            bytes metadata
        ) external;
    }
}

/// Production relay: router-contract pulls signed by the main EOA, bridging
/// through the LiFi aggregator.
pub struct LifiRelay {
    signer: PrivateKeySigner,
    router_addresses: HashMap<u64, Address>,
    lifi: LifiClient,
}

impl LifiRelay {
    pub fn from_config(config: &RuntimeConfig) -> anyhow::Result<Self> {
        Ok(LifiRelay {
            signer: config.owner_signer()?,
            router_addresses: config.router_addresses.clone(),
            lifi: LifiClient::new()?,
        })
    }

    fn router_for(&self, chain: &Chain) -> Result<Address, RelayError> {
        self.router_addresses
            .get(&chain.id)
            .copied()
            .ok_or_else(|| RelayError::NotConfigured(format!("no router deployed on {chain}")))
    }

    fn provider(&self, chain: &Chain) -> Result<DynProvider, RelayError> {
        evm::signing_provider(chain, &self.signer).map_err(RelayError::Other)
    }

    /// The router nonce imposes global serialization for main-EOA
    /// transactions; always read the pending count rather than trusting a
    /// local counter.
    async fn pending_nonce(&self, provider: &DynProvider) -> Result<u64, RelayError> {
        provider
            .get_transaction_count(self.signer.address())
            .pending()
            .await
            .map_err(|e| RelayError::Rpc(e.to_string()))
    }

    fn meta_bytes(meta: &OrderMeta) -> Bytes {
        Bytes::from(serde_json::to_vec(meta).unwrap_or_default())
    }
}

#[async_trait]
impl Relay for LifiRelay {
    fn relayer_address(&self) -> Address {
        self.signer.address()
    }

    async fn user_stablecoin_state(
        &self,
        chain: &Chain,
        user: Address,
    ) -> Result<(U256, U256), RelayError> {
        let router = self.router_for(chain)?;
        let provider = self.provider(chain)?;
        let token = IERC20::new(chain.stablecoin, &provider);
        let balance = token
            .balanceOf(user)
            .call()
            .await
            .map_err(|e| RelayError::Rpc(e.to_string()))?;
        let allowance = token
            .allowance(user, router)
            .call()
            .await
            .map_err(|e| RelayError::Rpc(e.to_string()))?;
        Ok((balance, allowance))
    }

    async fn pull_stablecoin(
        &self,
        chain: &Chain,
        user: Address,
        amount_raw: U256,
        platform_tag: &str,
        meta: &OrderMeta,
    ) -> Result<String, RelayError> {
        let router_addr = self.router_for(chain)?;
        let provider = self.provider(chain)?;
        let nonce = self.pending_nonce(&provider).await?;

        let router = IRouter::new(router_addr, &provider);
        let mut call = router
            .transferERC20(
                chain.stablecoin,
                user,
                platform_tag.to_string(),
                amount_raw,
                Self::meta_bytes(meta),
            )
            .gas(300_000)
            .nonce(nonce);
        if let Some(gas_price) = evm::legacy_gas_price(&provider, chain)
            .await
            .map_err(RelayError::Other)?
        {
            call = call.gas_price(gas_price);
        }

        debug!(%user, %amount_raw, %chain, "pulling stablecoin via router");
        let pending = call
            .send()
            .await
            .map_err(|e| RelayError::SubmitFailed(e.to_string()))?;
        evm::confirm(pending, Duration::from_secs(60))
            .await
            .map_err(|e| RelayError::SubmitFailed(e.to_string()))
    }

    async fn pull_shares(
        &self,
        chain: &Chain,
        shares_contract: Address,
        user: Address,
        token_id: U256,
        amount_raw: U256,
        platform_tag: &str,
        meta: &OrderMeta,
    ) -> Result<String, RelayError> {
        let router_addr = self.router_for(chain)?;
        let provider = self.provider(chain)?;
        let nonce = self.pending_nonce(&provider).await?;

        let router = IRouter::new(router_addr, &provider);
        let mut call = router
            .transferERC1155(
                shares_contract,
                user,
                platform_tag.to_string(),
                token_id,
                amount_raw,
                Self::meta_bytes(meta),
            )
            .gas(300_000)
            .nonce(nonce);
        if let Some(gas_price) = evm::legacy_gas_price(&provider, chain)
            .await
            .map_err(RelayError::Other)?
        {
            call = call.gas_price(gas_price);
        }

        debug!(%user, %token_id, %chain, "pulling shares via router");
        let pending = call
            .send()
            .await
            .map_err(|e| RelayError::SubmitFailed(e.to_string()))?;
        evm::confirm(pending, Duration::from_secs(60))
            .await
            .map_err(|e| RelayError::SubmitFailed(e.to_string()))
    }

    async fn transfer_stablecoin(
        &self,
        chain: &Chain,
        to: Address,
        amount_raw: U256,
    ) -> Result<String, RelayError> {
        let provider = self.provider(chain)?;
        let nonce = self.pending_nonce(&provider).await?;
        let erc20 = IERC20::new(chain.stablecoin, &provider);
        let mut call = erc20
            .transfer(to, amount_raw)
            .gas(100_000)
            .nonce(nonce);
        if let Some(gas_price) = evm::legacy_gas_price(&provider, chain)
            .await
            .map_err(RelayError::Other)?
        {
            call = call.gas_price(gas_price);
        }
        let pending = call
            .send()
            .await
            .map_err(|e| RelayError::SubmitFailed(e.to_string()))?;
        evm::confirm(pending, Duration::from_secs(60))
            .await
            .map_err(|e| RelayError::SubmitFailed(e.to_string()))
    }

    async fn bridge(
        &self,
        from: &Chain,
        to: &Chain,
        amount: f64,
        to_address: Address,
    ) -> Result<String, RelayError> {
        if amount < BRIDGE_MIN_USD {
            return Err(RelayError::AmountTooSmall { amount });
        }

        let from_amount = evm::to_units(amount, from.stablecoin_decimals);
        let quote = self
            .lifi
            .quote(
                from.id,
                to.id,
                from.stablecoin,
                to.stablecoin,
                from_amount,
                self.signer.address(),
                to_address,
            )
            .await?;
        let tx = quote.transaction()?.clone();

        let provider = self.provider(from)?;

        // Approve the aggregator before handing it the opaque calldata.
        let spender: Address = quote
            .estimate
            .as_ref()
            .and_then(|e| e.approval_address.as_deref())
            .unwrap_or(tx.to.as_str())
            .parse()
            .map_err(|e| RelayError::QuoteFailed(format!("bad approval address: {e}")))?;
        let nonce = self.pending_nonce(&provider).await?;
        let erc20 = IERC20::new(from.stablecoin, &provider);
        let mut approve = erc20
            .approve(spender, from_amount)
            .gas(200_000)
            .nonce(nonce);
        if let Some(gas_price) = evm::legacy_gas_price(&provider, from)
            .await
            .map_err(RelayError::Other)?
        {
            approve = approve.gas_price(gas_price);
        }
        let pending = approve
            .send()
            .await
            .map_err(|e| RelayError::SubmitFailed(format!("bridge approve: {e}")))?;
        evm::confirm(pending, Duration::from_secs(60))
            .await
            .map_err(|e| RelayError::SubmitFailed(format!("bridge approve: {e}")))?;

        let to_addr: Address = tx
            .to
            .parse()
            .map_err(|e| RelayError::QuoteFailed(format!("bad tx.to: {e}")))?;
        let data = alloy::hex::decode(tx.data.trim_start_matches("0x"))
            .map_err(|e| RelayError::QuoteFailed(format!("bad tx.data: {e}")))?;

        let nonce = self.pending_nonce(&provider).await?;
        let mut request = alloy::rpc::types::TransactionRequest::default()
            .with_to(to_addr)
            .with_input(Bytes::from(data))
            .with_value(lifi::parse_value(&tx))
            .with_gas_limit(lifi::effective_gas_limit(&tx))
            .with_nonce(nonce);
        if let Some(gas_price) = evm::legacy_gas_price(&provider, from)
            .await
            .map_err(RelayError::Other)?
        {
            request = request.with_gas_price(gas_price);
        }

        info!(%amount, from = %from, to = %to, "submitting bridge transaction");
        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| RelayError::SubmitFailed(e.to_string()))?;
        let receipt = pending
            .with_timeout(Some(Duration::from_secs(120)))
            .get_receipt()
            .await
            .map_err(|e| RelayError::SubmitFailed(format!("awaiting bridge receipt: {e}")))?;
        let hash = format!("{}", receipt.transaction_hash);
        if !receipt.status() {
            return Err(RelayError::SubmitFailed(format!(
                "bridge transaction reverted: {hash}"
            )));
        }
        info!(%hash, "bridge transaction confirmed on source chain");
        Ok(hash)
    }

    async fn bridge_status(&self, tx_hash: &str) -> Result<BridgeStatus, RelayError> {
        self.lifi.status(tx_hash).await
    }
}
