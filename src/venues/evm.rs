use std::time::Duration;

use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result, anyhow};

use crate::model::chain::Chain;

use super::{IncomingTransfer, VenueError};

// ── Contract interfaces ─────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    contract IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    contract IConditionalTokens {
        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 id,
            uint256 value
        );

        function balanceOf(address account, uint256 id) external view returns (uint256);
        function isApprovedForAll(address account, address operator) external view returns (bool);
        function setApprovalForAll(address operator, bool approved) external;
        function safeTransferFrom(
            address from,
            address to,
            uint256 id,
            uint256 amount,
            bytes data
        ) external;
    }
}

// ── Providers ───────────────────────────────────────────────────────

pub fn read_provider(chain: &Chain) -> Result<DynProvider> {
    let url = chain
        .rpc_url
        .parse()
        .with_context(|| format!("invalid RPC URL for {chain}"))?;
    Ok(ProviderBuilder::new().connect_http(url).erased())
}

/// Provider that signs with the given key and fills fees for the chain.
pub fn signing_provider(chain: &Chain, signer: &PrivateKeySigner) -> Result<DynProvider> {
    let url = chain
        .rpc_url
        .parse()
        .with_context(|| format!("invalid RPC URL for {chain}"))?;
    let wallet = EthereumWallet::from(signer.clone());
    Ok(ProviderBuilder::new().wallet(wallet).connect_http(url).erased())
}

// ── Units ───────────────────────────────────────────────────────────

/// Stablecoin units → raw integer, floored. Never rounds up: an amount that
/// exceeds the on-chain balance after bridge fees would revert.
pub fn to_units(amount: f64, decimals: u8) -> U256 {
    U256::from((amount * 10f64.powi(decimals as i32)).floor().max(0.0) as u128)
}

pub fn from_units(units: U256, decimals: u8) -> f64 {
    let raw = u128::try_from(units).unwrap_or(u128::MAX);
    raw as f64 / 10f64.powi(decimals as i32)
}

pub fn parse_token_id(token: &str) -> Result<U256> {
    U256::from_str_radix(token, 10).map_err(|e| anyhow!("invalid token id '{token}': {e}"))
}

pub fn short_addr(addr: &Address) -> String {
    let s = format!("{addr}");
    format!("{}...{}", &s[..6], &s[s.len() - 4..])
}

// ── Gas policy ──────────────────────────────────────────────────────

/// Legacy-fee chains get a flat 1.5x overpay; EIP-1559 chains return None
/// and leave fee filling to the provider.
pub async fn legacy_gas_price(provider: &DynProvider, chain: &Chain) -> Result<Option<u128>> {
    if chain.supports_eip1559 {
        return Ok(None);
    }
    let gas_price = provider.get_gas_price().await.context("fetching gas price")?;
    Ok(Some(gas_price.saturating_mul(3) / 2))
}

// ── Receipts ────────────────────────────────────────────────────────

/// Wait for the receipt within `timeout` and fail on revert, preserving the
/// hash for diagnosis.
pub async fn confirm(
    pending: PendingTransactionBuilder<Ethereum>,
    timeout: Duration,
) -> Result<String, VenueError> {
    let receipt = pending
        .with_timeout(Some(timeout))
        .get_receipt()
        .await
        .map_err(|e| VenueError::UpstreamUnavailable(format!("awaiting receipt: {e}")))?;
    let hash = format!("{}", receipt.transaction_hash);
    if !receipt.status() {
        return Err(VenueError::OnChainRevert(hash));
    }
    Ok(hash)
}

// ── Log scans ───────────────────────────────────────────────────────

/// Newest ERC20 transfer into `to` of at least `min_amount` within the last
/// `blocks_back` blocks.
pub async fn find_incoming_erc20(
    provider: &DynProvider,
    token: Address,
    to: Address,
    min_amount: U256,
    blocks_back: u64,
) -> Result<Option<IncomingTransfer>> {
    let current = provider.get_block_number().await.context("fetching block number")?;
    let filter = Filter::new()
        .address(token)
        .event_signature(IERC20::Transfer::SIGNATURE_HASH)
        .topic2(to.into_word())
        .from_block(current.saturating_sub(blocks_back));
    let logs = provider.get_logs(&filter).await.context("fetching transfer logs")?;

    for log in logs.iter().rev() {
        let Ok(decoded) = log.log_decode::<IERC20::Transfer>() else {
            continue;
        };
        if decoded.inner.data.value >= min_amount {
            return Ok(Some(IncomingTransfer {
                tx_hash: log
                    .transaction_hash
                    .map(|h| format!("{h}"))
                    .unwrap_or_default(),
                amount: decoded.inner.data.value,
                block: log.block_number.unwrap_or_default(),
            }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversion_floors() {
        assert_eq!(to_units(1.2345678, 6), U256::from(1_234_567u64));
        assert_eq!(to_units(0.0, 6), U256::ZERO);
        // never negative
        assert_eq!(to_units(-3.0, 6), U256::ZERO);
        let back = from_units(U256::from(1_234_567u64), 6);
        assert!((back - 1.234567).abs() < 1e-9);
    }

    #[test]
    fn token_ids_parse_as_decimal() {
        assert!(parse_token_id("4394372887385518214471608448209527405727552777602031099972143344338178308080").is_ok());
        assert!(parse_token_id("0xabc").is_err());
    }
}
