use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::DynProvider;
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;

use crate::model::chain::Chain;

use super::VenueError;
use super::evm;

sol! {
    #[sol(rpc)]
    contract ISafe {
        function nonce() external view returns (uint256);
        function getTransactionHash(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            uint256 _nonce
        ) external view returns (bytes32);
        function execTransaction(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes signatures
        ) external payable returns (bool);
    }
}

/// Execute a call from a single-owner Safe-style wallet.
///
/// The Safe owner key signs the transaction hash (v stays 27/28, the plain
/// ECDSA path of the Safe's signature check); the submitting provider wallet
/// — the main relayer EOA — sends the outer transaction and pays gas.
pub async fn exec_transaction(
    submitter: &DynProvider,
    chain: &Chain,
    safe_address: Address,
    owner: &PrivateKeySigner,
    to: Address,
    value: U256,
    data: Bytes,
) -> Result<String, VenueError> {
    let safe = ISafe::new(safe_address, submitter);

    let nonce = safe
        .nonce()
        .call()
        .await
        .map_err(|e| VenueError::UpstreamUnavailable(format!("safe nonce: {e}")))?;

    let safe_tx_hash = safe
        .getTransactionHash(
            to,
            value,
            data.clone(),
            0,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            Address::ZERO,
            Address::ZERO,
            nonce,
        )
        .call()
        .await
        .map_err(|e| VenueError::UpstreamUnavailable(format!("safe tx hash: {e}")))?;

    let signature = owner
        .sign_hash(&safe_tx_hash)
        .await
        .map_err(|e| VenueError::Other(anyhow::anyhow!("signing safe tx: {e}")))?;

    let mut call = safe
        .execTransaction(
            to,
            value,
            data,
            0,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            Address::ZERO,
            Address::ZERO,
            Bytes::from(signature.as_bytes().to_vec()),
        )
        .gas(300_000);
    if let Some(gas_price) = evm::legacy_gas_price(submitter, chain)
        .await
        .map_err(VenueError::Other)?
    {
        call = call.gas_price(gas_price);
    }

    let pending = call
        .send()
        .await
        .map_err(|e| VenueError::UpstreamUnavailable(format!("safe exec: {e}")))?;
    evm::confirm(pending, Duration::from_secs(120)).await
}
