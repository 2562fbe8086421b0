use std::time::Duration;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Deserialize;

use super::{BridgeStatus, RelayError};

pub const LIFI_API_BASE: &str = "https://li.quest/v1";
pub const INTEGRATOR: &str = "premarket-router";
/// 0.5% — matches what the quote service defaults to for stablecoins.
pub const SLIPPAGE: f64 = 0.005;

/// Quotes below this gas limit are treated as underestimates and floored.
const GAS_TRUST_THRESHOLD: u64 = 500_000;
const GAS_FLOOR: u64 = 800_000;

// ── Quote service DTOs ──────────────────────────────────────────────

/// The transaction blob is opaque: signed and submitted without parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequest {
    pub to: String,
    pub data: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "gasLimit")]
    pub gas_limit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteEstimate {
    #[serde(rename = "toAmount")]
    pub to_amount: Option<String>,
    #[serde(rename = "approvalAddress")]
    pub approval_address: Option<String>,
    #[serde(rename = "executionDuration")]
    pub execution_duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    #[serde(default)]
    pub estimate: Option<QuoteEstimate>,
    #[serde(rename = "transactionRequest")]
    pub transaction_request: Option<TransactionRequest>,
}

impl QuoteResponse {
    pub fn transaction(&self) -> Result<&TransactionRequest, RelayError> {
        self.transaction_request
            .as_ref()
            .ok_or_else(|| RelayError::QuoteFailed("quote missing transactionRequest".into()))
    }
}

#[derive(Debug, Deserialize)]
struct StatusReceiving {
    #[serde(rename = "txHash")]
    tx_hash: Option<String>,
    #[serde(rename = "chainId")]
    chain_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    substatus: Option<String>,
    #[serde(default)]
    receiving: Option<StatusReceiving>,
}

// ── Client ──────────────────────────────────────────────────────────

pub struct LifiClient {
    http: reqwest::Client,
}

impl LifiClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("premarket-router/0.1")
            .build()
            .context("building bridge quote client")?;
        Ok(LifiClient { http })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn quote(
        &self,
        from_chain: u64,
        to_chain: u64,
        from_token: Address,
        to_token: Address,
        from_amount: U256,
        from_address: Address,
        to_address: Address,
    ) -> Result<QuoteResponse, RelayError> {
        let resp = self
            .http
            .get(format!("{LIFI_API_BASE}/quote"))
            .query(&[
                ("fromChain", from_chain.to_string()),
                ("toChain", to_chain.to_string()),
                ("fromToken", from_token.to_string()),
                ("toToken", to_token.to_string()),
                ("fromAmount", from_amount.to_string()),
                ("fromAddress", from_address.to_string()),
                ("toAddress", to_address.to_string()),
                ("slippage", SLIPPAGE.to_string()),
                ("integrator", INTEGRATOR.to_string()),
            ])
            .send()
            .await
            .map_err(|e| RelayError::QuoteFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::QuoteFailed(format!("{status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| RelayError::QuoteFailed(format!("parsing quote: {e}")))
    }

    pub async fn status(&self, tx_hash: &str) -> Result<BridgeStatus, RelayError> {
        let resp = self
            .http
            .get(format!("{LIFI_API_BASE}/status"))
            .query(&[("txHash", tx_hash)])
            .send()
            .await
            .map_err(|e| RelayError::StatusFailed(e.to_string()))?;
        let body: StatusResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::StatusFailed(format!("parsing status: {e}")))?;
        Ok(match body.status.as_str() {
            "DONE" => BridgeStatus::Done {
                receiving_tx: body.receiving.as_ref().and_then(|r| r.tx_hash.clone()),
                chain_id: body.receiving.as_ref().and_then(|r| r.chain_id),
            },
            "FAILED" => BridgeStatus::Failed(
                body.substatus.unwrap_or_else(|| "bridge reported FAILED".into()),
            ),
            // PENDING, NOT_FOUND (not yet indexed), anything unknown
            _ => BridgeStatus::Pending,
        })
    }
}

// ── Blob parsing ────────────────────────────────────────────────────

/// Quote gas limits under 500k are an empirically observed underestimate;
/// floor them to 800k rather than trusting the provider.
pub fn effective_gas_limit(tx: &TransactionRequest) -> u64 {
    let quoted = tx
        .gas_limit
        .as_deref()
        .and_then(parse_numeric)
        .unwrap_or(0);
    if quoted < GAS_TRUST_THRESHOLD { GAS_FLOOR } else { quoted }
}

pub fn parse_value(tx: &TransactionRequest) -> U256 {
    let Some(raw) = tx.value.as_deref() else {
        return U256::ZERO;
    };
    if let Some(hex) = raw.strip_prefix("0x") {
        U256::from_str_radix(hex, 16).unwrap_or(U256::ZERO)
    } else {
        raw.parse().unwrap_or(U256::ZERO)
    }
}

fn parse_numeric(raw: &str) -> Option<u64> {
    if let Some(hex) = raw.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(gas_limit: Option<&str>, value: Option<&str>) -> TransactionRequest {
        TransactionRequest {
            to: "0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE".into(),
            data: "0xdeadbeef".into(),
            value: value.map(str::to_string),
            gas_limit: gas_limit.map(str::to_string),
        }
    }

    #[test]
    fn low_gas_quotes_are_floored() {
        assert_eq!(effective_gas_limit(&tx(Some("400000"), None)), 800_000);
        assert_eq!(effective_gas_limit(&tx(Some("0x61a80"), None)), 800_000); // 400k hex
        assert_eq!(effective_gas_limit(&tx(None, None)), 800_000);
        // quotes above the trust threshold pass through untouched
        assert_eq!(effective_gas_limit(&tx(Some("650000"), None)), 650_000);
    }

    #[test]
    fn value_parses_hex_and_decimal() {
        assert_eq!(parse_value(&tx(None, Some("0x10"))), U256::from(16));
        assert_eq!(parse_value(&tx(None, Some("42"))), U256::from(42));
        assert_eq!(parse_value(&tx(None, None)), U256::ZERO);
    }
}
