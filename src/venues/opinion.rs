use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256, address};
use alloy::providers::DynProvider;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::model::Platform;
use crate::model::book::{Direction, Level, Orderbook, Side};
use crate::model::chain::Chain;
use crate::model::event::RoutingKey;
use crate::model::floor_dp;
use crate::run::config::OpinionConfig;

use super::evm::{self, IConditionalTokens, IERC20};
use super::signing::{self, ExchangeDomain};
use super::{
    IncomingTransfer, OperatorApproval, OrderState, PlacedOrder, VenueAdapter, VenueError,
    VenueResult, safe,
};

const API_BASE: &str = "https://openapi.opinion.trade/openapi";

const CONDITIONAL_TOKENS: Address = address!("0xAD1a38cEc043e70E83a3eC30443dB285ED10D774");
const CTF_EXCHANGE: Address = address!("0x59047B5d5BB568730Eb5462eb1DEeB1fC17126Db");

/// Opinion adapter. Smart-wallet custody: USDT and shares sit on a
/// single-owner Safe-style wallet; the adapter's signing key is the Safe
/// owner, and the main relayer EOA pays gas and is approved to move funds
/// off the wallet.
pub struct OpinionAdapter {
    http: reqwest::Client,
    /// Safe owner key; signs orders and Safe transactions.
    signer: PrivateKeySigner,
    smart_wallet: Address,
    main_signer: PrivateKeySigner,
    chain: Chain,
    /// Provider whose wallet is the main EOA: every outer transaction on BSC
    /// is submitted and paid by it.
    provider: DynProvider,
    api_key: String,
}

#[derive(Deserialize)]
struct RawLevel {
    price: serde_json::Value,
    size: serde_json::Value,
}

#[derive(Deserialize, Default)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    errno: i64,
    #[serde(default)]
    errmsg: String,
    result: Option<T>,
}

impl OpinionAdapter {
    pub fn new(config: &OpinionConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| anyhow!("invalid opinion private key: {e}"))?;
        let main_signer: PrivateKeySigner = config
            .main_relayer_key
            .parse()
            .map_err(|e| anyhow!("invalid main relayer key: {e}"))?;
        let chain = Chain::bsc();
        let provider = evm::signing_provider(&chain, &main_signer)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building opinion http client")?;

        info!(
            eoa = %signer.address(),
            smart_wallet = %config.smart_wallet,
            "opinion adapter initialized"
        );
        Ok(OpinionAdapter {
            http,
            signer,
            smart_wallet: config.smart_wallet,
            main_signer,
            chain,
            provider,
            api_key: config.api_key.clone(),
        })
    }

    fn token_for(&self, key: &RoutingKey, side: Side) -> VenueResult<String> {
        key.token_for(side)
            .map(str::to_string)
            .ok_or_else(|| VenueError::Other(anyhow!("routing key has no {side} token")))
    }

    /// Route an outbound transfer through the Safe: owner signs, main EOA
    /// submits and pays.
    async fn exec_from_wallet(&self, to: Address, data: Bytes) -> VenueResult<String> {
        safe::exec_transaction(
            &self.provider,
            &self.chain,
            self.smart_wallet,
            &self.signer,
            to,
            U256::ZERO,
            data,
        )
        .await
    }

}

fn level_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl VenueAdapter for OpinionAdapter {
    fn platform(&self) -> Platform {
        Platform::Opinion
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn decimals(&self) -> u8 {
        18
    }

    fn operator_address(&self) -> Address {
        self.smart_wallet
    }

    fn shares_contract(&self) -> Address {
        CONDITIONAL_TOKENS
    }

    fn min_order_value(&self) -> f64 {
        1.0
    }

    /// Bought shares stay on the smart wallet; sells are placed from it too.
    fn keeps_shares_in_custody(&self) -> bool {
        true
    }

    fn floor_amount(&self, amount: f64, _direction: Direction) -> f64 {
        floor_dp(amount, 2)
    }

    async fn fetch_book(
        &self,
        key: &RoutingKey,
        outcome: &str,
        side: Side,
    ) -> VenueResult<Orderbook> {
        let token = self.token_for(key, side)?;
        let resp = self
            .http
            .get(format!("{API_BASE}/token/orderbook"))
            .query(&[("token_id", token.as_str())])
            .header("apikey", &self.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(VenueError::UpstreamUnavailable(format!(
                "orderbook fetch returned {}",
                resp.status()
            )));
        }
        let envelope: Envelope<RawBook> = resp.json().await?;
        if envelope.errno != 0 {
            return Err(VenueError::UpstreamRejected(envelope.errmsg));
        }
        let raw = envelope.result.unwrap_or_default();
        let to_levels = |levels: &[RawLevel]| {
            levels
                .iter()
                .filter_map(|l| Some(Level::new(level_f64(&l.price)?, level_f64(&l.size)?)))
                .collect()
        };
        Ok(Orderbook::new(
            Platform::Opinion,
            outcome,
            side,
            to_levels(&raw.asks),
            to_levels(&raw.bids),
        ))
    }

    async fn place_order(
        &self,
        token: &str,
        market: Option<&str>,
        amount: f64,
        price: f64,
        direction: Direction,
    ) -> VenueResult<PlacedOrder> {
        let market_id = market
            .ok_or_else(|| VenueError::Other(anyhow!("opinion order requires market id")))?;
        let value = match direction {
            Direction::Buy => amount,
            Direction::Sell => amount * price,
        };
        if value < self.min_order_value() {
            return Err(VenueError::BelowMinimum {
                value,
                minimum: self.min_order_value(),
            });
        }

        let amount = floor_dp(amount, 2);
        let (maker_amount, taker_amount, side_u8) = match direction {
            Direction::Buy => (
                evm::to_units(amount, 18),
                evm::to_units(floor_dp(amount / price, 2), 18),
                signing::SIDE_BUY,
            ),
            Direction::Sell => (
                evm::to_units(amount, 18),
                evm::to_units(floor_dp(amount * price, 2), 18),
                signing::SIDE_SELL,
            ),
        };

        let order = signing::Order {
            salt: signing::random_salt(),
            maker: self.smart_wallet,
            signer: self.signer.address(),
            taker: Address::ZERO,
            tokenId: evm::parse_token_id(token)?,
            makerAmount: maker_amount,
            takerAmount: taker_amount,
            expiration: U256::ZERO,
            nonce: U256::ZERO,
            feeRateBps: U256::ZERO,
            side: side_u8,
            signatureType: signing::SIGNATURE_SAFE,
        };
        let domain = ExchangeDomain {
            name: "Opinion CTF Exchange",
            chain_id: self.chain.id,
            verifying_contract: CTF_EXCHANGE,
        };
        let signature = signing::sign_order(&self.signer, &domain, &order).await?;

        let amount_field = match direction {
            Direction::Buy => "makerAmountInQuoteToken",
            Direction::Sell => "makerAmountInBaseToken",
        };
        let mut payload = serde_json::json!({
            "marketId": market_id,
            "tokenId": token,
            "price": price.to_string(),
            "side": side_u8,
            "orderType": "FOK",
            "order": {
                "salt": order.salt.to::<u64>(),
                "maker": self.smart_wallet.to_string(),
                "signer": self.signer.address().to_string(),
                "taker": Address::ZERO.to_string(),
                "tokenId": token,
                "makerAmount": maker_amount.to_string(),
                "takerAmount": taker_amount.to_string(),
                "expiration": "0",
                "nonce": "0",
                "feeRateBps": "0",
                "side": side_u8,
                "signatureType": signing::SIGNATURE_SAFE,
                "signature": signature,
            },
        });
        payload[amount_field] = serde_json::json!(amount);

        debug!(%amount, %price, %market_id, "placing opinion FOK order");
        let resp = self
            .http
            .post(format!("{API_BASE}/order"))
            .header("apikey", &self.api_key)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(VenueError::UpstreamRejected(format!(
                "order failed: {} {}",
                resp.status(),
                resp.text().await.unwrap_or_default()
            )));
        }
        let envelope: Envelope<serde_json::Value> = resp.json().await?;
        if envelope.errno != 0 {
            return Err(VenueError::UpstreamRejected(envelope.errmsg));
        }
        let order_data = envelope
            .result
            .as_ref()
            .and_then(|r| r.get("order_data"))
            .cloned()
            .unwrap_or_default();
        let order_id = order_data
            .get("order_id")
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        let status = match order_data.get("status").and_then(|v| v.as_i64()) {
            Some(1) => "NEW".to_string(),
            Some(2) => "FILLED".to_string(),
            Some(other) => other.to_string(),
            None => "UNKNOWN".to_string(),
        };
        info!(?order_id, %status, "opinion order placed");
        Ok(PlacedOrder { order_id, status })
    }

    async fn order_status(&self, order_id: &str) -> VenueResult<OrderState> {
        let resp = self
            .http
            .get(format!("{API_BASE}/order/{order_id}"))
            .header("apikey", &self.api_key)
            .send()
            .await?;
        let envelope: Envelope<serde_json::Value> = resp.json().await?;
        if envelope.errno != 0 {
            return Err(VenueError::UpstreamRejected(envelope.errmsg));
        }
        let order = envelope
            .result
            .as_ref()
            .and_then(|r| r.get("order_data"))
            .cloned()
            .unwrap_or_default();
        let as_f64 = |field: &str| {
            order
                .get(field)
                .and_then(level_f64)
                .unwrap_or(0.0)
        };
        let original = as_f64("order_amount");
        let filled = as_f64("filled_amount");
        let status = match order.get("status").and_then(|v| v.as_i64()) {
            Some(1) => "OPEN",
            Some(2) => "FILLED",
            Some(3) => "CANCELLED",
            Some(4) => "EXPIRED",
            _ => "UNKNOWN",
        };
        Ok(OrderState {
            order_id: order_id.to_string(),
            status: status.to_string(),
            filled_raw: evm::to_units(filled, 18),
            remaining_raw: evm::to_units((original - filled).max(0.0), 18),
        })
    }

    async fn balance_stablecoin(&self, address: Option<Address>) -> VenueResult<U256> {
        let account = address.unwrap_or(self.smart_wallet);
        IERC20::new(self.chain.stablecoin, &self.provider)
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))
    }

    async fn balance_shares(&self, address: Address, token: &str) -> VenueResult<U256> {
        IConditionalTokens::new(CONDITIONAL_TOKENS, &self.provider)
            .balanceOf(address, evm::parse_token_id(token)?)
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))
    }

    async fn transfer_stablecoin_to(&self, to: Address, amount: U256) -> VenueResult<String> {
        let data = IERC20::transferCall { to, amount }.abi_encode();
        self.exec_from_wallet(self.chain.stablecoin, data.into()).await
    }

    async fn transfer_shares_to(
        &self,
        to: Address,
        token: &str,
        amount: U256,
    ) -> VenueResult<String> {
        let data = IConditionalTokens::safeTransferFromCall {
            from: self.smart_wallet,
            to,
            id: evm::parse_token_id(token)?,
            amount,
            data: Bytes::new(),
        }
        .abi_encode();
        self.exec_from_wallet(CONDITIONAL_TOKENS, data.into()).await
    }

    async fn pull_stablecoin_from(&self, user: Address, amount: U256) -> VenueResult<String> {
        let erc20 = IERC20::new(self.chain.stablecoin, &self.provider);
        let mut call = erc20
            .transferFrom(user, self.smart_wallet, amount)
            .gas(100_000);
        if let Some(gas_price) = evm::legacy_gas_price(&self.provider, &self.chain)
            .await
            .map_err(VenueError::Other)?
        {
            call = call.gas_price(gas_price);
        }
        let pending = call
            .send()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        evm::confirm(pending, Duration::from_secs(60)).await
    }

    async fn pull_shares_from(
        &self,
        user: Address,
        token: &str,
        amount: U256,
    ) -> VenueResult<String> {
        let conditional_tokens = IConditionalTokens::new(CONDITIONAL_TOKENS, &self.provider);
        let mut call = conditional_tokens
            .safeTransferFrom(
                user,
                self.smart_wallet,
                evm::parse_token_id(token)?,
                amount,
                Bytes::new(),
            )
            .gas(150_000);
        if let Some(gas_price) = evm::legacy_gas_price(&self.provider, &self.chain)
            .await
            .map_err(VenueError::Other)?
        {
            call = call.gas_price(gas_price);
        }
        let pending = call
            .send()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        evm::confirm(pending, Duration::from_secs(60)).await
    }

    async fn check_operator_approval(&self, owner: Address) -> VenueResult<OperatorApproval> {
        // Users approve the main relayer EOA on BSC, not the smart wallet.
        let operator = self.main_signer.address();
        let erc20_allowance = IERC20::new(self.chain.stablecoin, &self.provider)
            .allowance(owner, operator)
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        let erc1155_approved = IConditionalTokens::new(CONDITIONAL_TOKENS, &self.provider)
            .isApprovedForAll(owner, operator)
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        Ok(OperatorApproval { erc20_allowance, erc1155_approved })
    }

    async fn find_incoming_stablecoin(
        &self,
        min_amount: U256,
        blocks_back: u64,
    ) -> VenueResult<Option<IncomingTransfer>> {
        evm::find_incoming_erc20(
            &self.provider,
            self.chain.stablecoin,
            self.smart_wallet,
            min_amount,
            blocks_back,
        )
        .await
        .map_err(VenueError::Other)
    }

    /// Approve the main EOA to move USDT and shares off the smart wallet.
    async fn setup_approvals(&self) -> VenueResult<Vec<(String, String)>> {
        let operator = self.main_signer.address();
        let mut results = Vec::new();

        let approve = IERC20::approveCall { spender: operator, amount: U256::MAX }.abi_encode();
        let tx = self.exec_from_wallet(self.chain.stablecoin, approve.into()).await?;
        results.push(("usdt-main-relayer".into(), tx));

        let set_approval = IConditionalTokens::setApprovalForAllCall {
            operator,
            approved: true,
        }
        .abi_encode();
        let tx = self.exec_from_wallet(CONDITIONAL_TOKENS, set_approval.into()).await?;
        results.push(("ctf-main-relayer".into(), tx));
        Ok(results)
    }
}
