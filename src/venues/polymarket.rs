use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256, address};
use alloy::providers::DynProvider;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::model::Platform;
use crate::model::book::{Direction, Level, Orderbook, Side};
use crate::model::chain::Chain;
use crate::model::event::RoutingKey;
use crate::model::floor_dp;
use crate::run::config::PolymarketConfig;

use super::evm::{self, IConditionalTokens, IERC20};
use super::signing::{self, ExchangeDomain};
use super::{
    IncomingTransfer, OperatorApproval, OrderState, PlacedOrder, VenueAdapter, VenueError,
    VenueResult,
};

const CLOB_BASE: &str = "https://clob.polymarket.com";

const CTF_ADDRESS: Address = address!("0x4D97DCd97eC945f40cF65F87097ACe5EA0476045");
const EXCHANGE_REGULAR: Address = address!("0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E");
const EXCHANGE_NEGRISK: Address = address!("0xC5d563A36AE78145C45a50134d48A1215220f80a");

/// Allowance below this is treated as unapproved and re-approved to max.
const MIN_ALLOWANCE: u64 = 1_000_000_000_000;

#[derive(Debug, Clone)]
struct ApiCreds {
    key: String,
    secret: String,
    passphrase: String,
}

/// Polymarket CLOB adapter. Direct-EOA custody: stablecoin and shares sit on
/// the signing key's address, orders are signed with signature_type 0.
pub struct PolymarketAdapter {
    http: reqwest::Client,
    signer: PrivateKeySigner,
    chain: Chain,
    provider: DynProvider,
    creds: Option<ApiCreds>,
}

#[derive(Deserialize)]
struct RawLevel {
    price: String,
    size: String,
}

#[derive(Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

impl PolymarketAdapter {
    pub fn new(config: &PolymarketConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| anyhow!("invalid polymarket private key: {e}"))?;
        let chain = Chain::polygon();
        let provider = evm::signing_provider(&chain, &signer)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building polymarket http client")?;

        let creds = match (&config.api_key, &config.api_secret, &config.api_passphrase) {
            (Some(key), Some(secret), Some(passphrase)) => Some(ApiCreds {
                key: key.clone(),
                secret: secret.clone(),
                passphrase: passphrase.clone(),
            }),
            _ => {
                warn!("polymarket api credentials missing; order placement disabled");
                None
            }
        };

        info!(eoa = %signer.address(), "polymarket adapter initialized");
        Ok(PolymarketAdapter { http, signer, chain, provider, creds })
    }

    fn token_for(&self, key: &RoutingKey, side: Side) -> VenueResult<String> {
        key.token_for(side)
            .map(str::to_string)
            .ok_or_else(|| VenueError::Other(anyhow!("routing key has no {side} token")))
    }

    /// L2 auth headers: HMAC-SHA256 of timestamp+method+path+body under the
    /// url-safe-base64 api secret.
    fn l2_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> VenueResult<Vec<(&'static str, String)>> {
        let creds = self.creds.as_ref().ok_or(VenueError::NotConfigured)?;
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let message = format!("{timestamp}{method}{path}{body}");

        let secret = base64::engine::general_purpose::URL_SAFE
            .decode(&creds.secret)
            .map_err(|e| VenueError::Other(anyhow!("invalid api secret: {e}")))?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&secret)
            .map_err(|e| VenueError::Other(anyhow!("hmac init: {e}")))?;
        mac.update(message.as_bytes());
        let signature =
            base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes());

        Ok(vec![
            ("POLY_ADDRESS", self.signer.address().to_string()),
            ("POLY_SIGNATURE", signature),
            ("POLY_TIMESTAMP", timestamp),
            ("POLY_API_KEY", creds.key.clone()),
            ("POLY_PASSPHRASE", creds.passphrase.clone()),
        ])
    }

    async fn neg_risk(&self, token: &str) -> bool {
        let result: Result<serde_json::Value, _> = async {
            self.http
                .get(format!("{CLOB_BASE}/neg-risk"))
                .query(&[("token_id", token)])
                .send()
                .await?
                .json()
                .await
        }
        .await;
        match result {
            Ok(value) => value
                .get("neg_risk")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            Err(err) => {
                warn!("neg-risk lookup failed, assuming regular market: {err}");
                false
            }
        }
    }

    async fn raw_book(&self, token: &str) -> VenueResult<RawBook> {
        let resp = self
            .http
            .get(format!("{CLOB_BASE}/book"))
            .query(&[("token_id", token)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(VenueError::UpstreamUnavailable(format!(
                "book fetch returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}

fn parse_levels(raw: &[RawLevel]) -> Vec<Level> {
    raw.iter()
        .filter_map(|l| {
            let price: f64 = l.price.parse().ok()?;
            let size: f64 = l.size.parse().ok()?;
            Some(Level::new(price, size))
        })
        .collect()
}

#[async_trait]
impl VenueAdapter for PolymarketAdapter {
    fn platform(&self) -> Platform {
        Platform::Polymarket
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn decimals(&self) -> u8 {
        6
    }

    fn operator_address(&self) -> Address {
        self.signer.address()
    }

    fn shares_contract(&self) -> Address {
        CTF_ADDRESS
    }

    fn min_order_value(&self) -> f64 {
        1.0
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
        let raw = self.raw_book(&token).await?;
        Ok(Orderbook::new(
            Platform::Polymarket,
            outcome,
            side,
            parse_levels(&raw.asks),
            parse_levels(&raw.bids),
        ))
    }

    async fn place_order(
        &self,
        token: &str,
        _market: Option<&str>,
        amount: f64,
        price: f64,
        direction: Direction,
    ) -> VenueResult<PlacedOrder> {
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

        let neg_risk = self.neg_risk(token).await;
        let exchange = if neg_risk { EXCHANGE_NEGRISK } else { EXCHANGE_REGULAR };

        let amount = floor_dp(amount, 2);
        let (maker_amount, taker_amount, side_u8) = match direction {
            Direction::Buy => (
                evm::to_units(amount, 6),
                evm::to_units(floor_dp(amount / price, 2), 6),
                signing::SIDE_BUY,
            ),
            Direction::Sell => (
                evm::to_units(amount, 6),
                evm::to_units(floor_dp(amount * price, 2), 6),
                signing::SIDE_SELL,
            ),
        };

        let order = signing::Order {
            salt: signing::random_salt(),
            maker: self.signer.address(),
            signer: self.signer.address(),
            taker: Address::ZERO,
            tokenId: evm::parse_token_id(token)?,
            makerAmount: maker_amount,
            takerAmount: taker_amount,
            expiration: U256::ZERO,
            nonce: U256::ZERO,
            feeRateBps: U256::ZERO,
            side: side_u8,
            signatureType: signing::SIGNATURE_EOA,
        };
        let domain = ExchangeDomain {
            name: "Polymarket CTF Exchange",
            chain_id: self.chain.id,
            verifying_contract: exchange,
        };
        let signature = signing::sign_order(&self.signer, &domain, &order).await?;

        let owner = self
            .creds
            .as_ref()
            .ok_or(VenueError::NotConfigured)?
            .key
            .clone();
        let payload = serde_json::json!({
            "order": {
                "salt": order.salt.to::<u64>(),
                "maker": self.signer.address().to_string(),
                "signer": self.signer.address().to_string(),
                "taker": Address::ZERO.to_string(),
                "tokenId": token,
                "makerAmount": maker_amount.to_string(),
                "takerAmount": taker_amount.to_string(),
                "expiration": "0",
                "nonce": "0",
                "feeRateBps": "0",
                "side": match direction { Direction::Buy => "BUY", Direction::Sell => "SELL" },
                "signatureType": 0,
                "signature": signature,
            },
            "owner": owner,
            "orderType": "FOK",
        });
        let body = payload.to_string();
        let headers = self.l2_headers("POST", "/order", &body)?;

        debug!(%amount, %price, %neg_risk, "placing polymarket FOK order");
        let mut request = self
            .http
            .post(format!("{CLOB_BASE}/order"))
            .header("Content-Type", "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let resp = request.send().await?;
        let status = resp.status();
        let value: serde_json::Value = resp.json().await?;

        if let Some(msg) = value.get("errorMsg").and_then(|v| v.as_str())
            && !msg.is_empty()
        {
            return Err(VenueError::UpstreamRejected(msg.to_string()));
        }
        if !status.is_success() {
            return Err(VenueError::UpstreamRejected(value.to_string()));
        }

        let order_id = value
            .get("orderID")
            .or_else(|| value.get("orderId"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let order_status = value
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN")
            .to_string();
        info!(?order_id, status = %order_status, "polymarket order placed");
        Ok(PlacedOrder { order_id, status: order_status })
    }

    async fn order_status(&self, order_id: &str) -> VenueResult<OrderState> {
        let path = format!("/data/order/{order_id}");
        let headers = self.l2_headers("GET", &path, "")?;
        let mut request = self.http.get(format!("{CLOB_BASE}{path}"));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let value: serde_json::Value = request.send().await?.json().await?;

        let as_f64 = |field: &str| {
            value
                .get(field)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        let original = as_f64("original_size");
        let matched = as_f64("size_matched");
        Ok(OrderState {
            order_id: order_id.to_string(),
            status: value
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string(),
            filled_raw: evm::to_units(matched, 6),
            remaining_raw: evm::to_units((original - matched).max(0.0), 6),
        })
    }

    async fn balance_stablecoin(&self, address: Option<Address>) -> VenueResult<U256> {
        let account = address.unwrap_or_else(|| self.operator_address());
        IERC20::new(self.chain.stablecoin, &self.provider)
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))
    }

    async fn balance_shares(&self, address: Address, token: &str) -> VenueResult<U256> {
        IConditionalTokens::new(CTF_ADDRESS, &self.provider)
            .balanceOf(address, evm::parse_token_id(token)?)
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))
    }

    async fn transfer_stablecoin_to(&self, to: Address, amount: U256) -> VenueResult<String> {
        let pending = IERC20::new(self.chain.stablecoin, &self.provider)
            .transfer(to, amount)
            .gas(100_000)
            .send()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        evm::confirm(pending, Duration::from_secs(60)).await
    }

    async fn transfer_shares_to(
        &self,
        to: Address,
        token: &str,
        amount: U256,
    ) -> VenueResult<String> {
        let pending = IConditionalTokens::new(CTF_ADDRESS, &self.provider)
            .safeTransferFrom(
                self.operator_address(),
                to,
                evm::parse_token_id(token)?,
                amount,
                Bytes::new(),
            )
            .gas(150_000)
            .send()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        evm::confirm(pending, Duration::from_secs(60)).await
    }

    async fn pull_stablecoin_from(&self, user: Address, amount: U256) -> VenueResult<String> {
        let pending = IERC20::new(self.chain.stablecoin, &self.provider)
            .transferFrom(user, self.operator_address(), amount)
            .gas(100_000)
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
        let pending = IConditionalTokens::new(CTF_ADDRESS, &self.provider)
            .safeTransferFrom(
                user,
                self.operator_address(),
                evm::parse_token_id(token)?,
                amount,
                Bytes::new(),
            )
            .gas(200_000)
            .send()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        evm::confirm(pending, Duration::from_secs(60)).await
    }

    async fn check_operator_approval(&self, owner: Address) -> VenueResult<OperatorApproval> {
        let erc20_allowance = IERC20::new(self.chain.stablecoin, &self.provider)
            .allowance(owner, self.operator_address())
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        let erc1155_approved = IConditionalTokens::new(CTF_ADDRESS, &self.provider)
            .isApprovedForAll(owner, self.operator_address())
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
            self.operator_address(),
            min_amount,
            blocks_back,
        )
        .await
        .map_err(VenueError::Other)
    }

    async fn setup_approvals(&self) -> VenueResult<Vec<(String, String)>> {
        let mut results = Vec::new();
        let usdc = IERC20::new(self.chain.stablecoin, &self.provider);
        let ctf = IConditionalTokens::new(CTF_ADDRESS, &self.provider);

        for (label, exchange) in [
            ("regular-exchange", EXCHANGE_REGULAR),
            ("negrisk-exchange", EXCHANGE_NEGRISK),
        ] {
            let allowance = usdc
                .allowance(self.operator_address(), exchange)
                .call()
                .await
                .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
            if allowance < U256::from(MIN_ALLOWANCE) {
                let pending = usdc
                    .approve(exchange, U256::MAX)
                    .gas(100_000)
                    .send()
                    .await
                    .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
                let tx = evm::confirm(pending, Duration::from_secs(60)).await?;
                results.push((format!("usdc-{label}"), tx));
            } else {
                results.push((format!("usdc-{label}"), "already approved".into()));
            }

            let approved = ctf
                .isApprovedForAll(self.operator_address(), exchange)
                .call()
                .await
                .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
            if !approved {
                let pending = ctf
                    .setApprovalForAll(exchange, true)
                    .gas(100_000)
                    .send()
                    .await
                    .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
                let tx = evm::confirm(pending, Duration::from_secs(60)).await?;
                results.push((format!("ctf-{label}"), tx));
            } else {
                results.push((format!("ctf-{label}"), "already approved".into()));
            }
        }
        Ok(results)
    }
}
