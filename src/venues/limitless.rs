use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256, address};
use alloy::providers::DynProvider;
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::model::Platform;
use crate::model::book::{Direction, Level, Orderbook, Side};
use crate::model::chain::Chain;
use crate::model::event::RoutingKey;
use crate::model::floor_dp;
use crate::run::config::LimitlessConfig;

use super::evm::{self, IConditionalTokens, IERC20};
use super::signing::{self, ExchangeDomain};
use super::{
    IncomingTransfer, OperatorApproval, OrderState, PlacedOrder, VenueAdapter, VenueError,
    VenueResult,
};

const API_BASE: &str = "https://api.limitless.exchange";

const CTF_ADDRESS: Address = address!("0xC9c98965297Bc527861c898329Ee280632B76e18");
const CTF_EXCHANGE: Address = address!("0x5a38afc17F7E97ad8d6C547ddb837E40B4aEDfC6");

const FEE_RATE_BPS: u64 = 300;

/// Limitless adapter. Proxy-EOA custody: the signing key is also the trading
/// wallet, shares and USDC live on it directly. The venue publishes a single
/// yes-side book; the no side is synthesized by reflection.
pub struct LimitlessAdapter {
    /// Cookie-store client: login leaves a session the order endpoints need.
    http: reqwest::Client,
    signer: PrivateKeySigner,
    chain: Chain,
    provider: DynProvider,
    api_key: Option<String>,
    owner_id: tokio::sync::Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct RawLevel {
    price: serde_json::Value,
    size: serde_json::Value,
}

#[derive(Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

fn raw_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl LimitlessAdapter {
    pub fn new(config: &LimitlessConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| anyhow!("invalid limitless private key: {e}"))?;
        let chain = Chain::base();
        let provider = evm::signing_provider(&chain, &signer)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .cookie_store(true)
            .build()
            .context("building limitless http client")?;

        info!(eoa = %signer.address(), "limitless adapter initialized");
        Ok(LimitlessAdapter {
            http,
            signer,
            chain,
            provider,
            api_key: config.api_key.clone(),
            owner_id: tokio::sync::Mutex::new(None),
        })
    }

    fn market_slug<'a>(&self, key: &'a RoutingKey) -> VenueResult<&'a str> {
        key.market
            .as_deref()
            .ok_or_else(|| VenueError::Other(anyhow!("routing key has no market slug")))
    }

    /// Sign the venue's login message and open a session. Returns the account
    /// owner id the order endpoints require.
    async fn login(&self) -> VenueResult<String> {
        let message = self
            .http
            .get(format!("{API_BASE}/auth/signing-message"))
            .send()
            .await?
            .text()
            .await?;
        let signature = self
            .signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| VenueError::Other(anyhow!("signing login message: {e}")))?;

        let resp = self
            .http
            .post(format!("{API_BASE}/auth/login"))
            .header("x-account", self.signer.address().to_string())
            .header("x-signature", alloy::hex::encode_prefixed(signature.as_bytes()))
            .header("x-signing-message", alloy::hex::encode_prefixed(message.as_bytes()))
            .json(&serde_json::json!({ "client": "eoa" }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(VenueError::UpstreamRejected(format!(
                "login failed: {} {}",
                resp.status(),
                resp.text().await.unwrap_or_default()
            )));
        }
        let body: serde_json::Value = resp.json().await?;
        let id = value_to_string(body.get("id"))
            .ok_or_else(|| VenueError::UpstreamRejected("login response missing id".into()))?;
        info!(owner_id = %id, "limitless login ok");
        Ok(id)
    }

    async fn ensure_login(&self) -> VenueResult<String> {
        let mut guard = self.owner_id.lock().await;
        if let Some(id) = guard.as_ref() {
            return Ok(id.clone());
        }
        let id = self.login().await?;
        *guard = Some(id.clone());
        Ok(id)
    }

    async fn market(&self, slug: &str) -> VenueResult<serde_json::Value> {
        let mut request = self.http.get(format!("{API_BASE}/markets/{slug}"));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(VenueError::UpstreamUnavailable(format!(
                "market fetch returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// The venue quotes the yes token; sizes come back in raw USDC units.
    async fn yes_book(&self, slug: &str, outcome: &str) -> VenueResult<Orderbook> {
        let mut request = self.http.get(format!("{API_BASE}/markets/{slug}/orderbook"));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(VenueError::UpstreamUnavailable(format!(
                "orderbook fetch returned {}",
                resp.status()
            )));
        }
        let raw: RawBook = resp.json().await?;
        let divisor = 10f64.powi(self.decimals() as i32);
        let to_levels = |levels: &[RawLevel]| {
            levels
                .iter()
                .filter_map(|l| Some(Level::new(raw_f64(&l.price)?, raw_f64(&l.size)? / divisor)))
                .collect()
        };
        Ok(Orderbook::new(
            Platform::Limitless,
            outcome,
            Side::Yes,
            to_levels(&raw.asks),
            to_levels(&raw.bids),
        ))
    }
}

fn value_to_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl VenueAdapter for LimitlessAdapter {
    fn platform(&self) -> Platform {
        Platform::Limitless
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
        1.30
    }

    fn floor_amount(&self, amount: f64, direction: Direction) -> f64 {
        match direction {
            Direction::Buy => floor_dp(amount, 2),
            // venue only accepts 0.001-share multiples on sells
            Direction::Sell => floor_dp(amount, 3),
        }
    }

    async fn resolve_token(&self, key: &RoutingKey, side: Side) -> VenueResult<String> {
        let slug = self.market_slug(key)?;
        let market = self.market(slug).await?;
        let tokens = market.get("tokens");
        let token = match side {
            Side::Yes => value_to_string(tokens.and_then(|t| t.get("yes"))),
            Side::No => value_to_string(tokens.and_then(|t| t.get("no"))),
        };
        token.ok_or_else(|| {
            VenueError::UpstreamRejected(format!("market {slug} has no {side} token"))
        })
    }

    async fn fetch_book(
        &self,
        key: &RoutingKey,
        outcome: &str,
        side: Side,
    ) -> VenueResult<Orderbook> {
        let slug = self.market_slug(key)?;
        let yes = self.yes_book(slug, outcome).await?;
        Ok(match side {
            Side::Yes => yes,
            Side::No => yes.reflected(),
        })
    }

    async fn place_order(
        &self,
        token: &str,
        market: Option<&str>,
        amount: f64,
        price: f64,
        direction: Direction,
    ) -> VenueResult<PlacedOrder> {
        let slug = market
            .ok_or_else(|| VenueError::Other(anyhow!("limitless order requires market slug")))?;
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

        let owner_id = self.ensure_login().await?;
        let market_info = self.market(slug).await?;
        let exchange = market_info
            .get("venue")
            .and_then(|v| v.get("exchange"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Address>().ok())
            .unwrap_or(CTF_EXCHANGE);

        // FOK orders encode budget-only intent: taker amount 1 means
        // "whatever fills at this price or better".
        let maker_amount = match direction {
            Direction::Buy => evm::to_units(floor_dp(amount, 2), 6),
            Direction::Sell => {
                let raw = evm::to_units(amount, 6);
                raw - raw % U256::from(1000)
            }
        };
        let taker_amount = U256::from(1);
        let side_u8 = match direction {
            Direction::Buy => signing::SIDE_BUY,
            Direction::Sell => signing::SIDE_SELL,
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
            feeRateBps: U256::from(FEE_RATE_BPS),
            side: side_u8,
            signatureType: signing::SIGNATURE_EOA,
        };
        let domain = ExchangeDomain {
            name: "Limitless CTF Exchange",
            chain_id: self.chain.id,
            verifying_contract: exchange,
        };
        let signature = signing::sign_order(&self.signer, &domain, &order).await?;

        let payload = serde_json::json!({
            "order": {
                "salt": order.salt.to::<u64>(),
                "maker": self.signer.address().to_string(),
                "signer": self.signer.address().to_string(),
                "taker": Address::ZERO.to_string(),
                "tokenId": token,
                "makerAmount": maker_amount.to::<u128>(),
                "takerAmount": taker_amount.to::<u128>(),
                "expiration": "0",
                "nonce": 0,
                "feeRateBps": FEE_RATE_BPS,
                "side": side_u8,
                "signature": signature,
                "signatureType": 0,
            },
            "ownerId": owner_id,
            "orderType": "FOK",
            "marketSlug": slug,
        });

        debug!(%amount, %price, %slug, "placing limitless FOK order");
        let resp = self
            .http
            .post(format!("{API_BASE}/orders"))
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VenueError::UpstreamRejected(format!(
                "order failed: {} {}",
                status,
                resp.text().await.unwrap_or_default()
            )));
        }
        let body: serde_json::Value = resp.json().await?;
        let matched = body
            .get("makerMatches")
            .map(|m| !m.is_null() && m.as_array().map(|a| !a.is_empty()).unwrap_or(true))
            .unwrap_or(false);
        let order_data = body.get("order").unwrap_or(&body);
        let order_id = value_to_string(order_data.get("id"));
        info!(?order_id, matched, "limitless order placed");
        Ok(PlacedOrder {
            order_id,
            status: if matched { "MATCHED".into() } else { "NEW".into() },
        })
    }

    async fn order_status(&self, order_id: &str) -> VenueResult<OrderState> {
        self.ensure_login().await?;
        let resp = self
            .http
            .get(format!("{API_BASE}/orders/{order_id}"))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(VenueError::UpstreamUnavailable(format!(
                "order lookup returned {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(OrderState {
            order_id: order_id.to_string(),
            status: body
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN")
                .to_string(),
            filled_raw: U256::ZERO,
            remaining_raw: U256::ZERO,
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
            .gas(200_000)
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
        let allowance = usdc
            .allowance(self.operator_address(), CTF_EXCHANGE)
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        if allowance.is_zero() {
            let pending = usdc
                .approve(CTF_EXCHANGE, U256::MAX)
                .gas(100_000)
                .send()
                .await
                .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
            results.push(("usdc-exchange".into(), evm::confirm(pending, Duration::from_secs(60)).await?));
        } else {
            results.push(("usdc-exchange".into(), "already approved".into()));
        }

        let ctf = IConditionalTokens::new(CTF_ADDRESS, &self.provider);
        let approved = ctf
            .isApprovedForAll(self.operator_address(), CTF_EXCHANGE)
            .call()
            .await
            .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
        if !approved {
            let pending = ctf
                .setApprovalForAll(CTF_EXCHANGE, true)
                .gas(100_000)
                .send()
                .await
                .map_err(|e| VenueError::UpstreamUnavailable(e.to_string()))?;
            results.push(("ctf-exchange".into(), evm::confirm(pending, Duration::from_secs(60)).await?));
        } else {
            results.push(("ctf-exchange".into(), "already approved".into()));
        }
        Ok(results)
    }
}
