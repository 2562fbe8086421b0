use alloy::primitives::Address;
use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};

use crate::model::Platform;
use crate::model::book::Direction;
use crate::model::chain::Chain;
use crate::model::order::{
    MAX_BRIDGE_RETRIES, MAX_SETTLE_POLLS, MAX_TRADE_RETRIES, Order, OrderStatus, SettleResult,
    TradeResult, TransferResult,
};
use crate::relay::{BridgeStatus, OrderMeta};
use crate::venues::evm;

use super::progress::EngineContext;

pub struct CreateSellParams {
    pub order_id: String,
    pub amount: Option<f64>,
    pub to_chain: u64,
    pub platform: Option<Platform>,
}

/// Synchronous sell creation: resolve the referenced buy, pick the single
/// venue to unwind, and pull the user's shares on that venue's chain.
/// Custody venues skip the pull — the shares never left the smart wallet.
pub async fn create_sell(ctx: &EngineContext, params: CreateSellParams) -> Result<Order> {
    let buy = ctx
        .store
        .get(&params.order_id)?
        .ok_or_else(|| anyhow!("order not found"))?;
    if buy.direction != Direction::Buy || buy.status != OrderStatus::Filled {
        bail!("referenced order is not a filled buy");
    }
    if Chain::from_id(params.to_chain).is_none() {
        bail!("unsupported destination chain");
    }

    let platform = match params.platform {
        Some(platform) => platform,
        None => {
            let mut venues = buy.platforms.iter().filter(|(_, p)| p.qty > 0.0);
            let first = venues
                .next()
                .ok_or_else(|| anyhow!("buy order has no filled venues"))?;
            if venues.next().is_some() {
                bail!("buy filled on multiple venues; specify 'platform'");
            }
            *first.0
        }
    };
    let plan = buy
        .platforms
        .get(&platform)
        .ok_or_else(|| anyhow!("buy order has no fill on {platform}"))?
        .clone();
    let token = plan
        .token
        .clone()
        .ok_or_else(|| anyhow!("buy order is missing the {platform} token id"))?;

    let shares = params.amount.unwrap_or(plan.qty);
    if shares <= 0.0 {
        bail!("amount must be > 0");
    }

    let adapter = ctx.registry.get(platform)?;
    let user: Address = buy
        .wallet
        .parse()
        .map_err(|_| anyhow!("buy order has an invalid wallet address"))?;

    let mut order = Order::new_sell(&buy, platform, shares, params.to_chain);

    if adapter.keeps_shares_in_custody() {
        // Shares are already on the custody wallet; nothing to pull.
        order.status = OrderStatus::SharesPulled;
    } else {
        let meta = OrderMeta {
            order_id: order.id.clone(),
            event_id: order.event_id.clone(),
            outcome: order.outcome.clone(),
            side: order.side.to_string(),
        };
        let amount_raw = evm::to_units(shares, adapter.decimals());
        let token_id = evm::parse_token_id(&token)?;
        match ctx
            .relay
            .pull_shares(
                adapter.chain(),
                adapter.shares_contract(),
                user,
                token_id,
                amount_raw,
                platform.as_str(),
                &meta,
            )
            .await
        {
            Ok(tx) => {
                order.pull_tx = Some(tx);
                order.status = OrderStatus::SharesPulled;
            }
            Err(err) => {
                order.fail(OrderStatus::Failed, format!("share pull failed: {err}"));
            }
        }
    }

    order.touch();
    ctx.store.append(&order)?;
    info!(id = %order.id, buy = %buy.id, %platform, "sell order created");
    Ok(order)
}

/// shares_pulled → sell_matched: snapshot the stablecoin balance, then place
/// a FOK sell at the best bid. The snapshot is what settlement polling
/// compares against.
pub async fn place_sell(ctx: &EngineContext, order: &mut Order) -> bool {
    let Some(platform) = order.sell_platform else {
        order.fail(OrderStatus::TradeFailed, "sell order has no venue");
        return true;
    };
    let retry_failed = |order: &mut Order, err: String| {
        order.retries.trade += 1;
        order.error = Some(err.clone());
        if order.retries.trade >= MAX_TRADE_RETRIES {
            order.fail(OrderStatus::TradeFailed, err);
        }
        true
    };

    let adapter = match ctx.registry.get(platform) {
        Ok(adapter) => adapter,
        Err(err) => return retry_failed(order, err.to_string()),
    };
    let Some(key) = ctx
        .catalog
        .routing_key(&order.event_id, &order.outcome, platform)
    else {
        order.fail(OrderStatus::TradeFailed, "routing key missing");
        return true;
    };
    let Some(plan) = order.platforms.get(&platform).cloned() else {
        order.fail(OrderStatus::TradeFailed, "platform plan missing");
        return true;
    };
    let Some(token) = plan.token.clone() else {
        order.fail(OrderStatus::TradeFailed, "token id missing");
        return true;
    };

    let snapshot = match adapter.balance_stablecoin(None).await {
        Ok(raw) => evm::from_units(raw, adapter.decimals()),
        Err(err) => return retry_failed(order, format!("balance snapshot failed: {err}")),
    };

    let best = match adapter
        .best_offer(key, &order.outcome, order.side, Direction::Sell)
        .await
    {
        Ok(best) => best,
        Err(err) => return retry_failed(order, format!("best offer failed: {err}")),
    };
    if best.price <= 0.0 {
        return retry_failed(order, "no bids available".into());
    }

    let shares = adapter.floor_amount(order.shares_amount.unwrap_or(0.0), Direction::Sell);
    if shares <= 0.0 {
        order.fail(OrderStatus::TradeFailed, "sell amount rounds to zero");
        return true;
    }

    order.balance_snapshot = Some(snapshot);
    match adapter
        .place_order(&token, plan.market.as_deref(), shares, best.price, Direction::Sell)
        .await
    {
        Ok(placed) => {
            info!(id = %order.id, %platform, %shares, price = %best.price, "sell placed");
            order.trade_results.insert(
                platform,
                TradeResult {
                    order_id: placed.order_id,
                    status: Some(placed.status),
                    amount: shares,
                    price: best.price,
                    error: None,
                },
            );
            order.status = OrderStatus::SellMatched;
            order.error = None;
            true
        }
        Err(err) => retry_failed(order, err.to_string()),
    }
}

/// sell_matched → sell_settled: settlement is detected by the stablecoin
/// balance rising strictly above the pre-sell snapshot.
pub async fn poll_settlement(ctx: &EngineContext, order: &mut Order) -> bool {
    let Some(platform) = order.sell_platform else {
        order.fail(OrderStatus::TradeFailed, "sell order has no venue");
        return true;
    };
    let adapter = match ctx.registry.get(platform) {
        Ok(adapter) => adapter,
        Err(err) => {
            order.fail(OrderStatus::TradeFailed, err.to_string());
            return true;
        }
    };
    let snapshot = order.balance_snapshot.unwrap_or(0.0);

    let balance = match adapter.balance_stablecoin(None).await {
        Ok(raw) => evm::from_units(raw, adapter.decimals()),
        Err(err) => {
            warn!(id = %order.id, "settlement balance read failed: {err}");
            order.retries.settle += 1;
            if order.retries.settle >= MAX_SETTLE_POLLS {
                order.fail(OrderStatus::TradeFailed, "settlement polling exhausted");
            }
            return true;
        }
    };

    if balance > snapshot {
        let proceeds = balance - snapshot;
        // Best-effort: attach the incoming transfer hash when it can be found.
        let tx = adapter
            .find_incoming_stablecoin(
                evm::to_units(proceeds * 0.95, adapter.decimals()),
                50,
            )
            .await
            .ok()
            .flatten()
            .map(|t| t.tx_hash);
        order
            .settle_results
            .insert(platform, SettleResult { amount: proceeds, tx });
        order.proceeds = Some(proceeds);
        order.status = OrderStatus::SellSettled;
        info!(id = %order.id, %proceeds, "sell settled");
        return true;
    }

    order.retries.settle += 1;
    if order.retries.settle >= MAX_SETTLE_POLLS {
        order.fail(OrderStatus::TradeFailed, "settlement polling exhausted");
    }
    true
}

/// sell_settled → bridging_back | completed: same-chain destinations get a
/// direct transfer; cross-chain proceeds under the bridge floor are refused.
pub async fn return_proceeds(ctx: &EngineContext, order: &mut Order) -> bool {
    let Some(platform) = order.sell_platform else {
        order.fail(OrderStatus::BridgeFailed, "sell order has no venue");
        return true;
    };
    let retry_failed = |order: &mut Order, err: String| {
        order.retries.bridge += 1;
        order.error = Some(err.clone());
        if order.retries.bridge >= MAX_BRIDGE_RETRIES {
            order.fail(OrderStatus::BridgeFailed, err);
        }
        true
    };

    let adapter = match ctx.registry.get(platform) {
        Ok(adapter) => adapter,
        Err(err) => return retry_failed(order, err.to_string()),
    };
    let Ok(user) = order.wallet.parse::<Address>() else {
        order.fail(OrderStatus::BridgeFailed, "invalid wallet address");
        return true;
    };
    let proceeds = order.proceeds.unwrap_or(0.0);
    if proceeds <= 0.0 {
        order.fail(OrderStatus::BridgeFailed, "no proceeds to return");
        return true;
    }
    let venue_chain = adapter.chain().clone();
    let to_chain = order.to_chain.unwrap_or(venue_chain.id);
    let proceeds_raw = evm::to_units(proceeds, adapter.decimals());

    if to_chain == venue_chain.id {
        // Same-chain fast path: hand proceeds straight to the user, bridge
        // floor does not apply.
        match adapter.transfer_stablecoin_to(user, proceeds_raw).await {
            Ok(tx) => {
                order
                    .transfer_results
                    .insert(platform, TransferResult { tx: Some(tx.clone()), kept: false, error: None });
                order.bridge_back_tx = Some(tx);
                order.status = OrderStatus::Completed;
                order.error = None;
                info!(id = %order.id, "proceeds returned same-chain");
                true
            }
            Err(err) => retry_failed(order, format!("proceeds transfer failed: {err}")),
        }
    } else {
        if proceeds < 1.0 {
            order.fail(
                OrderStatus::BridgeFailed,
                format!("BRIDGE_AMOUNT_TOO_SMALL: {proceeds:.2} below the bridge floor"),
            );
            return true;
        }
        let target = match Chain::from_id(to_chain) {
            Some(chain) => chain,
            None => {
                order.fail(OrderStatus::BridgeFailed, "unsupported destination chain");
                return true;
            }
        };

        // Stage the proceeds on the relay wallet once, then bridge to the user.
        if !order
            .transfer_results
            .get(&platform)
            .is_some_and(|r| r.settled())
        {
            match adapter
                .transfer_stablecoin_to(ctx.relay.relayer_address(), proceeds_raw)
                .await
            {
                Ok(tx) => {
                    order.transfer_results.insert(
                        platform,
                        TransferResult { tx: Some(tx), kept: false, error: None },
                    );
                }
                Err(err) => {
                    return retry_failed(order, format!("staging proceeds failed: {err}"));
                }
            }
        }

        match ctx.relay.bridge(&venue_chain, &target, proceeds, user).await {
            Ok(tx) => {
                order.bridge_back_tx = Some(tx);
                order.status = OrderStatus::BridgingBack;
                order.error = None;
                info!(id = %order.id, to = %target, "proceeds bridging back");
                true
            }
            Err(err) => retry_failed(order, format!("bridge back failed: {err}")),
        }
    }
}

/// bridging_back → completed: poll the bridge status until terminal.
pub async fn poll_bridge_back(ctx: &EngineContext, order: &mut Order) -> bool {
    let Some(tx) = order.bridge_back_tx.clone() else {
        order.fail(OrderStatus::BridgeFailed, "bridge-back transaction missing");
        return true;
    };
    match ctx.relay.bridge_status(&tx).await {
        Ok(BridgeStatus::Done { receiving_tx, .. }) => {
            order.receiving_tx = receiving_tx;
            order.status = OrderStatus::Completed;
            info!(id = %order.id, "sell completed");
            true
        }
        Ok(BridgeStatus::Failed(reason)) => {
            order.fail(OrderStatus::BridgeFailed, format!("bridge back failed: {reason}"));
            true
        }
        Ok(BridgeStatus::Pending) => false,
        Err(err) => {
            warn!(id = %order.id, "bridge-back status poll failed: {err}");
            order.retries.bridge += 1;
            if order.retries.bridge >= MAX_BRIDGE_RETRIES {
                order.fail(
                    OrderStatus::BridgeFailed,
                    format!("bridge status polling exhausted: {err}"),
                );
            }
            true
        }
    }
}
