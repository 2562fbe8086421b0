use std::collections::BTreeMap;

use alloy::primitives::Address;
use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};

use crate::model::book::{Direction, Side};
use crate::model::chain::Chain;
use crate::model::order::{
    BridgeLeg, BridgeLegStatus, MAX_BRIDGE_RETRIES, MAX_SETTLE_POLLS, MAX_TRADE_RETRIES, Order,
    OrderStatus, PlatformPlan, SettleResult, TradeResult, TransferResult,
};
use crate::model::route::Route;
use crate::model::{Platform, floor_dp};
use crate::relay::{BridgeStatus, OrderMeta};
use crate::venues::{VenueError, evm};

use super::progress::EngineContext;

pub struct CreateBuyParams {
    pub wallet: String,
    pub event_id: String,
    pub outcome: String,
    pub side: Side,
    pub budget: f64,
    pub from_chain: u64,
    pub route: Route,
    pub approve_tx: Option<String>,
}

/// Synchronous buy creation: validate, pull the user's stablecoin, submit
/// one bridge per distinct target chain. The returned order is already
/// persisted; on-chain failures come back as a `failed` record rather than
/// an error.
pub async fn create_buy(ctx: &EngineContext, params: CreateBuyParams) -> Result<Order> {
    if params.budget <= 0.0 {
        bail!("budget must be > 0");
    }
    let user: Address = params
        .wallet
        .parse()
        .map_err(|_| anyhow!("invalid wallet address"))?;
    let from_chain =
        Chain::from_id(params.from_chain).ok_or_else(|| anyhow!("unsupported source chain"))?;
    if ctx.catalog.get(&params.event_id).is_none() {
        bail!("unknown event");
    }

    // Freeze the per-venue plan. The catalog, not the client's route, is the
    // authority for market and token identifiers.
    let mut platforms: BTreeMap<Platform, PlatformPlan> = BTreeMap::new();
    for (&platform, alloc) in params.route.per_platform.iter().filter(|(_, a)| a.spent > 0.0) {
        let adapter = ctx
            .registry
            .get(platform)
            .map_err(|_| anyhow!("venue {platform} is not available"))?;
        let key = ctx
            .catalog
            .routing_key(&params.event_id, &params.outcome, platform)
            .ok_or_else(|| anyhow!("{platform} does not list this outcome"))?;
        let token = adapter
            .resolve_token(key, params.side)
            .await
            .map_err(|e| anyhow!("resolving {platform} token: {e}"))?;
        platforms.insert(
            platform,
            PlatformPlan {
                market: key.market.clone(),
                token: Some(token),
                spent: alloc.spent,
                qty: alloc.qty,
            },
        );
    }
    if platforms.is_empty() {
        bail!("route has no platforms with spent > 0");
    }

    let mut order = Order::new_buy(
        params.wallet.clone(),
        params.event_id.clone(),
        params.outcome.clone(),
        params.side,
        params.budget,
        params.from_chain,
        platforms,
    );
    order.approve_tx = params.approve_tx;

    let meta = OrderMeta {
        order_id: order.id.clone(),
        event_id: order.event_id.clone(),
        outcome: order.outcome.clone(),
        side: order.side.to_string(),
    };

    // Balance and allowance are checked before submitting anything so a
    // shortfall fails synchronously with the gap in the error field.
    let amount_raw = evm::to_units(params.budget, from_chain.stablecoin_decimals);
    match ctx.relay.user_stablecoin_state(&from_chain, user).await {
        Ok((balance, allowance)) => {
            if balance < amount_raw {
                order.fail(
                    OrderStatus::Failed,
                    format!(
                        "insufficient balance: have {:.4}, need {:.4}",
                        evm::from_units(balance, from_chain.stablecoin_decimals),
                        params.budget
                    ),
                );
                ctx.store.append(&order)?;
                return Ok(order);
            }
            if allowance < amount_raw {
                order.fail(
                    OrderStatus::Failed,
                    format!(
                        "insufficient allowance to router: have {:.4}, need {:.4}",
                        evm::from_units(allowance, from_chain.stablecoin_decimals),
                        params.budget
                    ),
                );
                ctx.store.append(&order)?;
                return Ok(order);
            }
        }
        Err(err) => {
            order.fail(OrderStatus::Failed, format!("balance check failed: {err}"));
            ctx.store.append(&order)?;
            return Ok(order);
        }
    }

    match ctx
        .relay
        .pull_stablecoin(&from_chain, user, amount_raw, "pooled", &meta)
        .await
    {
        Ok(tx) => order.pull_tx = Some(tx),
        Err(err) => {
            order.fail(OrderStatus::Failed, format!("pull failed: {err}"));
            ctx.store.append(&order)?;
            return Ok(order);
        }
    }

    // One bridge per distinct target chain; same-chain venues get their
    // funds by direct transfer and a leg that is born done.
    let mut by_chain: BTreeMap<u64, (f64, Address)> = BTreeMap::new();
    for (&platform, plan) in &order.platforms {
        let adapter = ctx.registry.get(platform)?;
        let entry = by_chain
            .entry(adapter.chain().id)
            .or_insert((0.0, adapter.operator_address()));
        entry.0 += plan.spent;
    }

    for (&chain_id, &(amount, custody)) in &by_chain {
        if chain_id == from_chain.id {
            let receiving_tx = if custody != ctx.relay.relayer_address() {
                let raw = evm::to_units(amount, from_chain.stablecoin_decimals);
                match ctx.relay.transfer_stablecoin(&from_chain, custody, raw).await {
                    Ok(tx) => Some(tx),
                    Err(err) => {
                        order.fail(
                            OrderStatus::Failed,
                            format!("same-chain transfer failed: {err}"),
                        );
                        ctx.store.append(&order)?;
                        return Ok(order);
                    }
                }
            } else {
                None
            };
            order.bridges.insert(
                chain_id,
                BridgeLeg {
                    amount,
                    bridge_tx: None,
                    status: BridgeLegStatus::Done,
                    receiving_tx,
                },
            );
            continue;
        }

        let target = Chain::from_id(chain_id)
            .ok_or_else(|| anyhow!("unsupported target chain {chain_id}"))?;
        match ctx.relay.bridge(&from_chain, &target, amount, custody).await {
            Ok(tx) => {
                order.bridges.insert(
                    chain_id,
                    BridgeLeg {
                        amount,
                        bridge_tx: Some(tx),
                        status: BridgeLegStatus::Pending,
                        receiving_tx: None,
                    },
                );
            }
            Err(err) => {
                order.fail(OrderStatus::Failed, format!("bridge to {chain_id} failed: {err}"));
                ctx.store.append(&order)?;
                return Ok(order);
            }
        }
    }

    let all_done = order
        .bridges
        .values()
        .all(|leg| leg.status == BridgeLegStatus::Done);
    order.status = if all_done { OrderStatus::Bridged } else { OrderStatus::Sent };
    order.touch();
    ctx.store.append(&order)?;
    info!(id = %order.id, status = ?order.status, "buy order created");
    Ok(order)
}

/// sent → bridged: poll each outstanding bridge leg; any terminal failure
/// fails the whole order.
pub async fn poll_bridges(ctx: &EngineContext, order: &mut Order) -> bool {
    let outstanding: Vec<(u64, String)> = order
        .bridges
        .iter()
        .filter(|(_, leg)| leg.status == BridgeLegStatus::Pending)
        .filter_map(|(&chain, leg)| leg.bridge_tx.clone().map(|tx| (chain, tx)))
        .collect();

    let mut changed = false;
    for (chain_id, tx) in outstanding {
        match ctx.relay.bridge_status(&tx).await {
            Ok(BridgeStatus::Done { receiving_tx, .. }) => {
                if let Some(leg) = order.bridges.get_mut(&chain_id) {
                    leg.status = BridgeLegStatus::Done;
                    leg.receiving_tx = receiving_tx.clone();
                }
                order.receiving_tx = receiving_tx.or(order.receiving_tx.take());
                changed = true;
            }
            Ok(BridgeStatus::Failed(reason)) => {
                if let Some(leg) = order.bridges.get_mut(&chain_id) {
                    leg.status = BridgeLegStatus::Failed;
                }
                order.fail(
                    OrderStatus::Failed,
                    format!("bridge to {chain_id} failed: {reason}"),
                );
                return true;
            }
            Ok(BridgeStatus::Pending) => {}
            Err(err) => {
                warn!(id = %order.id, %chain_id, "bridge status poll failed: {err}");
                order.retries.bridge += 1;
                changed = true;
                if order.retries.bridge >= MAX_BRIDGE_RETRIES {
                    order.fail(
                        OrderStatus::Failed,
                        format!("bridge status polling exhausted: {err}"),
                    );
                    return true;
                }
            }
        }
    }

    if order
        .bridges
        .values()
        .all(|leg| leg.status == BridgeLegStatus::Done)
    {
        order.status = OrderStatus::Bridged;
        changed = true;
    }
    changed
}

/// bridged → matched: place one FOK buy per venue at its best ask, sized by
/// what actually settled on that chain (bridges take fees).
pub async fn place_trades(ctx: &EngineContext, order: &mut Order) -> bool {
    let mut last_error: Option<String> = None;

    for (platform, plan) in order.platforms.clone() {
        if plan.spent <= 0.0 {
            continue;
        }
        if order
            .trade_results
            .get(&platform)
            .is_some_and(|r| r.succeeded())
        {
            continue;
        }
        let result = place_one_trade(ctx, order, platform, &plan).await;
        if let Some(err) = &result.error {
            last_error = Some(format!("{platform}: {err}"));
        }
        order.trade_results.insert(platform, result);
    }

    let all_matched = order
        .platforms
        .iter()
        .filter(|(_, plan)| plan.spent > 0.0)
        .all(|(p, _)| order.trade_results.get(p).is_some_and(|r| r.succeeded()));

    if all_matched {
        order.status = OrderStatus::Matched;
        order.error = None;
        return true;
    }

    order.retries.trade += 1;
    if let Some(err) = last_error {
        order.error = Some(err);
    }
    if order.retries.trade >= MAX_TRADE_RETRIES {
        let err = order.error.clone().unwrap_or_else(|| "trading failed".into());
        order.fail(OrderStatus::TradeFailed, err);
    }
    true
}

async fn place_one_trade(
    ctx: &EngineContext,
    order: &Order,
    platform: Platform,
    plan: &PlatformPlan,
) -> TradeResult {
    let failed = |err: String| TradeResult {
        order_id: None,
        status: None,
        amount: 0.0,
        price: 0.0,
        error: Some(err),
    };

    let adapter = match ctx.registry.get(platform) {
        Ok(adapter) => adapter,
        Err(err) => return failed(err.to_string()),
    };
    let Some(key) = ctx
        .catalog
        .routing_key(&order.event_id, &order.outcome, platform)
    else {
        return failed("routing key missing".into());
    };
    let Some(token) = plan.token.clone() else {
        return failed("token id missing from plan".into());
    };

    // Bridges take fees: trade whatever actually settled, capped at the plan.
    let balance = match adapter.balance_stablecoin(None).await {
        Ok(raw) => evm::from_units(raw, adapter.decimals()),
        Err(err) => return failed(format!("balance read failed: {err}")),
    };
    let amount = adapter.floor_amount(plan.spent.min(balance), Direction::Buy);
    if amount <= 0.0 {
        return failed("no settled funds to trade".into());
    }

    let best = match adapter
        .best_offer(key, &order.outcome, order.side, Direction::Buy)
        .await
    {
        Ok(best) => best,
        Err(err) => return failed(format!("best offer failed: {err}")),
    };
    if best.price <= 0.0 {
        return failed(VenueError::InsufficientLiquidity.to_string());
    }

    match adapter
        .place_order(&token, plan.market.as_deref(), amount, best.price, Direction::Buy)
        .await
    {
        Ok(placed) => {
            info!(id = %order.id, %platform, %amount, price = %best.price, "buy placed");
            TradeResult {
                order_id: placed.order_id,
                status: Some(placed.status),
                amount,
                price: best.price,
                error: None,
            }
        }
        Err(err) => failed(err.to_string()),
    }
}

/// matched → filled: wait for shares to land on the custody wallet, then
/// forward them to the user (or record "kept" for custody venues).
pub async fn settle_and_forward(ctx: &EngineContext, order: &mut Order) -> bool {
    let Ok(user) = order.wallet.parse::<Address>() else {
        order.fail(OrderStatus::TradeFailed, "invalid wallet address");
        return true;
    };

    let mut all_settled = true;
    for (platform, plan) in order.platforms.clone() {
        if plan.spent <= 0.0 {
            continue;
        }
        if order
            .transfer_results
            .get(&platform)
            .is_some_and(|r| r.settled())
        {
            continue;
        }
        let adapter = match ctx.registry.get(platform) {
            Ok(adapter) => adapter,
            Err(err) => {
                order.transfer_results.insert(
                    platform,
                    TransferResult { tx: None, kept: false, error: Some(err.to_string()) },
                );
                all_settled = false;
                continue;
            }
        };
        let Some(token) = plan.token.clone() else {
            order.fail(OrderStatus::TradeFailed, format!("{platform}: token id missing"));
            return true;
        };

        let balance = match adapter.balance_shares(adapter.operator_address(), &token).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(id = %order.id, %platform, "share balance read failed: {err}");
                all_settled = false;
                continue;
            }
        };
        if balance.is_zero() {
            all_settled = false;
            continue;
        }

        order.settle_results.insert(
            platform,
            SettleResult {
                amount: floor_dp(evm::from_units(balance, adapter.decimals()), 4),
                tx: None,
            },
        );

        if adapter.keeps_shares_in_custody() {
            order
                .transfer_results
                .insert(platform, TransferResult { tx: None, kept: true, error: None });
            continue;
        }
        match adapter.transfer_shares_to(user, &token, balance).await {
            Ok(tx) => {
                info!(id = %order.id, %platform, "shares forwarded to user");
                order
                    .transfer_results
                    .insert(platform, TransferResult { tx: Some(tx), kept: false, error: None });
            }
            Err(err) => {
                order.transfer_results.insert(
                    platform,
                    TransferResult { tx: None, kept: false, error: Some(err.to_string()) },
                );
                all_settled = false;
            }
        }
    }

    if all_settled {
        order.status = OrderStatus::Filled;
        order.error = None;
        return true;
    }

    order.retries.settle += 1;
    if order.retries.settle >= MAX_SETTLE_POLLS {
        order.fail(OrderStatus::TradeFailed, "settlement polling exhausted");
    }
    true
}

