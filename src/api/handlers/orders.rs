use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::api::types::{CreateOrderRequest, Position, PositionsQuery, SellRequest};
use crate::model::book::{Direction, Side};
use crate::model::order::{Order, OrderStatus};
use crate::model::round_dp;
use crate::run::{buy, sell};
use crate::venues::evm;

/// POST /api/order — synchronous pull + bridge fan-out, then the progress
/// loop takes over. Returns the persisted record, failed or not.
pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<Order>, ApiError> {
    let side = Side::from_str(&body.side).map_err(ApiError::BadRequest)?;
    let order = buy::create_buy(
        &state.ctx,
        buy::CreateBuyParams {
            wallet: body.wallet,
            event_id: body.event_id,
            outcome: body.team,
            side,
            budget: body.budget,
            from_chain: body.from_chain,
            route: body.route,
            approve_tx: body.approve_tx_hash,
        },
    )
    .await
    .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    Ok(Json(order))
}

/// POST /api/sell — references a filled buy; pulls shares synchronously.
pub async fn create_sell(
    State(state): State<AppState>,
    Json(body): Json<SellRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = sell::create_sell(
        &state.ctx,
        sell::CreateSellParams {
            order_id: body.order_id,
            amount: body.amount,
            to_chain: body.to_chain,
            platform: body.platform,
        },
    )
    .await
    .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    Ok(Json(order))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    state
        .ctx
        .store
        .get(&order_id)
        .map_err(ApiError::from)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("not found".into()))
}

/// POST /api/kill-order/{id} — terminal, absorbing; effective at the next
/// tick, in-flight calls are not interrupted.
pub async fn kill_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    state
        .ctx
        .store
        .update(&order_id, |order| order.kill())
        .map_err(ApiError::from)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("not found".into()))
}

/// GET /api/positions — filled buys for a wallet, with live on-chain share
/// balances read from whichever address actually holds them.
pub async fn positions(
    State(state): State<AppState>,
    Query(query): Query<PositionsQuery>,
) -> Result<Json<Vec<Position>>, ApiError> {
    let wallet = query.wallet.to_lowercase();
    let orders = state.ctx.store.snapshot().map_err(ApiError::from)?;

    let mut positions = Vec::new();
    for order in orders {
        if order.direction != Direction::Buy || order.status != OrderStatus::Filled {
            continue;
        }
        if order.wallet.to_lowercase() != wallet {
            continue;
        }
        if let Some(event_id) = &query.event_id
            && &order.event_id != event_id
        {
            continue;
        }
        if let Some(team) = &query.team
            && &order.outcome != team
        {
            continue;
        }
        if let Some(side) = &query.side
            && order.side.to_string() != side.to_lowercase()
        {
            continue;
        }

        for (&platform, plan) in &order.platforms {
            if plan.qty <= 0.0 {
                continue;
            }
            let kept = order
                .transfer_results
                .get(&platform)
                .map(|r| r.kept)
                .unwrap_or(false);

            let shares_balance = match (state.ctx.registry.get(platform), &plan.token) {
                (Ok(adapter), Some(token)) => {
                    let holder = if kept {
                        adapter.operator_address()
                    } else {
                        match order.wallet.parse() {
                            Ok(addr) => addr,
                            Err(_) => continue,
                        }
                    };
                    adapter
                        .balance_shares(holder, token)
                        .await
                        .ok()
                        .map(|raw| round_dp(evm::from_units(raw, adapter.decimals()), 4))
                }
                _ => None,
            };

            let avg_price = if plan.qty > 0.0 { plan.spent / plan.qty } else { 0.0 };
            positions.push(Position {
                order_id: order.id.clone(),
                event_id: order.event_id.clone(),
                team: order.outcome.clone(),
                side: order.side.to_string(),
                platform,
                token: plan.token.clone(),
                qty: plan.qty,
                spent: plan.spent,
                avg_price: round_dp(avg_price, 6),
                shares_balance,
                kept,
            });
        }
    }
    Ok(Json(positions))
}
