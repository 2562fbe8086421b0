use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::model::event::EventCatalog;
use crate::model::order::{Order, OrderStatus};
use crate::relay::Relay;
use crate::venues::AdapterRegistry;

use super::store::OrderStore;
use super::{buy, sell};

pub const TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Shared core handed to both the request plane and the progress loop.
pub struct EngineContext {
    pub registry: AdapterRegistry,
    pub relay: Arc<dyn Relay>,
    pub store: OrderStore,
    pub catalog: EventCatalog,
}

/// Background plane: wake every 10 seconds, advance each eligible order by
/// at most one transition, commit the orders this tick touched.
pub async fn run_progress_loop(ctx: Arc<EngineContext>) {
    info!("order progress loop started");
    loop {
        tokio::time::sleep(TICK_INTERVAL).await;
        if let Err(err) = tick(&ctx).await {
            error!("progress tick failed: {err:#}");
        }
    }
}

/// One tick. Orders advance concurrently but each order is serialized
/// against itself: it appears in at most one task.
pub async fn tick(ctx: &Arc<EngineContext>) -> anyhow::Result<()> {
    let orders = ctx.store.snapshot()?;
    let mut tasks = JoinSet::new();
    for order in orders {
        if !advancable(order.status) {
            continue;
        }
        let ctx = ctx.clone();
        tasks.spawn(async move { advance(&ctx, order).await });
    }

    let mut touched = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Some(order)) => touched.push(order),
            Ok(None) => {}
            Err(err) => warn!("order transition task failed: {err}"),
        }
    }
    if !touched.is_empty() {
        ctx.store.commit_touched(&touched)?;
    }
    Ok(())
}

/// Killed and terminal orders are skipped outright; kill is absorbing.
fn advancable(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Sent
            | OrderStatus::Bridged
            | OrderStatus::Matched
            | OrderStatus::SharesPulled
            | OrderStatus::SellMatched
            | OrderStatus::SellSettled
            | OrderStatus::BridgingBack
    )
}

async fn advance(ctx: &EngineContext, mut order: Order) -> Option<Order> {
    let before = order.status;
    let changed = match order.status {
        OrderStatus::Sent => buy::poll_bridges(ctx, &mut order).await,
        OrderStatus::Bridged => buy::place_trades(ctx, &mut order).await,
        OrderStatus::Matched => buy::settle_and_forward(ctx, &mut order).await,
        OrderStatus::SharesPulled => sell::place_sell(ctx, &mut order).await,
        OrderStatus::SellMatched => sell::poll_settlement(ctx, &mut order).await,
        OrderStatus::SellSettled => sell::return_proceeds(ctx, &mut order).await,
        OrderStatus::BridgingBack => sell::poll_bridge_back(ctx, &mut order).await,
        _ => false,
    };
    if !changed {
        return None;
    }
    order.touch();
    if order.status != before {
        debug!(id = %order.id, from = ?before, to = ?order.status, "order transitioned");
    }
    Some(order)
}
