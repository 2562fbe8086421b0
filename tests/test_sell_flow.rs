mod mock_core;

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::Address;

use premarket_router::model::Platform;
use premarket_router::model::book::Side;
use premarket_router::model::chain::Chain;
use premarket_router::model::order::{Order, OrderStatus, PlatformPlan};
use premarket_router::relay::BridgeStatus;
use premarket_router::run::progress::{self, EngineContext};
use premarket_router::run::sell::{self, CreateSellParams};

use mock_core::{MockRelay, MockVenue, USER, context};

/// Seed the store with a filled buy on one venue.
fn seed_filled_buy(ctx: &EngineContext, platform: Platform, spent: f64, qty: f64) -> Order {
    let mut platforms = BTreeMap::new();
    platforms.insert(
        platform,
        PlatformPlan {
            market: Some("ev-home".into()),
            token: Some("111".into()),
            spent,
            qty,
        },
    );
    let mut order = Order::new_buy(
        USER.into(),
        "ev".into(),
        "home".into(),
        Side::Yes,
        spent,
        8453,
        platforms,
    );
    order.status = OrderStatus::Filled;
    ctx.store.append(&order).unwrap();
    order
}

fn sell_params(buy_id: &str, to_chain: u64) -> CreateSellParams {
    CreateSellParams {
        order_id: buy_id.into(),
        amount: None,
        to_chain,
        platform: None,
    }
}

#[tokio::test]
async fn same_chain_sell_with_small_proceeds_skips_the_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let limitless = Arc::new(MockVenue::new(
        Platform::Limitless,
        Chain::base(),
        "0x3333333333333333333333333333333333333333",
    ));
    limitless.set_book(&[(0.55, 100.0)], &[(0.40, 100.0)]);
    let relay = Arc::new(MockRelay::funded());
    let ctx = context(vec![limitless.clone()], relay.clone(), &dir);

    let buy = seed_filled_buy(&ctx, Platform::Limitless, 0.5, 1.0);
    let order = sell::create_sell(&ctx, sell_params(&buy.id, 8453)).await.unwrap();

    assert_eq!(order.status, OrderStatus::SharesPulled);
    assert_eq!(order.pull_tx.as_deref(), Some("0xpull-1155"));
    assert_eq!(relay.share_pulls.lock().unwrap().as_slice(), &[1.0]);

    // tick 1: FOK sell at the best bid
    progress::tick(&ctx).await.unwrap();
    let order = ctx.store.get(&order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::SellMatched);
    assert!(order.balance_snapshot.is_some());

    // tick 2: balance rose above the snapshot -> settled
    progress::tick(&ctx).await.unwrap();
    let order = ctx.store.get(&order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::SellSettled);
    let proceeds = order.proceeds.unwrap();
    assert!((proceeds - 0.40).abs() < 1e-6);

    // tick 3: proceeds under a dollar, but the user chose the venue's own
    // chain, so a direct transfer completes the order with no bridge call
    progress::tick(&ctx).await.unwrap();
    let order = ctx.store.get(&order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert!(relay.bridges.lock().unwrap().is_empty());
    let transfers = limitless.stablecoin_transfers.lock().unwrap().clone();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].0, USER.parse::<Address>().unwrap());
}

#[tokio::test]
async fn cross_chain_sell_bridges_proceeds_back() {
    let dir = tempfile::tempdir().unwrap();
    let limitless = Arc::new(MockVenue::new(
        Platform::Limitless,
        Chain::base(),
        "0x3333333333333333333333333333333333333333",
    ));
    limitless.set_book(&[(0.55, 100.0)], &[(0.48, 100.0)]);
    let relay = Arc::new(MockRelay::funded());
    let ctx = context(vec![limitless.clone()], relay.clone(), &dir);

    let buy = seed_filled_buy(&ctx, Platform::Limitless, 5.0, 10.0);
    let order = sell::create_sell(&ctx, sell_params(&buy.id, 137)).await.unwrap();

    progress::tick(&ctx).await.unwrap(); // sell placed
    progress::tick(&ctx).await.unwrap(); // settled
    let order = ctx.store.get(&order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::SellSettled);
    assert!((order.proceeds.unwrap() - 4.8).abs() < 1e-6);

    // tick 3: proceeds staged on the relay wallet, then bridged to polygon
    progress::tick(&ctx).await.unwrap();
    let order = ctx.store.get(&order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::BridgingBack);
    assert_eq!(order.bridge_back_tx.as_deref(), Some("0xbridge-1"));
    let staged = limitless.stablecoin_transfers.lock().unwrap().clone();
    assert_eq!(staged[0].0, mock_core::RELAYER.parse::<Address>().unwrap());
    {
        let bridges = relay.bridges.lock().unwrap();
        assert_eq!(bridges.len(), 1);
        assert_eq!((bridges[0].0, bridges[0].1), (8453, 137));
    }

    // tick 4: still pending -> no change; then terminal DONE completes it
    progress::tick(&ctx).await.unwrap();
    let order = ctx.store.get(&order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::BridgingBack);

    relay.set_bridge_status(
        "0xbridge-1",
        BridgeStatus::Done { receiving_tx: Some("0xrecv".into()), chain_id: Some(137) },
    );
    progress::tick(&ctx).await.unwrap();
    let order = ctx.store.get(&order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.receiving_tx.as_deref(), Some("0xrecv"));
}

#[tokio::test]
async fn cross_chain_dust_proceeds_fail_with_bridge_floor() {
    let dir = tempfile::tempdir().unwrap();
    let limitless = Arc::new(MockVenue::new(
        Platform::Limitless,
        Chain::base(),
        "0x3333333333333333333333333333333333333333",
    ));
    limitless.set_book(&[(0.55, 100.0)], &[(0.40, 100.0)]);
    let relay = Arc::new(MockRelay::funded());
    let ctx = context(vec![limitless], relay.clone(), &dir);

    let buy = seed_filled_buy(&ctx, Platform::Limitless, 0.5, 1.0);
    let order = sell::create_sell(&ctx, sell_params(&buy.id, 137)).await.unwrap();

    progress::tick(&ctx).await.unwrap(); // sell placed
    progress::tick(&ctx).await.unwrap(); // settled at ~0.40
    progress::tick(&ctx).await.unwrap(); // bridge refused: under the floor

    let order = ctx.store.get(&order.id).unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::BridgeFailed);
    assert!(order.error.as_deref().unwrap().contains("BRIDGE_AMOUNT_TOO_SMALL"));
    assert!(relay.bridges.lock().unwrap().is_empty());
}

#[tokio::test]
async fn custody_venue_sell_skips_the_share_pull() {
    let dir = tempfile::tempdir().unwrap();
    let mut opinion = MockVenue::new(
        Platform::Opinion,
        Chain::bsc(),
        "0x5555555555555555555555555555555555555555",
    );
    opinion.keeps = true;
    let opinion = Arc::new(opinion);
    let relay = Arc::new(MockRelay::funded());
    let ctx = context(vec![opinion], relay.clone(), &dir);

    let buy = seed_filled_buy(&ctx, Platform::Opinion, 5.0, 10.0);
    let order = sell::create_sell(&ctx, sell_params(&buy.id, 56)).await.unwrap();

    // shares never left the smart wallet: no router pull happens
    assert_eq!(order.status, OrderStatus::SharesPulled);
    assert!(order.pull_tx.is_none());
    assert!(relay.share_pulls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn sell_requires_a_filled_buy() {
    let dir = tempfile::tempdir().unwrap();
    let limitless = Arc::new(MockVenue::new(
        Platform::Limitless,
        Chain::base(),
        "0x3333333333333333333333333333333333333333",
    ));
    let relay = Arc::new(MockRelay::funded());
    let ctx = context(vec![limitless], relay, &dir);

    // unknown id
    let err = sell::create_sell(&ctx, sell_params("nope", 8453)).await.unwrap_err();
    assert!(err.to_string().contains("not found"));

    // buy exists but is not filled
    let mut buy = seed_filled_buy(&ctx, Platform::Limitless, 5.0, 10.0);
    buy.status = OrderStatus::Bridged;
    ctx.store.commit_touched(std::slice::from_ref(&buy)).unwrap();
    let err = sell::create_sell(&ctx, sell_params(&buy.id, 8453)).await.unwrap_err();
    assert!(err.to_string().contains("not a filled buy"));
}
