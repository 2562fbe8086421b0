use std::collections::BTreeMap;
use std::str::FromStr;

use axum::Json;
use axum::extract::{Query, State};
use tokio::task::JoinSet;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::api::types::{
    ConfigResponse, EventQuery, OrderbookQuery, PlatformBook, PooledSide, RouteQuery,
    RouteResponse, SideBooks,
};
use crate::engine::{pool, router};
use crate::model::Platform;
use crate::model::book::{Direction, Orderbook, Side};

pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        wc_project_id: state.config.wc_project_id.clone(),
        routers: state
            .config
            .router_addresses
            .iter()
            .map(|(&chain, addr)| (chain, addr.to_string()))
            .collect(),
        relayer_address: state.config.relayer_address().map(|a| a.to_string()),
    })
}

pub async fn event_platforms(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Json<BTreeMap<String, Vec<Platform>>> {
    Json(
        state
            .ctx
            .catalog
            .platforms_for(&query.event_id)
            .into_iter()
            .collect(),
    )
}

/// Fan out one book fetch per (venue, side). Venue failures are isolated:
/// the offending venue is reported as `{error}` inside the response.
async fn fetch_side_books(
    state: &AppState,
    event_id: &str,
    team: &str,
    side: Side,
) -> (BTreeMap<Platform, PlatformBook>, Vec<Orderbook>) {
    let mut tasks = JoinSet::new();
    for (platform, adapter) in state.ctx.registry.enabled() {
        let Some(key) = state.ctx.catalog.routing_key(event_id, team, platform) else {
            continue;
        };
        let key = key.clone();
        let team = team.to_string();
        tasks.spawn(async move {
            let result = adapter.fetch_book(&key, &team, side).await;
            (platform, result)
        });
    }

    let mut platforms = BTreeMap::new();
    let mut books = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let Ok((platform, result)) = joined else {
            continue;
        };
        match result {
            Ok(book) => {
                books.push(book.clone());
                platforms.insert(platform, PlatformBook::Book(book));
            }
            Err(err) => {
                platforms.insert(platform, PlatformBook::Error { error: err.to_string() });
            }
        }
    }
    (platforms, books)
}

fn pooled_side(books: &[Orderbook], team: &str, side: Side) -> PooledSide {
    let refs: Vec<&Orderbook> = books.iter().collect();
    let asks = pool::pool_asks(&refs);
    let bids = pool::pool_bids(&refs);
    PooledSide {
        platform: "pooled",
        team: team.to_string(),
        side: side.to_string(),
        best_ask: asks.first().map(|l| l.price_cents).unwrap_or(0.0),
        best_bid: bids.first().map(|l| l.price_cents).unwrap_or(0.0),
        asks,
        bids,
    }
}

pub async fn orderbook_all(
    State(state): State<AppState>,
    Query(query): Query<OrderbookQuery>,
) -> Result<Json<BTreeMap<String, SideBooks>>, ApiError> {
    if state.ctx.catalog.get(&query.event_id).is_none() {
        return Err(ApiError::NotFound("unknown event".into()));
    }

    let mut sides = BTreeMap::new();
    for side in [Side::Yes, Side::No] {
        let (platforms, books) =
            fetch_side_books(&state, &query.event_id, &query.team, side).await;
        sides.insert(
            side.to_string(),
            SideBooks {
                platforms,
                pooled: pooled_side(&books, &query.team, side),
            },
        );
    }
    Ok(Json(sides))
}

pub async fn find_route(
    State(state): State<AppState>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RouteResponse>, ApiError> {
    let side = Side::from_str(&query.side).map_err(ApiError::BadRequest)?;
    let direction = Direction::from_str(&query.direction).map_err(ApiError::BadRequest)?;
    if state.ctx.catalog.get(&query.event_id).is_none() {
        return Err(ApiError::NotFound("unknown event".into()));
    }

    let (platforms, books) = fetch_side_books(&state, &query.event_id, &query.team, side).await;
    let adapter_errors: BTreeMap<Platform, String> = platforms
        .into_iter()
        .filter_map(|(p, book)| match book {
            PlatformBook::Error { error } => Some((p, error)),
            PlatformBook::Book(_) => None,
        })
        .collect();

    let mut route = router::find_optimal_route(&books, query.budget, direction)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // Attach the catalog's routing identifiers so the client can echo them
    // back at order creation.
    for (platform, alloc) in route.per_platform.iter_mut() {
        if let Some(key) = state
            .ctx
            .catalog
            .routing_key(&query.event_id, &query.team, *platform)
        {
            alloc.market = key.market.clone();
            alloc.token = key.token_for(side).map(str::to_string);
        }
    }

    Ok(Json(RouteResponse {
        route,
        adapter_errors: if adapter_errors.is_empty() {
            None
        } else {
            Some(adapter_errors)
        },
    }))
}
