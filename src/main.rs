use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use premarket_router::api;
use premarket_router::cli::{Cli, Command};
use premarket_router::engine::{pool, router};
use premarket_router::model::book::{Direction, Orderbook, Side};
use premarket_router::model::event::EventCatalog;
use premarket_router::relay::{DisabledRelay, LifiRelay, Relay};
use premarket_router::run::config::RuntimeConfig;
use premarket_router::run::progress::{self, EngineContext};
use premarket_router::run::store::OrderStore;
use premarket_router::venues::AdapterRegistry;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;

    match cli.command {
        Command::Serve { host, port, events, orders_file } => {
            rt.block_on(serve(&host, port, events, orders_file))
        }
        Command::Book { events, event, team, side } => {
            rt.block_on(print_book(events, &event, &team, &side))
        }
        Command::Route { events, event, team, side, budget, direction } => {
            rt.block_on(print_route(events, &event, &team, &side, budget, &direction))
        }
        Command::Approvals => rt.block_on(run_approvals()),
    }
}

fn build_context(events: PathBuf, orders_file: PathBuf) -> Result<(Arc<EngineContext>, Arc<RuntimeConfig>)> {
    let config = RuntimeConfig::from_env(events, orders_file)?;
    let catalog = EventCatalog::load(&config.events_path)?;
    let registry = AdapterRegistry::build(&config);
    let relay: Arc<dyn Relay> = match LifiRelay::from_config(&config) {
        Ok(relay) => Arc::new(relay),
        Err(err) => {
            warn!("relay disabled: {err:#}");
            Arc::new(DisabledRelay)
        }
    };
    let store = OrderStore::new(config.orders_path.clone());
    let ctx = Arc::new(EngineContext { registry, relay, store, catalog });
    Ok((ctx, Arc::new(config)))
}

async fn serve(host: &str, port: u16, events: PathBuf, orders_file: PathBuf) -> Result<()> {
    let (ctx, config) = build_context(events, orders_file)?;
    tokio::spawn(progress::run_progress_loop(ctx.clone()));
    api::serve(host, port, ctx, config).await
}

async fn fetch_books(
    ctx: &EngineContext,
    event: &str,
    team: &str,
    side: Side,
) -> Vec<Orderbook> {
    let mut books = Vec::new();
    for (platform, adapter) in ctx.registry.enabled() {
        let Some(key) = ctx.catalog.routing_key(event, team, platform) else {
            continue;
        };
        match adapter.fetch_book(key, team, side).await {
            Ok(book) => books.push(book),
            Err(err) => println!("  {platform}: {err}"),
        }
    }
    books
}

async fn print_book(events: PathBuf, event: &str, team: &str, side: &str) -> Result<()> {
    let side = Side::from_str(side).map_err(anyhow::Error::msg)?;
    let (ctx, _) = build_context(events, default_orders_path())?;
    let books = fetch_books(&ctx, event, team, side).await;

    let refs: Vec<&Orderbook> = books.iter().collect();
    let pooled = serde_json::json!({
        "asks": pool::pool_asks(&refs),
        "bids": pool::pool_bids(&refs),
    });
    println!("{}", serde_json::to_string_pretty(&pooled)?);
    Ok(())
}

async fn print_route(
    events: PathBuf,
    event: &str,
    team: &str,
    side: &str,
    budget: f64,
    direction: &str,
) -> Result<()> {
    let side = Side::from_str(side).map_err(anyhow::Error::msg)?;
    let direction = Direction::from_str(direction).map_err(anyhow::Error::msg)?;
    let (ctx, _) = build_context(events, default_orders_path())?;
    let books = fetch_books(&ctx, event, team, side).await;

    let route = router::find_optimal_route(&books, budget, direction)?;
    println!("{}", serde_json::to_string_pretty(&route)?);
    Ok(())
}

async fn run_approvals() -> Result<()> {
    let (ctx, _) = build_context(PathBuf::from("config/events.json"), default_orders_path())?;
    for (platform, adapter) in ctx.registry.enabled() {
        println!("── {platform} ──");
        match adapter.setup_approvals().await {
            Ok(results) => {
                for (label, outcome) in results {
                    println!("  {label}: {outcome}");
                }
            }
            Err(err) => println!("  failed: {err}"),
        }
    }
    Ok(())
}

fn default_orders_path() -> PathBuf {
    Path::new("data/orders.json").to_path_buf()
}
