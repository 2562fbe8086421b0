use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "premarket-router",
    about = "Cross-venue, cross-chain order router for binary prediction markets"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the HTTP API and run the background order progress loop
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
        /// Event catalog (read-only JSON)
        #[arg(long, default_value = "config/events.json")]
        events: PathBuf,
        /// Durable order store
        #[arg(long, default_value = "data/orders.json")]
        orders_file: PathBuf,
    },
    /// Fetch venue books for an outcome and print the pooled view
    Book {
        #[arg(long, default_value = "config/events.json")]
        events: PathBuf,
        #[arg(long)]
        event: String,
        #[arg(long)]
        team: String,
        #[arg(long, default_value = "yes")]
        side: String,
    },
    /// Compute an order route for a budget across all venues
    Route {
        #[arg(long, default_value = "config/events.json")]
        events: PathBuf,
        #[arg(long)]
        event: String,
        #[arg(long)]
        team: String,
        #[arg(long, default_value = "yes")]
        side: String,
        #[arg(long)]
        budget: f64,
        #[arg(long, default_value = "buy")]
        direction: String,
    },
    /// Run one-time relayer approvals of each venue's exchange contracts
    Approvals,
}
