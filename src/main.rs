//! Foreman server - capability-routed coordination engine for autonomous
//! worker pools

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use foreman::coordination::{
    Coordinator, CoordinatorConfig, NegotiationConfig, RoutingTable,
};
use foreman::{api, AppState};

#[derive(Debug, Parser)]
#[command(name = "foreman", about = "Coordination engine for worker pools")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "FOREMAN_PORT", default_value_t = 3000)]
    port: u16,

    /// Path to the routing table (task type -> capabilities + protocol)
    #[arg(long, env = "FOREMAN_ROUTING", default_value = "config/routing.json")]
    routing: String,

    /// Admission control: tasks dispatched concurrently
    #[arg(long, env = "FOREMAN_MAX_CONCURRENT_TASKS", default_value_t = 10)]
    max_concurrent_tasks: usize,

    /// Monitoring/dequeue tick in milliseconds
    #[arg(long, env = "FOREMAN_TICK_MS", default_value_t = 100)]
    tick_ms: u64,

    /// Negotiation session timeout in seconds
    #[arg(long, env = "FOREMAN_NEGOTIATION_TIMEOUT_SECS", default_value_t = 30)]
    negotiation_timeout_secs: u64,

    /// Resolve expiring negotiations by majority acceptance instead of
    /// timing them out
    #[arg(long, env = "FOREMAN_MAJORITY_FALLBACK")]
    majority_fallback: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foreman=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Routing table is required; malformed entries fail closed at startup
    let routing_json = std::fs::read_to_string(&args.routing)
        .map_err(|e| anyhow::anyhow!("failed to read routing table {}: {}", args.routing, e))?;
    let routing = RoutingTable::from_json_str(&routing_json)?;
    tracing::info!(path = %args.routing, task_types = routing.len(), "routing table loaded");

    let config = CoordinatorConfig {
        max_concurrent_tasks: args.max_concurrent_tasks,
        tick_interval: Duration::from_millis(args.tick_ms),
        negotiation: NegotiationConfig {
            timeout: Duration::from_secs(args.negotiation_timeout_secs),
            majority_fallback: args.majority_fallback,
        },
    };

    let coordinator = Coordinator::new(config, routing);
    Arc::clone(&coordinator).start();

    let state = AppState::new(coordinator);
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
