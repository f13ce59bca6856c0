use clap::{Parser, ValueEnum};
use peerfund_core::{OrchestratorConfig, StoreConfig};
use peerfund_service::{build_router, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "peerfundd", version, about = "Peerfund contract orchestration REST service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8094
    #[arg(long, default_value = "127.0.0.1:8094")]
    listen: SocketAddr,
    /// Persistence backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = StoreMode::Auto, env = "PEERFUND_STORE")]
    store: StoreMode,
    /// PostgreSQL url for contract/funding persistence.
    #[arg(long, env = "PEERFUND_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "PEERFUND_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
    /// Worker-pool width for the disbursement transfer fan-out.
    #[arg(long, default_value_t = 4, env = "PEERFUND_TRANSFER_CONCURRENCY")]
    transfer_concurrency: usize,
    /// Timeout applied to every collaborator call, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "PEERFUND_COLLABORATOR_TIMEOUT_MS")]
    collaborator_timeout_ms: u64,
}

fn resolve_store(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let resolved_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let store = match cli.store {
        StoreMode::Memory => StoreConfig::Memory,
        StoreMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!("store=postgres requires --database-url or DATABASE_URL")
            })?;
            StoreConfig::postgres(database_url, cli.pg_max_connections)
        }
        StoreMode::Auto => {
            if let Some(database_url) = resolved_url {
                StoreConfig::postgres(database_url, cli.pg_max_connections)
            } else {
                StoreConfig::Memory
            }
        }
    };

    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "peerfund_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let store = resolve_store(&cli)?;
    let config = ServiceConfig {
        store,
        orchestrator: OrchestratorConfig {
            collaborator_timeout: Duration::from_millis(cli.collaborator_timeout_ms),
            transfer_concurrency: cli.transfer_concurrency,
        },
    };

    let state = ServiceState::bootstrap(config).await?;
    info!(store_backend = state.store_backend, "orchestrator bootstrapped");
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("peerfund-service REST listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
