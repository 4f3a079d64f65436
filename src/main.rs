use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use autocrud::config::AppConfig;
use autocrud::database::DatabaseManager;
use autocrud::server::{self, Backend};

#[derive(Parser)]
#[command(name = "autocrud-server")]
#[command(about = "Serve generated CRUD routes for the bundled collections")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Address to bind (overrides AUTOCRUD_HOST)")]
    host: Option<String>,

    #[arg(long, help = "Port to listen on (overrides AUTOCRUD_PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Keep collections in memory even if DATABASE_URL is set")]
    memory: bool,

    #[arg(long, help = "Database on the configured server to use instead of the one in DATABASE_URL")]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config: AppConfig = autocrud::config::config().clone();
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::info!("Starting autocrud in {:?} mode", config.environment);

    let backend = if cli.memory || config.database.url.is_none() {
        if autocrud::is_production!() {
            tracing::warn!("No database configured; documents will not survive a restart");
        }
        Backend::Memory
    } else {
        let pool = match cli.database.as_deref() {
            Some(name) => DatabaseManager::pool(name).await,
            None => DatabaseManager::default_pool().await,
        }
        .context("failed to connect to database")?;
        Backend::Postgres(pool)
    };
    tracing::info!("Using {} storage", backend.label());

    let users = backend.model("users", server::users_schema()).await?;
    let app = server::app(&config, backend, &[users]);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("autocrud listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    DatabaseManager::close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
