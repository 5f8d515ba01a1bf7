use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mediaferry::config::Config;
use mediaferry::server::{self, AppState, RelayServer, RelayServerConfig};
use mediaferry::store::{MemoryStore, MetadataStore, PostgresStore};
use mediaferry::telegram::TelegramApi;

#[derive(Parser, Debug)]
#[command(name = "mediaferry", version, about = "Telegram media relay")]
struct Args {
    /// Bind address (overrides RELAY_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides RELAY_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mediaferry=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let store: Arc<dyn MetadataStore> = match &config.database {
        Some(db) => {
            let store = PostgresStore::new(db)
                .await
                .context("connecting to database")?;
            store.run_migrations().await.context("running migrations")?;
            Arc::new(store)
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using in-memory store; records will not survive restart"
            );
            Arc::new(MemoryStore::new())
        }
    };

    let telegram = Arc::new(TelegramApi::new(&config.telegram));
    let state = AppState::new(store, telegram, &config.server);
    let app = server::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid bind address")?;

    let mut srv = RelayServer::new(RelayServerConfig { addr });
    srv.start(app).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    srv.shutdown().await;

    Ok(())
}
