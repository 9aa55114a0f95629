//! OAuth2 token service for the MCP gateway

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_service::config::Config;
use token_service::provider::LocalIdentityProvider;
use token_service::storage::{LocalStore, RecordStore, StoreError};
use token_service::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "token-service")]
#[command(about = "OAuth2 token endpoint for the MCP gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the token endpoint
    Serve(ServeArgs),

    /// Print a bcrypt hash of a client secret, for use as `client_secret_hash`
    HashSecret {
        /// The client secret
        secret: String,

        /// bcrypt cost factor
        #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
        cost: u32,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value_t = 3001, env = "TOKEN_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "TOKEN_BIND")]
    bind: String,

    /// Path to config directory (config.json and records.json)
    #[arg(long, default_value = "/config", env = "TOKEN_CONFIG_PATH")]
    config_path: String,

    /// Public URL for this service (used in OAuth metadata)
    #[arg(long, env = "TOKEN_PUBLIC_URL")]
    public_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "token_service=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::HashSecret { secret, cost } => {
            let hash = bcrypt::hash(secret, cost).context("Failed to hash secret")?;
            println!("{}", hash);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load(&args.config_path)?;
    let store: Arc<dyn RecordStore> = Arc::new(
        LocalStore::open(&args.config_path)
            .with_context(|| format!("Failed to open record store in {}", args.config_path))?,
    );

    // Seed clients managed through config
    for client in &config.clients {
        match store.create_record(client).await {
            Ok(()) => tracing::info!("Seeded client {}", client.client_id()),
            Err(StoreError::AlreadyExists { .. }) => {
                tracing::debug!("Client {} already present", client.client_id())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to seed client {}", client.client_id()))
            }
        }
    }

    let provider = Arc::new(LocalIdentityProvider::new(config.identity_providers.clone()));
    let state = Arc::new(AppState::new(
        config,
        store,
        provider,
        args.public_url.clone(),
    ));

    let app = router(state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;

    tracing::info!("Starting token-service on {}", addr);
    tracing::info!("Public URL: {}", args.public_url);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Token service shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
