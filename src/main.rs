use std::io;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grantwright::agents::{AgentRegistry, GeminiClient};
use grantwright::config::{Config, StorageKind};
use grantwright::store::{JsonFileBackend, Store};
use grantwright::{api, db, Orchestrator};

#[derive(Parser)]
#[command(name = "grantwright")]
#[command(about = "Versioned grant proposal drafting backed by generative agents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port for HTTP API (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List stored topics
    Topics,
    /// Print a topic's full version history as JSON
    Show { topic: String },
    /// Delete a topic and all of its versions
    Delete { topic: String },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "grantwright=debug,tower_http=debug".into()),
    );

    // Logs go to stderr so `show` output stays pipeable.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    match config.storage.backend {
        StorageKind::Sqlite => {
            let path = match &config.storage.path {
                Some(path) => path.clone(),
                None => db::Database::default_path()?,
            };
            tracing::debug!("Using SQLite store at {}", path.display());
            let database = db::Database::open(path)?;
            database.migrate()?;
            Ok(Store::open(Arc::new(database))?)
        }
        StorageKind::Json => {
            let path = match &config.storage.path {
                Some(path) => path.clone(),
                None => directories::ProjectDirs::from("", "", "grantwright")
                    .context("Could not determine data directory")?
                    .data_dir()
                    .join("memory_store.json"),
            };
            let backend = JsonFileBackend::open(path)?;
            tracing::debug!("Using JSON store at {}", backend.path().display());
            Ok(Store::open(Arc::new(backend))?)
        }
    }
}

async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or(config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let api_key = config
        .gemini
        .api_key
        .clone()
        .context("GEMINI_API_KEY is not set")?;
    let generator = GeminiClient::new(&config.gemini, api_key)?;
    let store = open_store(&config)?;
    let orchestrator = Orchestrator::new(store, AgentRegistry::new(Arc::new(generator)));

    let app = api::create_router(orchestrator);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    tracing::info!(
        "Grantwright listening on http://{}:{} (model {})",
        host,
        port,
        config.gemini.model
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load()?;

    match cli.command {
        Some(Commands::Serve { host, port }) => serve(config, host, port).await?,
        None => serve(config, None, None).await?,
        Some(Commands::Topics) => {
            let store = open_store(&config)?;
            for topic in store.list() {
                println!("{}", topic);
            }
        }
        Some(Commands::Show { topic }) => {
            let store = open_store(&config)?;
            let project = store.get(&topic)?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Some(Commands::Delete { topic }) => {
            let store = open_store(&config)?;
            store.delete(&topic).await?;
            println!("Deleted topic '{}'", topic);
        }
    }

    Ok(())
}
