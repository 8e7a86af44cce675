//! FarmSync Store Server
//!
//! Stores per-user crop and inventory records and pushes live snapshots to
//! connected clients.
//!
//! # Configuration
//!
//! Environment variables:
//! - `FARMSYNC_PORT`: Port to listen on (default: 8080)
//! - `FARMSYNC_DATA_DIR`: Directory for the database (default: ~/.local/share/farmsync-server)
//! - `FARMSYNC_SERVER_CONFIG`: Path to config file (default: ~/.config/farmsync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "u1"
//! ```

use farmsync::server::{self, init_db, ApiKeyStore, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Directory holding the SQLite database
    data_dir: PathBuf,
    /// Path to config file
    config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("FARMSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("FARMSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("farmsync-server")
            });

        let config_path = std::env::var("FARMSYNC_SERVER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("farmsync-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }

    fn database_path(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farmsync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Database: {}", config.database_path().display());
    tracing::info!("Config file: {}", config.config_path.display());

    let pool = init_db(&config.database_path()).await?;
    let api_keys = ApiKeyStore::load(&config.config_path);
    let state = AppState::new(pool, api_keys);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    server::serve(listener, state).await?;
    Ok(())
}
