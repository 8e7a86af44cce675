use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{
    ConfigCommand, CropCommand, InventoryCommand, Session, StatsCommand, WatchCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "farmsync")]
#[command(version)]
#[command(about = "Manage crops and inventory on a FarmSync server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage crops
    Crop(CropCommand),

    /// Manage inventory
    Inventory(InventoryCommand),

    /// Show farm statistics
    Stats(StatsCommand),

    /// Follow crops and inventory live
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never mix with command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farmsync=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Crop(cmd)) => {
            let session = Session::connect(&config).await?;
            cmd.run(&session).await?;
        }
        Some(Commands::Inventory(cmd)) => {
            let session = Session::connect(&config).await?;
            cmd.run(&session).await?;
        }
        Some(Commands::Stats(cmd)) => {
            let session = Session::connect(&config).await?;
            cmd.run(&session).await?;
        }
        Some(Commands::Watch(cmd)) => {
            let session = Session::connect(&config).await?;
            cmd.run(&session).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config).await?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
