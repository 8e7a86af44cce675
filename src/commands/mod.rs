mod config_cmd;
mod crop;
mod inventory;
mod session;
mod stats;
mod watch;

use clap::ValueEnum;

pub use config_cmd::ConfigCommand;
pub use crop::CropCommand;
pub use inventory::InventoryCommand;
pub use session::Session;
pub use stats::StatsCommand;
pub use watch::WatchCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
