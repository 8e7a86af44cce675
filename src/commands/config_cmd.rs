use clap::{Args, Subcommand};
use farmsync::identity::check_server;

use super::OutputFormat;
use crate::config::{mask_key, Config};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check that the configured server is reachable
    Check,
}

impl ConfigCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("server_url: {}", config.server_url.value);
                        println!("  source: {}", config.server_url.source);
                        println!();

                        match &config.api_key.value {
                            Some(key) => println!("api_key: {}", mask_key(key)),
                            None => println!("api_key: (not set)"),
                        }
                        println!("  source: {}", config.api_key.source);
                        println!();

                        println!(
                            "connect_timeout_secs: {}",
                            config.connect_timeout_secs.value
                        );
                        println!("  source: {}", config.connect_timeout_secs.source);
                    }
                }
                Ok(())
            }
            ConfigSubcommand::Check => {
                let health =
                    check_server(&config.server_url.value, config.connect_timeout()).await?;
                println!(
                    "Server {} is {} (version {})",
                    config.server_url.value, health.status, health.version
                );
                Ok(())
            }
        }
    }
}
