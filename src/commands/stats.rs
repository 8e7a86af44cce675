use clap::Args;

use super::{OutputFormat, Session};

#[derive(Args)]
pub struct StatsCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl StatsCommand {
    pub async fn run(self, session: &Session) -> Result<(), Box<dyn std::error::Error>> {
        let farm = session.farm();
        let mirror = farm.settled().await;
        if let Some(error) = &mirror.error {
            return Err(error.clone().into());
        }

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&mirror.summary)?);
            }
            OutputFormat::Text => {
                println!("Farm statistics");
                println!("===============\n");
                print!("{}", mirror.summary);
            }
        }

        farm.shutdown().await;
        Ok(())
    }
}
