use clap::{Args, Subcommand};
use farmsync::models::{CropFormData, CropStatus};
use farmsync::store::RemoteStore;
use farmsync::sync::FarmDataSync;

use super::{OutputFormat, Session};

#[derive(Args)]
pub struct CropCommand {
    #[command(subcommand)]
    pub command: CropSubcommand,
}

/// Crop fields settable from the command line.
#[derive(Args, Default)]
pub struct CropFields {
    /// Variety of the crop
    #[arg(long)]
    variety: Option<String>,

    /// Acres under the crop
    #[arg(long)]
    area: Option<f64>,

    /// Water usage
    #[arg(long)]
    water: Option<f64>,

    /// Yield increase in percent
    #[arg(long = "yield-increase")]
    yield_increase: Option<f64>,

    /// Planting date (YYYY-MM-DD)
    #[arg(long)]
    planted: Option<String>,

    /// Expected harvest date (YYYY-MM-DD)
    #[arg(long)]
    harvest: Option<String>,

    /// Growth stage (planted, growing, harvesting, harvested)
    #[arg(long)]
    status: Option<CropStatus>,

    /// Health score from 0 to 100
    #[arg(long)]
    health: Option<f64>,
}

impl CropFields {
    fn apply(self, mut crop: CropFormData) -> CropFormData {
        if let Some(variety) = self.variety {
            crop.variety = variety;
        }
        if let Some(area) = self.area {
            crop.farming_area = area;
        }
        if let Some(water) = self.water {
            crop.water_usage = water;
        }
        if let Some(yield_increase) = self.yield_increase {
            crop.yield_increase = yield_increase;
        }
        if let Some(planted) = self.planted {
            crop.planting_date = planted;
        }
        if let Some(harvest) = self.harvest {
            crop.expected_harvest = harvest;
        }
        if let Some(status) = self.status {
            crop.status = status;
        }
        if let Some(health) = self.health {
            crop.health_score = health;
        }
        crop
    }
}

#[derive(Subcommand)]
pub enum CropSubcommand {
    /// Record a new crop
    Add {
        /// Name of the crop
        name: String,

        #[command(flatten)]
        fields: CropFields,
    },

    /// List all crops
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a crop's details
    Show {
        /// Crop ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing crop
    Update {
        /// Crop ID
        id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        fields: CropFields,
    },

    /// Delete a crop
    Delete {
        /// Crop ID
        id: String,
    },
}

impl CropCommand {
    pub async fn run(self, session: &Session) -> Result<(), Box<dyn std::error::Error>> {
        let farm = session.farm();

        match self.command {
            CropSubcommand::Add { name, fields } => {
                let crop = fields.apply(CropFormData::new(name, ""));
                let id = farm.add_crop(&crop).await?;
                println!("Added crop [{}]:", id);
                println!("{}", crop);
            }

            CropSubcommand::List { format } => {
                let mirror = farm.settled().await;
                if let Some(error) = &mirror.error {
                    return Err(error.clone().into());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&mirror.records)?);
                    }
                    OutputFormat::Text => {
                        if mirror.records.is_empty() {
                            println!("No crops found");
                        } else {
                            println!(
                                "{:<20}  {:<20}  {:<11}  {:>8}  {:>6}",
                                "ID", "NAME", "STATUS", "ACRES", "HEALTH"
                            );
                            println!("{}", "-".repeat(73));
                            for crop in &mirror.records {
                                println!(
                                    "{:<20}  {:<20}  {:<11}  {:>8}  {:>6}",
                                    crop.id,
                                    truncate(&crop.name, 20),
                                    crop.status.to_string(),
                                    crop.farming_area,
                                    crop.health_score
                                );
                            }
                            println!("\nTotal: {} crop(s)", mirror.records.len());
                        }
                    }
                }
                warn_rejected(mirror.rejected.len());
            }

            CropSubcommand::Show { id, format } => {
                let crop = find_crop(&farm, &id).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&crop)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", crop);
                    }
                }
            }

            CropSubcommand::Update { id, name, fields } => {
                let mut crop = find_crop(&farm, &id).await?;
                if let Some(name) = name {
                    crop.name = name;
                }
                let crop = fields.apply(crop);
                farm.update_crop(&id, &crop).await?;
                println!("Updated crop [{}]:", id);
                println!("{}", crop);
            }

            CropSubcommand::Delete { id } => {
                farm.delete_crop(&id).await?;
                println!("Deleted crop: {}", id);
            }
        }

        farm.shutdown().await;
        Ok(())
    }
}

async fn find_crop(
    farm: &FarmDataSync<RemoteStore>,
    id: &str,
) -> Result<CropFormData, Box<dyn std::error::Error>> {
    let mirror = farm.settled().await;
    if let Some(error) = mirror.error {
        return Err(error.into());
    }
    mirror
        .records
        .into_iter()
        .find(|crop| crop.id == id)
        .map(|crop| crop.into_data())
        .ok_or_else(|| format!("Crop not found: {}", id).into())
}

pub(super) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 3).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

pub(super) fn warn_rejected(count: usize) {
    if count > 0 {
        eprintln!("Warning: {} malformed record(s) skipped", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_override_only_what_was_given() {
        let crop = CropFormData::new("Wheat", "Durum")
            .with_farming_area(10.0)
            .with_health_score(70.0);
        let fields = CropFields {
            health: Some(90.0),
            status: Some(CropStatus::Harvesting),
            ..Default::default()
        };

        let updated = fields.apply(crop);
        assert_eq!(updated.variety, "Durum");
        assert_eq!(updated.farming_area, 10.0);
        assert_eq!(updated.health_score, 90.0);
        assert_eq!(updated.status, CropStatus::Harvesting);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Wheat", 20), "Wheat");
        assert_eq!(truncate("A very long crop name indeed", 10), "A very ...");
    }
}
