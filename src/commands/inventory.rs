use clap::{Args, Subcommand};
use farmsync::models::{Condition, InventoryFormData};
use farmsync::store::RemoteStore;
use farmsync::sync::InventorySync;

use super::crop::{truncate, warn_rejected};
use super::{OutputFormat, Session};

#[derive(Args)]
pub struct InventoryCommand {
    #[command(subcommand)]
    pub command: InventorySubcommand,
}

/// Inventory fields settable from the command line.
#[derive(Args, Default)]
pub struct InventoryFields {
    /// Amount ready to sell
    #[arg(long = "ready")]
    ready_to_sell: Option<f64>,

    /// Estimated value
    #[arg(long = "value")]
    estimated_value: Option<f64>,

    /// Storage location
    #[arg(long)]
    storage: Option<String>,

    /// Condition (Excellent, Premium, Good)
    #[arg(long)]
    condition: Option<Condition>,
}

impl InventoryFields {
    fn apply(self, mut item: InventoryFormData) -> InventoryFormData {
        if let Some(ready) = self.ready_to_sell {
            item.ready_to_sell = ready;
        }
        if let Some(value) = self.estimated_value {
            item.estimated_value = value;
        }
        if let Some(storage) = self.storage {
            item.storage = storage;
        }
        if let Some(condition) = self.condition {
            item.condition = condition;
        }
        item
    }
}

#[derive(Subcommand)]
pub enum InventorySubcommand {
    /// Record a new inventory entry
    Add {
        /// Name of the crop in storage
        crop: String,

        /// Quantity in storage
        #[arg(long)]
        quantity: f64,

        #[command(flatten)]
        fields: InventoryFields,
    },

    /// List all inventory entries
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing inventory entry
    Update {
        /// Inventory entry ID
        id: String,

        /// New crop name
        #[arg(long)]
        crop: Option<String>,

        /// New quantity
        #[arg(long)]
        quantity: Option<f64>,

        #[command(flatten)]
        fields: InventoryFields,
    },

    /// Delete an inventory entry
    Delete {
        /// Inventory entry ID
        id: String,
    },
}

impl InventoryCommand {
    pub async fn run(self, session: &Session) -> Result<(), Box<dyn std::error::Error>> {
        let inventory = session.inventory();

        match self.command {
            InventorySubcommand::Add {
                crop,
                quantity,
                fields,
            } => {
                let item = fields.apply(InventoryFormData::new(crop, quantity));
                let id = inventory.add_inventory_item(&item).await?;
                println!("Added inventory entry [{}]:", id);
                println!("{}", item);
            }

            InventorySubcommand::List { format } => {
                let mirror = inventory.settled().await;
                if let Some(error) = &mirror.error {
                    return Err(error.clone().into());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&mirror.records)?);
                    }
                    OutputFormat::Text => {
                        if mirror.records.is_empty() {
                            println!("No inventory found");
                        } else {
                            println!(
                                "{:<20}  {:<20}  {:>9}  {:>9}  {:<9}",
                                "ID", "CROP", "QUANTITY", "READY", "CONDITION"
                            );
                            println!("{}", "-".repeat(75));
                            for item in &mirror.records {
                                println!(
                                    "{:<20}  {:<20}  {:>9}  {:>9}  {:<9}",
                                    item.id,
                                    truncate(&item.crop, 20),
                                    item.quantity,
                                    item.ready_to_sell,
                                    item.condition.to_string()
                                );
                            }
                            println!("\nTotal: {} entr(ies)", mirror.records.len());
                        }
                    }
                }
                warn_rejected(mirror.rejected.len());
            }

            InventorySubcommand::Update {
                id,
                crop,
                quantity,
                fields,
            } => {
                let mut item = find_item(&inventory, &id).await?;
                if let Some(crop) = crop {
                    item.crop = crop;
                }
                if let Some(quantity) = quantity {
                    item.quantity = quantity;
                }
                let item = fields.apply(item);
                inventory.update_inventory_item(&id, &item).await?;
                println!("Updated inventory entry [{}]:", id);
                println!("{}", item);
            }

            InventorySubcommand::Delete { id } => {
                inventory.delete_inventory_item(&id).await?;
                println!("Deleted inventory entry: {}", id);
            }
        }

        inventory.shutdown().await;
        Ok(())
    }
}

async fn find_item(
    inventory: &InventorySync<RemoteStore>,
    id: &str,
) -> Result<InventoryFormData, Box<dyn std::error::Error>> {
    let mirror = inventory.settled().await;
    if let Some(error) = mirror.error {
        return Err(error.into());
    }
    mirror
        .records
        .into_iter()
        .find(|item| item.id == id)
        .map(|item| item.into_data())
        .ok_or_else(|| format!("Inventory entry not found: {}", id).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_override_only_what_was_given() {
        let item = InventoryFormData::new("Wheat", 100.0).with_storage("Barn A");
        let fields = InventoryFields {
            ready_to_sell: Some(40.0),
            condition: Some(Condition::Premium),
            ..Default::default()
        };

        let updated = fields.apply(item);
        assert_eq!(updated.storage, "Barn A");
        assert_eq!(updated.ready_to_sell, 40.0);
        assert_eq!(updated.condition, Condition::Premium);
    }
}
