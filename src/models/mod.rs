mod crop;
mod inventory;
mod record;
mod stats;

pub use crop::{Crop, CropFormData, CropStatus};
pub use inventory::{Condition, InventoryFormData, InventoryItem};
pub use record::Record;
pub use stats::FarmStats;
