use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::record::Record;

/// Quality grade of stored produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Condition {
    Excellent,
    Premium,
    #[default]
    Good,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Excellent => write!(f, "Excellent"),
            Condition::Premium => write!(f, "Premium"),
            Condition::Good => write!(f, "Good"),
        }
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excellent" => Ok(Condition::Excellent),
            "premium" => Ok(Condition::Premium),
            "good" => Ok(Condition::Good),
            _ => Err(format!(
                "Invalid condition '{}'. Valid options: Excellent, Premium, Good",
                s
            )),
        }
    }
}

/// The user-editable fields of an inventory entry.
///
/// `crop` names a crop by its display name; nothing checks that such a crop
/// exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryFormData {
    pub crop: String,
    pub quantity: f64,
    pub ready_to_sell: f64,
    pub estimated_value: f64,
    pub storage: String,
    pub condition: Condition,
}

/// An inventory entry as mirrored from the store.
pub type InventoryItem = Record<InventoryFormData>;

impl InventoryFormData {
    pub fn new(crop: impl Into<String>, quantity: f64) -> Self {
        Self {
            crop: crop.into(),
            quantity,
            ready_to_sell: 0.0,
            estimated_value: 0.0,
            storage: String::new(),
            condition: Condition::default(),
        }
    }

    pub fn with_ready_to_sell(mut self, amount: f64) -> Self {
        self.ready_to_sell = amount;
        self
    }

    pub fn with_estimated_value(mut self, value: f64) -> Self {
        self.estimated_value = value;
        self
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = storage.into();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }
}

impl fmt::Display for InventoryFormData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.crop)?;
        writeln!(f, "{}", "=".repeat(self.crop.len()))?;
        writeln!(
            f,
            "Quantity: {} ({} ready to sell)",
            self.quantity, self.ready_to_sell
        )?;
        writeln!(f, "Estimated value: {}", self.estimated_value)?;
        writeln!(f, "Condition: {}", self.condition)?;
        if !self.storage.is_empty() {
            writeln!(f, "Storage: {}", self.storage)?;
        }
        Ok(())
    }
}
