use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::record::Record;

/// Growth stage of a crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropStatus {
    #[default]
    Planted,
    Growing,
    Harvesting,
    Harvested,
}

impl fmt::Display for CropStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropStatus::Planted => write!(f, "planted"),
            CropStatus::Growing => write!(f, "growing"),
            CropStatus::Harvesting => write!(f, "harvesting"),
            CropStatus::Harvested => write!(f, "harvested"),
        }
    }
}

impl FromStr for CropStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planted" => Ok(CropStatus::Planted),
            "growing" => Ok(CropStatus::Growing),
            "harvesting" => Ok(CropStatus::Harvesting),
            "harvested" => Ok(CropStatus::Harvested),
            _ => Err(format!(
                "Invalid crop status '{}'. Valid options: planted, growing, harvesting, harvested",
                s
            )),
        }
    }
}

/// The user-editable fields of a crop, exactly as they are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropFormData {
    pub name: String,
    pub variety: String,
    /// Acres under this crop.
    pub farming_area: f64,
    pub water_usage: f64,
    /// Percentage.
    pub yield_increase: f64,
    pub planting_date: String,
    pub expected_harvest: String,
    pub status: CropStatus,
    /// 0 to 100.
    pub health_score: f64,
}

/// A crop as mirrored from the store.
pub type Crop = Record<CropFormData>;

impl CropFormData {
    pub fn new(name: impl Into<String>, variety: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variety: variety.into(),
            farming_area: 0.0,
            water_usage: 0.0,
            yield_increase: 0.0,
            planting_date: String::new(),
            expected_harvest: String::new(),
            status: CropStatus::default(),
            health_score: 0.0,
        }
    }

    pub fn with_farming_area(mut self, acres: f64) -> Self {
        self.farming_area = acres;
        self
    }

    pub fn with_water_usage(mut self, water_usage: f64) -> Self {
        self.water_usage = water_usage;
        self
    }

    pub fn with_yield_increase(mut self, percent: f64) -> Self {
        self.yield_increase = percent;
        self
    }

    pub fn with_planting_date(mut self, date: impl Into<String>) -> Self {
        self.planting_date = date.into();
        self
    }

    pub fn with_expected_harvest(mut self, date: impl Into<String>) -> Self {
        self.expected_harvest = date.into();
        self
    }

    pub fn with_status(mut self, status: CropStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_health_score(mut self, score: f64) -> Self {
        self.health_score = score;
        self
    }
}

impl fmt::Display for CropFormData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!("{} ({})", self.name, self.variety);
        writeln!(f, "{}", title)?;
        writeln!(f, "{}", "=".repeat(title.len()))?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Area: {} acres", self.farming_area)?;
        writeln!(f, "Water usage: {}", self.water_usage)?;
        writeln!(f, "Yield increase: {}%", self.yield_increase)?;
        writeln!(f, "Health: {}/100", self.health_score)?;

        if !self.planting_date.is_empty() {
            writeln!(f, "Planted: {}", self.planting_date)?;
        }
        if !self.expected_harvest.is_empty() {
            writeln!(f, "Expected harvest: {}", self.expected_harvest)?;
        }

        Ok(())
    }
}
