use serde::{Deserialize, Serialize};
use std::fmt;

use super::crop::Crop;

/// Farm-wide aggregates derived from the crop list. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmStats {
    pub total_crops: usize,
    /// Acres, rounded to one decimal.
    pub total_farm_area: f64,
    pub total_water_usage: f64,
    /// Mean yield increase in percent, rounded to one decimal; 0 with no crops.
    pub avg_yield_increase: f64,
}

impl FarmStats {
    pub fn from_crops(crops: &[Crop]) -> Self {
        let total_crops = crops.len();
        let total_farm_area: f64 = crops.iter().map(|c| c.farming_area).sum();
        let total_water_usage: f64 = crops.iter().map(|c| c.water_usage).sum();
        let total_yield_increase: f64 = crops.iter().map(|c| c.yield_increase).sum();
        let avg_yield_increase = if total_crops > 0 {
            total_yield_increase / total_crops as f64
        } else {
            0.0
        };

        Self {
            total_crops,
            total_farm_area: round1(total_farm_area),
            total_water_usage,
            avg_yield_increase: round1(avg_yield_increase),
        }
    }
}

impl fmt::Display for FarmStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Crops: {}", self.total_crops)?;
        writeln!(f, "Farm area: {} acres", self.total_farm_area)?;
        writeln!(f, "Water usage: {}", self.total_water_usage)?;
        writeln!(f, "Avg yield increase: {}%", self.avg_yield_increase)
    }
}

/// Rounds to one decimal place, halves away from zero.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CropFormData;

    fn crop(id: &str, area: f64, water: f64, yield_increase: f64) -> Crop {
        Crop::new(
            id,
            CropFormData::new(id, "test")
                .with_farming_area(area)
                .with_water_usage(water)
                .with_yield_increase(yield_increase),
        )
    }

    #[test]
    fn test_stats_rounding() {
        let crops = vec![
            crop("a", 10.0, 1.0, 12.0),
            crop("b", 5.25, 2.0, 8.0),
            crop("c", 0.0, 3.0, 0.0),
        ];

        let stats = FarmStats::from_crops(&crops);
        assert_eq!(stats.total_crops, 3);
        assert_eq!(stats.total_farm_area, 15.3);
        assert_eq!(stats.total_water_usage, 6.0);
        assert_eq!(stats.avg_yield_increase, 6.7);
    }

    #[test]
    fn test_stats_empty() {
        let stats = FarmStats::from_crops(&[]);
        assert_eq!(stats, FarmStats::default());
        assert_eq!(stats.avg_yield_increase, 0.0);
    }

    #[test]
    fn test_water_usage_is_not_rounded() {
        let crops = vec![crop("a", 1.0, 0.125, 0.0), crop("b", 1.0, 0.25, 0.0)];
        let stats = FarmStats::from_crops(&crops);
        assert_eq!(stats.total_water_usage, 0.375);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_value(FarmStats::default()).unwrap();
        assert!(json.get("totalCrops").is_some());
        assert!(json.get("avgYieldIncrease").is_some());
    }
}
