use super::collection::Collection;
use super::error::SyncError;
use super::synchronizer::Synchronizer;
use crate::models::{Crop, CropFormData, FarmStats};
use crate::store::RecordStore;

/// The crops collection, summarized into [`FarmStats`].
#[derive(Debug, Clone, Copy)]
pub struct Crops;

impl Collection for Crops {
    const SEGMENT: &'static str = "crops";
    type Form = CropFormData;
    type Summary = FarmStats;

    fn summarize(records: &[Crop]) -> FarmStats {
        FarmStats::from_crops(records)
    }
}

/// Live mirror of the signed-in user's crops.
pub type FarmDataSync<S> = Synchronizer<Crops, S>;

impl<S: RecordStore> Synchronizer<Crops, S> {
    pub fn crops(&self) -> Vec<Crop> {
        self.records()
    }

    pub fn statistics(&self) -> FarmStats {
        self.summary()
    }

    /// Returns the key the new crop was stored under.
    pub async fn add_crop(&self, crop: &CropFormData) -> Result<String, SyncError> {
        self.add(crop).await
    }

    pub async fn update_crop(&self, id: &str, crop: &CropFormData) -> Result<(), SyncError> {
        self.update(id, crop).await
    }

    pub async fn delete_crop(&self, id: &str) -> Result<(), SyncError> {
        self.remove(id).await
    }
}
