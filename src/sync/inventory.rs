use super::collection::Collection;
use super::error::SyncError;
use super::synchronizer::Synchronizer;
use crate::models::{InventoryFormData, InventoryItem};
use crate::store::RecordStore;

/// The inventory collection. Nothing is derived from it.
#[derive(Debug, Clone, Copy)]
pub struct Inventory;

impl Collection for Inventory {
    const SEGMENT: &'static str = "inventory";
    type Form = InventoryFormData;
    type Summary = ();

    fn summarize(_records: &[InventoryItem]) {}
}

/// Live mirror of the signed-in user's inventory.
pub type InventorySync<S> = Synchronizer<Inventory, S>;

impl<S: RecordStore> Synchronizer<Inventory, S> {
    pub fn inventory(&self) -> Vec<InventoryItem> {
        self.records()
    }

    pub async fn add_inventory_item(&self, item: &InventoryFormData) -> Result<String, SyncError> {
        self.add(item).await
    }

    pub async fn update_inventory_item(
        &self,
        id: &str,
        item: &InventoryFormData,
    ) -> Result<(), SyncError> {
        self.update(id, item).await
    }

    pub async fn delete_inventory_item(&self, id: &str) -> Result<(), SyncError> {
        self.remove(id).await
    }
}
