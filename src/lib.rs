//! FarmSync: live per-user crop and inventory mirrors over a remote record
//! store.
//!
//! - [`store`]: the record store abstraction, with an in-memory store and a
//!   WebSocket client for `farmsync-server`.
//! - [`identity`]: the signed-in user, shared by every synchronizer.
//! - [`sync`]: synchronizers that mirror a user's crops and inventory and
//!   write changes back.
//! - [`models`]: record types and farm statistics.
//! - [`server`]: the store server behind the `farmsync-server` binary.

pub mod identity;
pub mod models;
pub mod protocol;
pub mod server;
pub mod store;
pub mod sync;

pub use identity::{IdentityProvider, UserId};
pub use models::{Crop, CropFormData, FarmStats, InventoryFormData, InventoryItem};
pub use store::{MemoryStore, RecordStore, RemoteStore, StoreError, StoreErrorKind};
pub use sync::{FarmDataSync, InventorySync, SyncError};

/// Crate version, as reported by `/health`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
