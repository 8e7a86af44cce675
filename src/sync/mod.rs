//! Client-side synchronization of per-user collections.
//!
//! A [`Synchronizer`] follows the signed-in user from an
//! [`IdentityProvider`](crate::identity::IdentityProvider), subscribes to
//! `users/{uid}/{collection}` in a [`RecordStore`](crate::store::RecordStore),
//! and publishes a [`Mirror`] of the decoded records through a `watch`
//! channel. Mutations go straight to the store; the mirror only ever changes
//! when the store pushes a snapshot.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use farmsync::identity::IdentityProvider;
//! use farmsync::store::MemoryStore;
//! use farmsync::sync::FarmDataSync;
//! use farmsync::models::CropFormData;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = IdentityProvider::with_user("u1");
//! let farm = FarmDataSync::spawn(Arc::new(MemoryStore::new()), identity.subscribe());
//!
//! farm.add_crop(&CropFormData::new("Wheat", "Durum").with_farming_area(10.0)).await?;
//! let mirror = farm.settled().await;
//! println!("{}", mirror.summary);
//! # Ok(())
//! # }
//! ```

mod collection;
mod decode;
mod error;
mod farm;
mod inventory;
mod mirror;
mod synchronizer;

pub use collection::Collection;
pub use decode::{decode_snapshot, DecodeError, Decoded, Rejected};
pub use error::SyncError;
pub use farm::{Crops, FarmDataSync};
pub use inventory::{Inventory, InventorySync};
pub use mirror::{FarmMirror, InventoryMirror, Mirror};
pub use synchronizer::{MirrorOf, Synchronizer};
