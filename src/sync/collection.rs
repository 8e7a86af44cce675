use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use crate::models::Record;

/// A per-user collection a [`Synchronizer`](super::Synchronizer) can mirror.
///
/// Implementors are markers: they name where the collection lives under
/// `users/{uid}/`, what its records look like, and what gets derived from
/// the record list every time it is replaced.
pub trait Collection: Send + Sync + 'static {
    /// Path segment under `users/{uid}/`.
    const SEGMENT: &'static str;

    type Form: Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static;

    type Summary: Clone + Default + Debug + PartialEq + Send + Sync + 'static;

    /// Derives the summary from a full record list. Must be pure.
    fn summarize(records: &[Record<Self::Form>]) -> Self::Summary;
}
