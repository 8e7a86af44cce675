use crate::store::{StoreError, StoreErrorKind};

/// Errors returned by synchronizer mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// No user is signed in. Nothing was sent to the store.
    #[error("User is not logged in")]
    Unauthenticated,
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The form data did not serialize to a JSON object.
    #[error("Failed to encode record: {0}")]
    Encode(String),
}

impl SyncError {
    /// Kind of the underlying store failure, if this is one.
    pub fn store_kind(&self) -> Option<StoreErrorKind> {
        match self {
            SyncError::Store(e) => Some(e.kind()),
            _ => None,
        }
    }
}
