//! Remote record store abstraction.
//!
//! The store is a tree of JSON values addressed by slash-separated paths.
//! Clients can subscribe to a subtree and receive its full value every time
//! anything beneath it changes, generate keys for new children, and write,
//! patch or delete values.
//!
//! Two implementations live here:
//! - [`MemoryStore`]: an in-process tree, used in tests and local tooling.
//! - [`RemoteStore`]: a WebSocket client for `farmsync-server`.

mod key;
mod memory;
mod path;
mod remote;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use tokio::sync::mpsc;

pub use key::{KeyGenerator, KEY_LEN};
pub use memory::MemoryStore;
pub use path::StorePath;
pub use remote::RemoteStore;

/// Full value of a subtree at one point in time; `None` when nothing is stored.
pub type Snapshot = Option<Value>;

/// Broad category of a store failure, as reported over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    Transport,
    PermissionDenied,
    MalformedPath,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::Transport => write!(f, "transport"),
            StoreErrorKind::PermissionDenied => write!(f, "permission_denied"),
            StoreErrorKind::MalformedPath => write!(f, "malformed_path"),
        }
    }
}

/// Errors surfaced by a record store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network or storage failure; the operation may or may not have applied.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The caller may not read or write the path.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The path is not a valid location.
    #[error("Malformed path: {0}")]
    MalformedPath(String),
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            StoreErrorKind::Transport => StoreError::Transport(message),
            StoreErrorKind::PermissionDenied => StoreError::PermissionDenied(message),
            StoreErrorKind::MalformedPath => StoreError::MalformedPath(message),
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Transport(_) => StoreErrorKind::Transport,
            StoreError::PermissionDenied(_) => StoreErrorKind::PermissionDenied,
            StoreError::MalformedPath(_) => StoreErrorKind::MalformedPath,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StoreError::Transport(m)
            | StoreError::PermissionDenied(m)
            | StoreError::MalformedPath(m) => m,
        }
    }
}

/// A live subscription to one subtree.
///
/// Yields the subtree's value once right after subscribing and again after
/// every change. An `Err` item ends the subscription. Dropping the
/// subscription cancels it at the store.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>) -> Self {
        Self {
            receiver,
            on_cancel: None,
        }
    }

    /// Runs `cancel` when the subscription is dropped.
    pub fn with_cancel(mut self, cancel: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(cancel));
        self
    }

    /// Next snapshot, or `None` once the store has closed the subscription.
    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.on_cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancellable", &self.on_cancel.is_some())
            .finish()
    }
}

/// A tree-shaped record store with live subscriptions.
pub trait RecordStore: Send + Sync + 'static {
    /// Subscribes to the subtree at `path`.
    fn subscribe(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Generates a unique child key under `path` without writing anything.
    fn create_key(&self, path: &StorePath) -> String;

    /// Replaces the value at `path`. Writing `null` deletes it.
    fn write(
        &self,
        path: &StorePath,
        value: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Merges `fields` into the value at `path`; `null` fields are removed.
    fn patch(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes the value at `path`. Succeeds if nothing is there.
    fn delete(&self, path: &StorePath) -> impl Future<Output = Result<(), StoreError>> + Send;
}
