//! In-process record store.
//!
//! Holds the whole tree as one JSON object behind a lock and pushes full
//! subtree snapshots to every subscriber whose path overlaps a change.
//! Failure injection hooks let tests exercise the error paths callers see
//! from a real network store.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::key::KeyGenerator;
use super::path::StorePath;
use super::{RecordStore, Snapshot, StoreError, Subscription};

struct Subscriber {
    path: StorePath,
    sender: mpsc::UnboundedSender<Result<Snapshot, StoreError>>,
}

#[derive(Default)]
struct Inner {
    root: Map<String, Value>,
    subscribers: Vec<Subscriber>,
    write_failure: Option<StoreError>,
    subscribe_failure: Option<StoreError>,
}

/// In-memory [`RecordStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    keys: KeyGenerator,
    operations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value at `path`.
    pub async fn get(&self, path: &StorePath) -> Snapshot {
        let inner = self.inner.read().await;
        lookup(&inner.root, path).cloned()
    }

    /// Number of subscribe, key, write, patch and delete calls made so far.
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Live subscriptions whose receiving side has not been dropped.
    pub async fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.write().await;
        inner.subscribers.retain(|s| !s.sender.is_closed());
        inner.subscribers.len()
    }

    /// Makes every write, patch and delete fail with `error` until cleared.
    pub async fn fail_writes(&self, error: Option<StoreError>) {
        self.inner.write().await.write_failure = error;
    }

    /// Makes every new subscription fail with `error` until cleared.
    pub async fn fail_subscriptions(&self, error: Option<StoreError>) {
        self.inner.write().await.subscribe_failure = error;
    }

    /// Ends every live subscription with `error`, as a dropped connection would.
    pub async fn disconnect(&self, error: StoreError) {
        let mut inner = self.inner.write().await;
        for subscriber in inner.subscribers.drain(..) {
            let _ = subscriber.sender.send(Err(error.clone()));
        }
    }

    fn count(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }

    async fn mutate(
        &self,
        path: &StorePath,
        apply: impl FnOnce(&mut Map<String, Value>),
    ) -> Result<(), StoreError> {
        self.count();
        let mut inner = self.inner.write().await;
        if let Some(error) = &inner.write_failure {
            return Err(error.clone());
        }

        apply(&mut inner.root);
        notify(&mut inner, path);
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        self.count();
        let mut inner = self.inner.write().await;
        if let Some(error) = &inner.subscribe_failure {
            return Err(error.clone());
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(Ok(lookup(&inner.root, path).cloned()));
        inner.subscribers.push(Subscriber {
            path: path.clone(),
            sender,
        });
        debug!(%path, "memory subscription opened");

        Ok(Subscription::new(receiver))
    }

    fn create_key(&self, _path: &StorePath) -> String {
        self.count();
        self.keys.next_key()
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.mutate(path, |root| set(root, path.segments(), value))
            .await
    }

    async fn patch(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        for field in fields.keys() {
            path.child(field)?;
        }
        self.mutate(path, |root| {
            for (field, value) in fields {
                let mut segments = path.segments().to_vec();
                segments.push(field);
                set(root, &segments, value);
            }
        })
        .await
    }

    async fn delete(&self, path: &StorePath) -> Result<(), StoreError> {
        self.mutate(path, |root| set(root, path.segments(), Value::Null))
            .await
    }
}

/// Pushes fresh snapshots to every subscriber affected by a change at `changed`.
fn notify(inner: &mut Inner, changed: &StorePath) {
    let root = &inner.root;
    inner.subscribers.retain(|subscriber| {
        if !subscriber.path.overlaps(changed) {
            return !subscriber.sender.is_closed();
        }
        let snapshot = lookup(root, &subscriber.path).cloned();
        subscriber.sender.send(Ok(snapshot)).is_ok()
    });
}

fn lookup<'a>(root: &'a Map<String, Value>, path: &StorePath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut node = root.get(first)?;
    for segment in rest {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

/// Sets the value at `segments`, creating intermediate objects. `null`
/// removes the node and prunes parents left empty.
fn set(node: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        match value {
            Value::Null => {
                node.remove(first);
            }
            Value::Object(ref map) if map.is_empty() => {
                node.remove(first);
            }
            value => {
                node.insert(first.clone(), value);
            }
        }
        return;
    }

    if value.is_null() && !node.get(first).is_some_and(Value::is_object) {
        return;
    }

    let child = node
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    let now_empty = match child {
        Value::Object(map) => {
            set(map, rest, value);
            map.is_empty()
        }
        _ => false,
    };
    if now_empty {
        node.remove(first);
    }
}
