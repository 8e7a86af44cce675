//! The synchronizer actor.
//!
//! One task owns the mirror. It listens to identity changes and to snapshot
//! events forwarded from the current subscription, and is the only writer of
//! the published state. Each identity change starts a new epoch: the previous
//! forwarder is aborted (dropping its subscription, which cancels it at the
//! store) before the next one subscribes, and any event still carrying an
//! old epoch is discarded.

use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::collection::Collection;
use super::decode::decode_snapshot;
use super::error::SyncError;
use super::mirror::Mirror;
use crate::identity::UserId;
use crate::models::Record;
use crate::store::{RecordStore, Snapshot, StoreError, StorePath};

/// Mirror type published by a synchronizer over collection `C`.
pub type MirrorOf<C> = Mirror<<C as Collection>::Form, <C as Collection>::Summary>;

struct Event {
    epoch: u64,
    snapshot: Result<Snapshot, StoreError>,
}

/// Keeps a live mirror of one per-user collection.
///
/// Must be created inside a tokio runtime. Dropping it stops the background
/// task, which cancels the subscription and publishes a final unbound state.
pub struct Synchronizer<C: Collection, S: RecordStore> {
    store: Arc<S>,
    identity: watch::Receiver<Option<UserId>>,
    state: watch::Receiver<MirrorOf<C>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<C: Collection, S: RecordStore> Synchronizer<C, S> {
    /// Starts mirroring `users/{uid}/{C::SEGMENT}` for whoever `identity`
    /// names, following it as it changes.
    pub fn spawn(store: Arc<S>, identity: watch::Receiver<Option<UserId>>) -> Self {
        let (state_tx, state) = watch::channel(Mirror::unbound(0, C::summarize(&[])));
        let (events_tx, events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let mut worker = Worker::<C, S> {
            store: Arc::clone(&store),
            state: state_tx,
            events: events_tx,
            epoch: 0,
            bound: None,
            forwarder: None,
            _collection: PhantomData,
        };

        // Bind synchronously so the first published state already reflects
        // the current identity.
        let mut identity_rx = identity.clone();
        let initial = identity_rx.borrow_and_update().clone();
        worker.rebind(initial);

        let task = tokio::spawn(worker.run(identity_rx, events, shutdown_rx));

        Self {
            store,
            identity,
            state,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Current published state.
    pub fn state(&self) -> MirrorOf<C> {
        self.state.borrow().clone()
    }

    pub fn records(&self) -> Vec<Record<C::Form>> {
        self.state.borrow().records.clone()
    }

    pub fn summary(&self) -> C::Summary {
        self.state.borrow().summary.clone()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// A receiver woken on every published state.
    pub fn watch(&self) -> watch::Receiver<MirrorOf<C>> {
        self.state.clone()
    }

    /// Waits until the mirror belongs to the current identity and is no
    /// longer loading, then returns it.
    pub async fn settled(&self) -> MirrorOf<C> {
        let mut state = self.state.clone();
        let mut identity = self.identity.clone();
        let mut identity_open = true;

        loop {
            let target = identity.borrow_and_update().clone();
            {
                let mirror = state.borrow_and_update();
                if mirror.identity == target && !mirror.loading {
                    return mirror.clone();
                }
            }

            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() {
                        return state.borrow().clone();
                    }
                }
                changed = identity.changed(), if identity_open => {
                    if changed.is_err() {
                        identity_open = false;
                    }
                }
            }
        }
    }

    /// Creates a record under a fresh store key and returns the key.
    ///
    /// Resolves once the store acknowledges the write. The mirror picks the
    /// record up from the snapshot that follows.
    pub async fn add(&self, form: &C::Form) -> Result<String, SyncError> {
        let collection = self.collection_path()?;
        let value = serde_json::to_value(form).map_err(|e| SyncError::Encode(e.to_string()))?;
        let key = self.store.create_key(&collection);
        let path = collection.child(&key)?;

        self.store.write(&path, value).await?;
        debug!(collection = C::SEGMENT, %key, "record added");
        Ok(key)
    }

    /// Merges the fields of `form` into the record stored under `id`.
    ///
    /// Nothing checks that the record exists locally.
    pub async fn update(&self, id: &str, form: &C::Form) -> Result<(), SyncError> {
        let path = self.collection_path()?.child(id)?;
        let fields = match serde_json::to_value(form) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => {
                return Err(SyncError::Encode(
                    "record did not encode to an object".to_string(),
                ))
            }
            Err(e) => return Err(SyncError::Encode(e.to_string())),
        };

        self.store.patch(&path, fields).await?;
        debug!(collection = C::SEGMENT, id, "record updated");
        Ok(())
    }

    /// Deletes the record stored under `id`.
    pub async fn remove(&self, id: &str) -> Result<(), SyncError> {
        let path = self.collection_path()?.child(id)?;
        self.store.delete(&path).await?;
        debug!(collection = C::SEGMENT, id, "record deleted");
        Ok(())
    }

    /// Stops the task and waits for it to publish its final state.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// `users/{uid}/{segment}` for the identity at call time.
    fn collection_path(&self) -> Result<StorePath, SyncError> {
        let user = self
            .identity
            .borrow()
            .clone()
            .ok_or(SyncError::Unauthenticated)?;
        Ok(StorePath::collection(user.as_str(), C::SEGMENT)?)
    }
}

impl<C: Collection, S: RecordStore> Drop for Synchronizer<C, S> {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

struct Worker<C: Collection, S: RecordStore> {
    store: Arc<S>,
    state: watch::Sender<MirrorOf<C>>,
    events: mpsc::UnboundedSender<Event>,
    epoch: u64,
    bound: Option<UserId>,
    /// Forwarder of the current epoch. After unbinding this is the aborted
    /// forwarder of the previous epoch, so the next bind can wait for it.
    forwarder: Option<JoinHandle<()>>,
    _collection: PhantomData<C>,
}

impl<C: Collection, S: RecordStore> Worker<C, S> {
    async fn run(
        mut self,
        mut identity: watch::Receiver<Option<UserId>>,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!(collection = C::SEGMENT, "synchronizer shutting down");
                    break;
                }
                changed = identity.changed() => {
                    if changed.is_err() {
                        debug!(collection = C::SEGMENT, "identity provider dropped");
                        break;
                    }
                    let next = identity.borrow_and_update().clone();
                    self.rebind(next);
                }
                Some(event) = events.recv() => self.apply(event),
            }
        }

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            let _ = forwarder.await;
        }
        if self.bound.take().is_some() {
            info!(collection = C::SEGMENT, "unbound");
        }
        self.epoch += 1;
        self.publish(Mirror::unbound(self.epoch, C::summarize(&[])));
    }

    fn rebind(&mut self, next: Option<UserId>) {
        if next == self.bound {
            return;
        }

        let previous = self.forwarder.take();
        if let Some(previous) = &previous {
            previous.abort();
        }
        self.epoch += 1;
        self.bound = next.clone();
        let epoch = self.epoch;

        let Some(user) = next else {
            info!(collection = C::SEGMENT, epoch, "unbound");
            self.forwarder = previous;
            self.publish(Mirror::unbound(epoch, C::summarize(&[])));
            return;
        };

        let path = match StorePath::collection(user.as_str(), C::SEGMENT) {
            Ok(path) => path,
            Err(e) => {
                warn!(collection = C::SEGMENT, user = %user, error = %e, "cannot bind");
                self.forwarder = previous;
                self.publish(Mirror::failed(user, epoch, C::summarize(&[]), e.to_string()));
                return;
            }
        };

        info!(collection = C::SEGMENT, user = %user, epoch, "binding");
        self.publish(Mirror::loading(user, epoch, C::summarize(&[])));
        self.forwarder = Some(tokio::spawn(forward(
            Arc::clone(&self.store),
            path,
            epoch,
            self.events.clone(),
            previous,
        )));
    }

    fn apply(&mut self, event: Event) {
        if event.epoch != self.epoch {
            debug!(
                collection = C::SEGMENT,
                stale = event.epoch,
                current = self.epoch,
                "discarding stale snapshot"
            );
            return;
        }
        let Some(user) = self.bound.clone() else {
            return;
        };

        let snapshot = match event.snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(collection = C::SEGMENT, user = %user, error = %e, "subscription failed");
                self.publish(Mirror::failed(user, self.epoch, C::summarize(&[]), e.to_string()));
                return;
            }
        };

        let decoded = match decode_snapshot::<C::Form>(snapshot) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(collection = C::SEGMENT, user = %user, error = %e, "snapshot rejected");
                self.publish(Mirror::failed(user, self.epoch, C::summarize(&[]), e.to_string()));
                return;
            }
        };

        for rejected in &decoded.rejected {
            warn!(
                collection = C::SEGMENT,
                id = %rejected.id,
                reason = %rejected.reason,
                "dropping malformed record"
            );
        }
        debug!(
            collection = C::SEGMENT,
            epoch = self.epoch,
            records = decoded.records.len(),
            "snapshot applied"
        );

        let summary = C::summarize(&decoded.records);
        self.publish(Mirror {
            records: decoded.records,
            loading: false,
            identity: Some(user),
            epoch: self.epoch,
            summary,
            rejected: decoded.rejected,
            error: None,
        });
    }

    fn publish(&self, mirror: MirrorOf<C>) {
        self.state.send_replace(mirror);
    }
}

/// Subscribes to `path` and forwards its snapshots tagged with `epoch`.
///
/// Waits for the previous epoch's forwarder to be gone first, so its
/// subscription is cancelled before this one is opened. Stops after the
/// first error.
async fn forward<S: RecordStore>(
    store: Arc<S>,
    path: StorePath,
    epoch: u64,
    events: mpsc::UnboundedSender<Event>,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        previous.abort();
        let _ = previous.await;
    }

    let mut subscription = match store.subscribe(&path).await {
        Ok(subscription) => subscription,
        Err(e) => {
            let _ = events.send(Event {
                epoch,
                snapshot: Err(e),
            });
            return;
        }
    };
    debug!(%path, epoch, "subscribed");

    loop {
        let snapshot = subscription.next().await.unwrap_or_else(|| {
            Err(StoreError::Transport(
                "Subscription closed by the store".to_string(),
            ))
        });
        let failed = snapshot.is_err();
        if events.send(Event { epoch, snapshot }).is_err() || failed {
            break;
        }
    }
}
