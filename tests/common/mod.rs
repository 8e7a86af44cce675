#![allow(dead_code)]

use farmsync::models::CropFormData;
use farmsync::store::{KeyGenerator, RecordStore, Snapshot, StoreError, StorePath, Subscription};
use farmsync::sync::{Collection, MirrorOf, Synchronizer};
use serde_json::{Map, Value};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

pub const WAIT: Duration = Duration::from_secs(5);

/// A call made against a [`ScriptedStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Subscribe(String),
    CreateKey(String),
    Write(String, Value),
    Patch(String, Map<String, Value>),
    Delete(String),
}

pub type SnapshotSender = mpsc::UnboundedSender<Result<Snapshot, StoreError>>;

/// Store whose snapshots are pushed by the test, one channel per
/// subscription, and which records every call made to it.
#[derive(Default)]
pub struct ScriptedStore {
    calls: Mutex<Vec<Call>>,
    subscriptions: Mutex<Vec<(String, SnapshotSender)>>,
    keys: KeyGenerator,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Waits for the `n`th subscription (zero based) to be opened.
    pub async fn subscription(&self, n: usize) -> (String, SnapshotSender) {
        timeout(WAIT, async {
            loop {
                if let Some(found) = self.subscriptions.lock().unwrap().get(n).cloned() {
                    return found;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription was never opened")
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RecordStore for ScriptedStore {
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        self.record(Call::Subscribe(path.to_string()));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscriptions
            .lock()
            .unwrap()
            .push((path.to_string(), sender));
        Ok(Subscription::new(receiver))
    }

    fn create_key(&self, path: &StorePath) -> String {
        self.record(Call::CreateKey(path.to_string()));
        self.keys.next_key()
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.record(Call::Write(path.to_string(), value));
        Ok(())
    }

    async fn patch(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.record(Call::Patch(path.to_string(), fields));
        Ok(())
    }

    async fn delete(&self, path: &StorePath) -> Result<(), StoreError> {
        self.record(Call::Delete(path.to_string()));
        Ok(())
    }
}

/// Waits until the published mirror satisfies `done` and returns it.
pub async fn wait_for<C, S>(
    sync: &Synchronizer<C, S>,
    done: impl Fn(&MirrorOf<C>) -> bool,
) -> MirrorOf<C>
where
    C: Collection,
    S: RecordStore,
{
    let mut state = sync.watch();
    timeout(WAIT, async {
        loop {
            {
                let mirror = state.borrow_and_update();
                if done(&mirror) {
                    return mirror.clone();
                }
            }
            state
                .changed()
                .await
                .expect("synchronizer stopped publishing");
        }
    })
    .await
    .expect("mirror never reached the expected state")
}

pub fn crop(name: &str, area: f64, water: f64, yield_increase: f64) -> CropFormData {
    CropFormData::new(name, "Standard")
        .with_farming_area(area)
        .with_water_usage(water)
        .with_yield_increase(yield_increase)
        .with_planting_date("2024-03-01")
        .with_expected_harvest("2024-08-01")
        .with_health_score(80.0)
}

pub fn crop_json(name: &str, area: f64, water: f64, yield_increase: f64) -> Value {
    serde_json::to_value(crop(name, area, water, yield_increase)).unwrap()
}
