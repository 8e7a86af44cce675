mod common;

use common::{crop, crop_json, wait_for, Call, ScriptedStore};
use farmsync::identity::{IdentityProvider, UserId};
use farmsync::models::{Condition, CropStatus, FarmStats, InventoryFormData};
use farmsync::store::{MemoryStore, RecordStore, StoreError, StoreErrorKind, StorePath};
use farmsync::sync::{FarmDataSync, InventorySync, SyncError};
use serde_json::json;
use std::sync::Arc;

fn crops_path(user: &str) -> StorePath {
    StorePath::parse(&format!("users/{}/crops", user)).unwrap()
}

#[tokio::test]
async fn test_starts_unbound_without_identity() {
    let store = Arc::new(MemoryStore::new());
    let identity = IdentityProvider::new();
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());

    let mirror = farm.state();
    assert!(mirror.records.is_empty());
    assert!(!mirror.loading);
    assert_eq!(mirror.identity, None);
    assert_eq!(farm.statistics(), FarmStats::default());
    assert_eq!(store.operation_count(), 0);
}

#[tokio::test]
async fn test_loading_until_first_snapshot() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());

    // Bound synchronously at spawn
    assert!(farm.loading());
    assert!(farm.crops().is_empty());

    let (path, sender) = store.subscription(0).await;
    assert_eq!(path, "users/u1/crops");

    sender.send(Ok(None)).unwrap();
    let mirror = wait_for(&farm, |m| !m.loading).await;
    assert!(mirror.records.is_empty());
    assert_eq!(mirror.identity, Some(UserId::new("u1")));
    assert_eq!(mirror.summary, FarmStats::default());
}

#[tokio::test]
async fn test_same_snapshot_twice_gives_same_state() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    let (_, sender) = store.subscription(0).await;

    let snapshot = json!({
        "k1": crop_json("Wheat", 10.0, 100.0, 12.0),
        "k2": crop_json("Corn", 5.25, 50.0, 8.0)
    });

    sender.send(Ok(Some(snapshot.clone()))).unwrap();
    let first = wait_for(&farm, |m| m.records.len() == 2).await;

    let mut state = farm.watch();
    state.borrow_and_update();
    sender.send(Ok(Some(snapshot))).unwrap();
    state.changed().await.unwrap();
    let second = state.borrow().clone();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_statistics_follow_records() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    let (_, sender) = store.subscription(0).await;

    sender
        .send(Ok(Some(json!({
            "a": crop_json("Wheat", 10.0, 100.0, 12.0),
            "b": crop_json("Corn", 5.25, 50.5, 8.0),
            "c": crop_json("Fallow", 0.0, 0.0, 0.0)
        }))))
        .unwrap();
    wait_for(&farm, |m| m.records.len() == 3).await;

    let stats = farm.statistics();
    assert_eq!(stats.total_crops, 3);
    assert_eq!(stats.total_farm_area, 15.3);
    assert_eq!(stats.total_water_usage, 150.5);
    assert_eq!(stats.avg_yield_increase, 6.7);

    // Replacing the list recomputes everything
    sender.send(Ok(None)).unwrap();
    wait_for(&farm, |m| m.records.is_empty()).await;
    assert_eq!(farm.statistics(), FarmStats::default());
}

#[tokio::test]
async fn test_records_are_in_key_order() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    let (_, sender) = store.subscription(0).await;

    sender
        .send(Ok(Some(json!({
            "-Nb": crop_json("Second", 1.0, 0.0, 0.0),
            "-Na": crop_json("First", 1.0, 0.0, 0.0)
        }))))
        .unwrap();
    let mirror = wait_for(&farm, |m| m.records.len() == 2).await;

    let names: Vec<&str> = mirror.records.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["First", "Second"]);
}

#[tokio::test]
async fn test_identity_switch_discards_stale_snapshots() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());

    let (_, u1_sender) = store.subscription(0).await;
    u1_sender
        .send(Ok(Some(json!({"a": crop_json("Wheat", 10.0, 0.0, 0.0)}))))
        .unwrap();
    wait_for(&farm, |m| m.records.len() == 1).await;

    identity.sign_in("u2");
    let (u2_path, u2_sender) = store.subscription(1).await;
    assert_eq!(u2_path, "users/u2/crops");
    // u1's subscription is gone before u2's is opened
    assert!(u1_sender.is_closed());

    let loading = wait_for(&farm, |m| m.identity == Some(UserId::new("u2"))).await;
    assert!(loading.records.is_empty());

    // A late u1 snapshot cannot reach the mirror
    let _ = u1_sender.send(Ok(Some(json!({"x": crop_json("Stale", 99.0, 0.0, 0.0)}))));
    u2_sender
        .send(Ok(Some(json!({"b": crop_json("Rice", 2.0, 0.0, 0.0)}))))
        .unwrap();

    let mirror = wait_for(&farm, |m| !m.loading && m.records.len() == 1).await;
    assert_eq!(mirror.records[0].name, "Rice");
    assert_eq!(mirror.identity, Some(UserId::new("u2")));
    assert_eq!(mirror.summary.total_farm_area, 2.0);
}

#[tokio::test]
async fn test_sign_out_clears_mirror() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    let (_, sender) = store.subscription(0).await;
    sender
        .send(Ok(Some(json!({"a": crop_json("Wheat", 10.0, 0.0, 0.0)}))))
        .unwrap();
    wait_for(&farm, |m| m.records.len() == 1).await;

    identity.sign_out();
    let mirror = wait_for(&farm, |m| m.identity.is_none()).await;
    assert!(mirror.records.is_empty());
    assert!(!mirror.loading);
    assert_eq!(mirror.summary, FarmStats::default());

    // The subscription was cancelled
    let cancelled = tokio::time::timeout(common::WAIT, async {
        while !sender.is_closed() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(cancelled.is_ok());
}

#[tokio::test]
async fn test_mutations_without_identity_never_reach_the_store() {
    let store = Arc::new(MemoryStore::new());
    let identity = IdentityProvider::new();
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    let inventory = InventorySync::spawn(Arc::clone(&store), identity.subscribe());

    let wheat = crop("Wheat", 10.0, 0.0, 0.0);
    assert_eq!(farm.add_crop(&wheat).await, Err(SyncError::Unauthenticated));
    assert_eq!(
        farm.update_crop("k1", &wheat).await,
        Err(SyncError::Unauthenticated)
    );
    assert_eq!(farm.delete_crop("k1").await, Err(SyncError::Unauthenticated));
    assert_eq!(
        inventory
            .add_inventory_item(&InventoryFormData::new("Wheat", 10.0))
            .await,
        Err(SyncError::Unauthenticated)
    );

    assert_eq!(store.operation_count(), 0);
}

#[tokio::test]
async fn test_add_and_delete_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    farm.settled().await;

    let id = farm
        .add_crop(&crop("Wheat", 10.0, 100.0, 12.0))
        .await
        .unwrap();
    let mirror = wait_for(&farm, |m| m.records.len() == 1).await;
    assert_eq!(mirror.records[0].id, id);
    assert_eq!(mirror.records[0].name, "Wheat");

    farm.delete_crop(&id).await.unwrap();
    let mirror = wait_for(&farm, |m| m.records.is_empty()).await;
    assert_eq!(mirror.summary.total_crops, 0);
    assert_eq!(store.get(&crops_path("u1")).await, None);
}

#[tokio::test]
async fn test_wheat_scenario_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let identity = IdentityProvider::new();
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());

    identity.sign_in("u1");
    let wheat = crop("Wheat", 10.0, 120.0, 12.0).with_status(CropStatus::Growing);
    let id = farm.add_crop(&wheat).await.unwrap();

    let mirror = wait_for(&farm, |m| m.records.len() == 1).await;
    assert_eq!(mirror.records[0].id, id);
    assert_eq!(mirror.records[0].data, wheat);
    assert_eq!(mirror.summary.total_crops, 1);
    assert_eq!(mirror.summary.total_farm_area, 10.0);
    assert_eq!(mirror.summary.avg_yield_increase, 12.0);

    let stored = store
        .get(&crops_path("u1").child(&id).unwrap())
        .await
        .unwrap();
    assert_eq!(stored["name"], "Wheat");
    assert_eq!(stored["farmingArea"], 10.0);
}

#[tokio::test]
async fn test_update_patches_fields_without_touching_mirror() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    store.subscription(0).await;

    let before = farm.state();
    farm.update_crop("k1", &crop("Wheat", 12.0, 0.0, 0.0))
        .await
        .unwrap();
    assert_eq!(farm.state(), before);

    let calls = store.calls();
    let Some(Call::Patch(path, fields)) = calls.last() else {
        panic!("expected a patch, got {:?}", calls);
    };
    assert_eq!(path, "users/u1/crops/k1");
    assert_eq!(fields["farmingArea"], 12.0);
    assert_eq!(fields["name"], "Wheat");
}

#[tokio::test]
async fn test_add_writes_under_generated_key() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let inventory = InventorySync::spawn(Arc::clone(&store), identity.subscribe());

    let item = InventoryFormData::new("Wheat", 500.0)
        .with_ready_to_sell(200.0)
        .with_condition(Condition::Premium);
    let id = inventory.add_inventory_item(&item).await.unwrap();

    let calls = store.calls();
    assert!(calls.contains(&Call::CreateKey("users/u1/inventory".into())));
    assert!(calls.contains(&Call::Write(
        format!("users/u1/inventory/{}", id),
        serde_json::to_value(&item).unwrap()
    )));
}

#[tokio::test]
async fn test_store_failures_propagate_with_kind() {
    let store = Arc::new(MemoryStore::new());
    store
        .fail_writes(Some(StoreError::PermissionDenied("rules".into())))
        .await;
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());

    let err = farm
        .add_crop(&crop("Wheat", 1.0, 0.0, 0.0))
        .await
        .unwrap_err();
    assert_eq!(err.store_kind(), Some(StoreErrorKind::PermissionDenied));

    let err = farm.delete_crop("bad.key").await.unwrap_err();
    assert_eq!(err.store_kind(), Some(StoreErrorKind::MalformedPath));
}

#[tokio::test]
async fn test_subscription_failure_empties_mirror() {
    let store = Arc::new(MemoryStore::new());
    store
        .write(
            &crops_path("u1").child("a").unwrap(),
            crop_json("Wheat", 1.0, 0.0, 0.0),
        )
        .await
        .unwrap();
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    wait_for(&farm, |m| m.records.len() == 1).await;

    store
        .disconnect(StoreError::Transport("connection reset".into()))
        .await;

    let mirror = wait_for(&farm, |m| m.error.is_some()).await;
    assert!(mirror.records.is_empty());
    assert!(!mirror.loading);
    assert_eq!(mirror.identity, Some(UserId::new("u1")));
    assert!(mirror.error.unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_rejected_subscription_reports_error() {
    let store = Arc::new(MemoryStore::new());
    store
        .fail_subscriptions(Some(StoreError::PermissionDenied("rules".into())))
        .await;
    let identity = IdentityProvider::with_user("u1");
    let inventory = InventorySync::spawn(Arc::clone(&store), identity.subscribe());

    let mirror = inventory.settled().await;
    assert!(mirror.records.is_empty());
    assert!(mirror.error.is_some());
}

#[tokio::test]
async fn test_malformed_snapshots_fail_closed() {
    let store = Arc::new(ScriptedStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    let (_, sender) = store.subscription(0).await;

    sender
        .send(Ok(Some(json!({
            "good": crop_json("Wheat", 10.0, 0.0, 0.0),
            "bad": {"name": 42}
        }))))
        .unwrap();
    let mirror = wait_for(&farm, |m| !m.loading).await;
    assert_eq!(mirror.records.len(), 1);
    assert_eq!(mirror.rejected.len(), 1);
    assert_eq!(mirror.rejected[0].id, "bad");
    assert_eq!(mirror.summary.total_crops, 1);

    sender.send(Ok(Some(json!("garbage")))).unwrap();
    let mirror = wait_for(&farm, |m| m.error.is_some()).await;
    assert!(mirror.records.is_empty());
    assert_eq!(mirror.summary, FarmStats::default());
}

#[tokio::test]
async fn test_collections_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    let inventory = InventorySync::spawn(Arc::clone(&store), identity.subscribe());

    inventory
        .add_inventory_item(&InventoryFormData::new("Wheat", 500.0))
        .await
        .unwrap();
    wait_for(&inventory, |m| m.records.len() == 1).await;

    let crops = farm.settled().await;
    assert!(crops.records.is_empty());
    assert_eq!(inventory.inventory()[0].crop, "Wheat");
}

#[tokio::test]
async fn test_shutdown_publishes_unbound_and_cancels() {
    let store = Arc::new(MemoryStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    farm.settled().await;
    assert_eq!(store.subscriber_count().await, 1);

    let state = farm.watch();
    farm.shutdown().await;

    let last = state.borrow().clone();
    assert!(last.identity.is_none());
    assert!(last.records.is_empty());
    assert_eq!(store.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_dropped_identity_provider_stops_synchronizer() {
    let store = Arc::new(MemoryStore::new());
    let identity = IdentityProvider::with_user("u1");
    let farm = FarmDataSync::spawn(Arc::clone(&store), identity.subscribe());
    farm.settled().await;

    drop(identity);

    let mirror = wait_for(&farm, |m| m.identity.is_none()).await;
    assert!(mirror.records.is_empty());
    assert!(!mirror.loading);
}
