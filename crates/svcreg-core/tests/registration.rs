//! Registration against the in-memory lease store, in virtual time.

use std::time::Duration;
use svcreg_core::{
    AdvertisedValue, LeaseId, LeaseManager, ManagerConfig, MemoryLeaseStore, Phase,
    Registrar, RegistrationError, ServiceNamespace,
};

fn hello() -> ServiceNamespace {
    ServiceNamespace::new("Hello").unwrap()
}

fn addr() -> AdvertisedValue {
    AdvertisedValue::from_host_port("remote_host", 1234)
}

#[tokio::test(start_paused = true)]
async fn test_instance_visible_under_namespace() {
    let store = MemoryLeaseStore::with_first_lease_id(42);
    let registrar = Registrar::new(store.clone(), ManagerConfig::default());
    let handle = registrar.spawn(hello(), addr());

    handle
        .subscribe()
        .wait_for(|s| s.is_registered())
        .await
        .unwrap();

    assert_eq!(
        store.list_prefix("Hello/"),
        vec![("Hello/42".to_string(), "remote_host:1234".to_string())]
    );

    // Outlives several TTLs because renewals keep landing
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(store.get("Hello/42").as_deref(), Some("remote_host:1234"));
    let status = handle.status();
    assert_eq!(status.generation, 1);
    assert!(status.renewals >= 30);
    assert!(store.time_to_live(LeaseId::new(42)).unwrap() > Duration::from_secs(8));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_external_revoke_triggers_new_key() {
    let store = MemoryLeaseStore::with_first_lease_id(42);
    let handle = Registrar::new(store.clone(), ManagerConfig::default()).spawn(hello(), addr());
    let mut status_rx = handle.subscribe();
    status_rx.wait_for(|s| s.is_registered()).await.unwrap();

    assert!(store.revoke_externally(LeaseId::new(42)));
    assert!(store.list_prefix("Hello/").is_empty());

    let status = status_rx
        .wait_for(|s| s.generation == 2 && s.is_registered())
        .await
        .unwrap()
        .clone();
    assert_eq!(status.lease_id, LeaseId::new(43));
    assert_eq!(
        store.list_prefix("Hello/"),
        vec![("Hello/43".to_string(), "remote_host:1234".to_string())]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_partition_outlasting_ttl() {
    let store = MemoryLeaseStore::with_first_lease_id(1);
    let handle = Registrar::new(store.clone(), ManagerConfig::default()).spawn(hello(), addr());
    let mut status_rx = handle.subscribe();
    status_rx.wait_for(|s| s.is_registered()).await.unwrap();

    store.set_unreachable(true);
    tokio::time::sleep(Duration::from_secs(15)).await;

    // Renewals failed but the manager kept the lease and kept running
    let status = handle.status();
    assert_eq!(status.phase, Phase::Registered);
    assert_eq!(status.lease_id, LeaseId::new(1));
    assert!(status.consecutive_failures >= 10);
    assert!(store.list_prefix("Hello/").is_empty());

    store.set_unreachable(false);
    let status = status_rx
        .wait_for(|s| s.generation == 2 && s.is_registered())
        .await
        .unwrap()
        .clone();
    assert_eq!(status.lease_id, LeaseId::new(2));
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(
        store.list_prefix("Hello/"),
        vec![("Hello/2".to_string(), "remote_host:1234".to_string())]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_short_partition_keeps_same_key() {
    let store = MemoryLeaseStore::with_first_lease_id(1);
    let handle = Registrar::new(store.clone(), ManagerConfig::default()).spawn(hello(), addr());
    handle
        .subscribe()
        .wait_for(|s| s.is_registered())
        .await
        .unwrap();

    store.set_unreachable(true);
    tokio::time::sleep(Duration::from_secs(4)).await;
    store.set_unreachable(false);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = handle.status();
    assert_eq!(status.generation, 1);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(store.get("Hello/1").as_deref(), Some("remote_host:1234"));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_removes_key_immediately() {
    let store = MemoryLeaseStore::new();
    let handle = Registrar::new(store.clone(), ManagerConfig::default()).spawn(hello(), addr());
    handle
        .subscribe()
        .wait_for(|s| s.is_registered())
        .await
        .unwrap();
    assert_eq!(store.list_prefix("Hello/").len(), 1);

    let mut status_rx = handle.subscribe();
    handle.shutdown().await.unwrap();

    assert!(store.list_prefix("Hello/").is_empty());
    assert_eq!(store.live_lease_count(), 0);
    assert_eq!(status_rx.borrow_and_update().phase, Phase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_registration() {
    let store = MemoryLeaseStore::new();
    let handle = Registrar::new(store.clone(), ManagerConfig::default()).spawn(hello(), addr());
    let mut status_rx = handle.subscribe();
    status_rx.wait_for(|s| s.is_registered()).await.unwrap();

    drop(handle);
    status_rx
        .wait_for(|s| s.phase == Phase::Stopped)
        .await
        .unwrap();
    assert!(store.list_prefix("Hello/").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_crashed_instance_expires_after_ttl() {
    let store = MemoryLeaseStore::new();
    let manager = LeaseManager::new(store.clone(), ManagerConfig::default());
    let mut status_rx = manager.subscribe();
    let task = tokio::spawn(manager.run(hello(), addr()));
    status_rx.wait_for(|s| s.is_registered()).await.unwrap();

    // Abort skips the revoke, like a killed process
    task.abort();
    let _ = task.await;
    assert_eq!(store.list_prefix("Hello/").len(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(store.list_prefix("Hello/").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_services_share_store_with_disjoint_keys() {
    let store = MemoryLeaseStore::new();
    let registrar = Registrar::new(store.clone(), ManagerConfig::default());
    let hello_handle = registrar.spawn(hello(), addr());
    let echo_handle = registrar.spawn(
        ServiceNamespace::new("Echo/").unwrap(),
        AdvertisedValue::new("remote_host:4321"),
    );

    hello_handle
        .subscribe()
        .wait_for(|s| s.is_registered())
        .await
        .unwrap();
    echo_handle
        .subscribe()
        .wait_for(|s| s.is_registered())
        .await
        .unwrap();

    assert_eq!(store.list_prefix("Hello/").len(), 1);
    assert_eq!(store.list_prefix("Echo/").len(), 1);
    assert_ne!(
        hello_handle.status().lease_id,
        echo_handle.status().lease_id
    );

    hello_handle.shutdown().await.unwrap();
    assert!(store.list_prefix("Hello/").is_empty());
    assert_eq!(store.list_prefix("Echo/").len(), 1);

    echo_handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_fails_registration() {
    let store = MemoryLeaseStore::new();
    store.set_unreachable(true);

    let mut handle = Registrar::new(store.clone(), ManagerConfig::default()).spawn(hello(), addr());
    let result = handle.wait().await;

    match result {
        Err(RegistrationError::LeaseGrantFailed(source)) => assert!(source.is_unavailable()),
        other => panic!("expected grant failure, got {other:?}"),
    }
    assert_eq!(handle.status().phase, Phase::Failed);
    // Already reaped
    assert!(handle.shutdown().await.is_ok());
}
