//! Tests for the background drain worker.

use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tallysync_engine::{
    Connectivity, EntityType, LocalId, MockRemote, Mutation, MutationAction, NetworkMonitor,
    PendingMutation, RemoteFailure, RetryConfig, SyncConfig, SyncEngine,
};
use tallysync_store::InMemoryStore;

type Engine = SyncEngine<InMemoryStore, MockRemote>;

fn engine(config: SyncConfig, monitor: Arc<NetworkMonitor>) -> (Arc<Engine>, Arc<MockRemote>) {
    let remote = Arc::new(MockRemote::new());
    let engine = SyncEngine::new(config, Arc::new(InMemoryStore::new()), Arc::clone(&remote))
        .with_monitor(monitor);
    (Arc::new(engine), remote)
}

async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn queue_empty(engine: &Engine) -> bool {
    engine.pending_mutations().await.unwrap().is_empty()
}

#[tokio::test]
async fn drains_on_reconnect() {
    let monitor = Arc::new(NetworkMonitor::offline());
    let (engine, remote) = engine(SyncConfig::default(), Arc::clone(&monitor));
    let worker = engine.start();

    let id = engine
        .submit_mutation(EntityType::Transaction, Mutation::Create { payload: json!({"amount": 3}) })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(remote.request_count(), 0);

    monitor.report(Connectivity::Online);
    eventually(|| queue_empty(&engine)).await;

    let entity = engine.cache(EntityType::Transaction).get(&id).await.unwrap().unwrap();
    assert!(entity.synced);
    worker.shutdown().await;
}

#[tokio::test]
async fn drains_submissions_while_online() {
    let monitor = Arc::new(NetworkMonitor::online());
    let (engine, remote) = engine(SyncConfig::default(), monitor);
    let worker = engine.start();

    for i in 0..3 {
        engine
            .submit_mutation(EntityType::Goal, Mutation::Create { payload: json!({"n": i}) })
            .await
            .unwrap();
    }
    eventually(|| queue_empty(&engine)).await;
    assert_eq!(remote.request_count(), 3);
    worker.shutdown().await;
}

#[tokio::test]
async fn retries_after_backoff() {
    let retry = RetryConfig::new()
        .with_initial_delay(Duration::from_millis(30))
        .without_jitter();
    let monitor = Arc::new(NetworkMonitor::online());
    let (engine, remote) = engine(SyncConfig::default().with_retry(retry), monitor);
    remote.push_response(Err(RemoteFailure::ServerError {
        status: 503,
        message: "busy".into(),
    }));

    let worker = engine.start();
    engine
        .submit_mutation(EntityType::Budget, Mutation::Create { payload: json!({}) })
        .await
        .unwrap();

    eventually(|| queue_empty(&engine)).await;
    assert_eq!(remote.request_count(), 2);
    worker.shutdown().await;
}

#[tokio::test]
async fn periodic_interval_drains() {
    let monitor = Arc::new(NetworkMonitor::online());
    let config = SyncConfig::default().with_sync_interval(Duration::from_millis(40));
    let (engine, remote) = engine(config, monitor);

    let worker = engine.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Written straight into the queue, so nothing wakes the worker.
    let mutation = PendingMutation::new(
        EntityType::Category,
        MutationAction::Create,
        LocalId::generate(1),
        None,
        Some("{}".into()),
    );
    engine.queue().enqueue(mutation, 1).await.unwrap();

    eventually(|| queue_empty(&engine)).await;
    assert_eq!(remote.request_count(), 1);
    worker.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_worker() {
    let monitor = Arc::new(NetworkMonitor::offline());
    let (engine, remote) = engine(SyncConfig::default(), Arc::clone(&monitor));
    let worker = engine.start();
    worker.shutdown().await;

    engine
        .submit_mutation(EntityType::Goal, Mutation::Create { payload: json!({}) })
        .await
        .unwrap();
    monitor.report(Connectivity::Online);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(remote.request_count(), 0);
    assert_eq!(engine.pending_mutations().await.unwrap().len(), 1);
}
