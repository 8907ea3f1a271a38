//! Drain cycles against a recording transport.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_outbox::error::Result;
use sync_outbox::{
    ChangeEntry, Drainer, Error, KindSchema, ManualClock, MemoryStore, OutboxConfig, Record,
    Schema, SyncQueue, SyncedKinds, Transport,
};
use tokio::sync::watch;

#[derive(Default)]
struct RecordingTransport {
    batches: Mutex<Vec<Vec<String>>>,
    offline: AtomicBool,
}

impl RecordingTransport {
    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn push(&self, entries: &[ChangeEntry]) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("server unreachable".into()));
        }
        self.batches
            .lock()
            .unwrap()
            .push(entries.iter().map(|e| e.record_id.clone()).collect());
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sync_outbox=debug")
        .with_test_writer()
        .try_init();
}

type TestDrainer = Drainer<MemoryStore, RecordingTransport>;

fn setup(batch_size: usize, interval_ms: u64) -> (Arc<MemoryStore>, TestDrainer) {
    init_tracing();

    let schema = Schema::new(1).with_kind(KindSchema::new("Transaction", vec![]).synced());
    let store = Arc::new(MemoryStore::new(schema));
    let mut config = OutboxConfig::new(SyncedKinds::new(["Transaction"]));
    config.batch_size = batch_size;
    config.drain_interval_ms = interval_ms;

    let queue = SyncQueue::with_clock(
        store.clone(),
        config.synced_kinds.clone(),
        Arc::new(ManualClock::with_step(1_000, 1)),
    )
    .unwrap();
    queue.enable().unwrap();

    let drainer = Drainer::new(Arc::new(queue), RecordingTransport::default(), &config);
    (store, drainer)
}

fn insert_all(store: &MemoryStore, ids: &[&str]) {
    for id in ids {
        store.insert(Record::new(*id, "Transaction", json!({}))).unwrap();
    }
}

#[tokio::test]
async fn drain_once_acknowledges_pushed_batch() {
    let (store, drainer) = setup(2, 1_000);
    insert_all(&store, &["t1", "t2", "t3"]);

    assert_eq!(drainer.drain_once().await.unwrap(), 2);
    assert_eq!(drainer.transport().batches(), vec![vec!["t1", "t2"]]);
    assert_eq!(drainer.queue().length().unwrap(), 1);
}

#[tokio::test]
async fn drain_once_on_empty_queue_pushes_nothing() {
    let (_store, drainer) = setup(2, 1_000);

    assert_eq!(drainer.drain_once().await.unwrap(), 0);
    assert!(drainer.transport().batches().is_empty());
}

#[tokio::test]
async fn failed_push_keeps_entries_pending() {
    let (store, drainer) = setup(10, 1_000);
    insert_all(&store, &["t1", "t2"]);
    drainer.transport().set_offline(true);

    let result = drainer.drain_once().await;
    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(drainer.queue().length().unwrap(), 2);

    drainer.transport().set_offline(false);
    assert_eq!(drainer.drain_once().await.unwrap(), 2);
    assert!(drainer.queue().is_empty().unwrap());
}

#[tokio::test]
async fn drain_all_pushes_oldest_batches_first() {
    let (store, drainer) = setup(2, 1_000);
    insert_all(&store, &["t1", "t2", "t3", "t4", "t5"]);

    assert_eq!(drainer.drain_all().await.unwrap(), 5);
    assert_eq!(
        drainer.transport().batches(),
        vec![vec!["t1", "t2"], vec!["t3", "t4"], vec!["t5"]]
    );
    assert!(drainer.queue().is_empty().unwrap());
}

#[tokio::test]
async fn changes_made_while_offline_are_delivered_later() {
    let (store, drainer) = setup(10, 1_000);
    drainer.transport().set_offline(true);

    insert_all(&store, &["t1"]);
    store
        .update(Record::new("t1", "Transaction", json!({})))
        .unwrap();
    assert!(drainer.drain_all().await.is_err());
    assert_eq!(drainer.queue().length().unwrap(), 2);

    drainer.transport().set_offline(false);
    assert_eq!(drainer.drain_all().await.unwrap(), 2);
    assert_eq!(drainer.transport().batches(), vec![vec!["t1", "t1"]]);
}

#[tokio::test]
async fn run_drains_until_shutdown() {
    let (store, drainer) = setup(10, 10);
    let drainer = Arc::new(drainer);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn({
        let drainer = drainer.clone();
        async move { drainer.run(shutdown_rx).await }
    });

    insert_all(&store, &["t1", "t2"]);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !drainer.queue().is_empty().unwrap() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue was not drained");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("drainer did not stop")
        .unwrap();

    let delivered: Vec<String> = drainer.transport().batches().concat();
    assert_eq!(delivered, ["t1", "t2"]);
}

#[tokio::test]
async fn run_stops_when_sender_is_dropped() {
    let (_store, drainer) = setup(10, 10);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    drop(shutdown_tx);

    tokio::time::timeout(Duration::from_secs(5), drainer.run(shutdown_rx))
        .await
        .expect("drainer did not stop");
}
