//! Drain driver: moves pending entries from the queue to a transport.
//!
//! A drain cycle takes the oldest batch with [`SyncQueue::next`], hands it to
//! the [`Transport`], and acknowledges it only once the transport reports
//! success. A failed push leaves the batch pending for the next cycle; there
//! is no retry schedule beyond the drain interval.

use crate::{
    config::OutboxConfig, datastore::Datastore, entry::ChangeEntry, error::Result, SyncQueue,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

/// Delivers batches of change entries to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `entries` (oldest first). `Ok` means the server has them.
    async fn push(&self, entries: &[ChangeEntry]) -> Result<()>;
}

/// Drives drain cycles for one queue.
pub struct Drainer<S: Datastore, T: Transport> {
    queue: Arc<SyncQueue<S>>,
    transport: T,
    batch_size: usize,
    interval: Duration,
    // Serializes drains so a batch is never pushed twice concurrently.
    gate: Mutex<()>,
}

impl<S: Datastore, T: Transport> Drainer<S, T> {
    pub fn new(queue: Arc<SyncQueue<S>>, transport: T, config: &OutboxConfig) -> Self {
        Self {
            queue,
            transport,
            batch_size: config.batch_size.max(1),
            interval: Duration::from_millis(config.drain_interval_ms.max(1)),
            gate: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &Arc<SyncQueue<S>> {
        &self.queue
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn drain_batch(&self) -> Result<usize> {
        let batch = self.queue.next(self.batch_size)?;
        if batch.is_empty() {
            return Ok(0);
        }

        self.transport.push(&batch).await?;
        let removed = self.queue.acknowledge(&batch)?;

        tracing::debug!(pushed = batch.len(), removed, "batch drained");
        Ok(removed)
    }

    /// Push and acknowledge one batch. Returns the number acknowledged.
    pub async fn drain_once(&self) -> Result<usize> {
        let _guard = self.gate.lock().await;
        self.drain_batch().await
    }

    /// Drain batches until the queue is empty.
    ///
    /// Stops at the first failed push; batches acknowledged before it stay
    /// acknowledged.
    pub async fn drain_all(&self) -> Result<usize> {
        let _guard = self.gate.lock().await;
        let mut total = 0;
        loop {
            let removed = self.drain_batch().await?;
            if removed == 0 {
                break;
            }
            total += removed;
        }
        Ok(total)
    }

    /// Run drain cycles on the configured interval until `shutdown` turns
    /// true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            batch_size = self.batch_size,
            interval_ms = self.interval.as_millis() as u64,
            "drainer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.drain_all().await {
                        Ok(0) => {}
                        Ok(acknowledged) => tracing::info!(acknowledged, "drain cycle complete"),
                        Err(e) => tracing::warn!(error = %e, "drain cycle failed, entries stay pending"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("drainer stopped");
    }
}
