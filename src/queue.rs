//! Offline-first queue of samples the server has not yet accepted.
//!
//! The queue is one JSON array persisted under [`QUEUE_KEY`] in the local
//! key-value store. Entries leave the queue only after the server accepts
//! them; a crash between a successful send and the rewrite can deliver an
//! entry twice, which the backend absorbs through `client_id`.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{DeviceLink, Sample, SignalApi};

// ---

/// Well-known key of the persisted queue.
pub const QUEUE_KEY: &str = "vit_signal_offline_queue";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("local store failure: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("persisted queue is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Outcome of one flush.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FlushReport {
    /// Entries the server accepted, now dropped.
    pub sent: Vec<Sample>,
    /// Entries still queued, in their original relative order.
    pub remaining: Vec<Sample>,
}

#[derive(Debug)]
pub struct OfflineQueue {
    pool: SqlitePool,
    key: String,
    /// Held for the whole of a flush.
    flush_guard: Mutex<()>,
    /// Held for each read-modify-write of the persisted array.
    store_guard: Mutex<()>,
}

impl OfflineQueue {
    // ---
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_key(pool, QUEUE_KEY)
    }

    pub fn with_key(pool: SqlitePool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
            flush_guard: Mutex::new(()),
            store_guard: Mutex::new(()),
        }
    }

    /// Append and persist. Returns the new queue length.
    pub async fn enqueue(&self, sample: Sample) -> Result<usize, QueueError> {
        // ---
        let _store = self.store_guard.lock().await;
        let mut entries = self.load().await?;
        entries.push(sample);
        self.save(&entries).await?;

        debug!(pending = entries.len(), "sample queued");
        Ok(entries.len())
    }

    /// Snapshot of the persisted entries, oldest first.
    pub async fn pending(&self) -> Result<Vec<Sample>, QueueError> {
        let _store = self.store_guard.lock().await;
        self.load().await
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.pending().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Try to send every queued entry, oldest first.
    ///
    /// No-op while the device is offline. Concurrent calls run one after
    /// another; a later call sees what the earlier one left behind.
    pub async fn flush<A: SignalApi>(
        &self,
        api: &A,
        link: &DeviceLink,
    ) -> Result<FlushReport, QueueError> {
        // ---
        let _flush = self.flush_guard.lock().await;

        if !link.is_online() {
            debug!("device offline, flush skipped");
            return Ok(FlushReport::default());
        }

        let snapshot = self.pending().await?;
        if snapshot.is_empty() {
            return Ok(FlushReport::default());
        }
        info!(pending = snapshot.len(), "Flushing offline queue");

        let taken = snapshot.len();
        let mut report = FlushReport::default();
        for sample in snapshot {
            match api.submit(&sample).await {
                Ok(()) => report.sent.push(sample),
                Err(e) => {
                    if e.is_retryable() {
                        debug!(client_id = %sample.client_id, error = %e, "entry kept for retry");
                    } else {
                        warn!(client_id = %sample.client_id, error = %e, "server refused queued entry, kept");
                    }
                    report.remaining.push(sample);
                }
            }
        }

        // Entries appended while we were sending sit after the snapshot.
        let _store = self.store_guard.lock().await;
        let current = self.load().await?;
        let mut next = report.remaining.clone();
        next.extend(current.into_iter().skip(taken));
        self.save(&next).await?;

        info!(
            sent = report.sent.len(),
            remaining = next.len(),
            "Offline queue flushed"
        );
        Ok(report)
    }

    // ---

    async fn load(&self) -> Result<Vec<Sample>, QueueError> {
        // ---
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM local_storage WHERE key = ?")
                .bind(&self.key)
                .fetch_optional(&self.pool)
                .await?;

        match raw {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, entries: &[Sample]) -> Result<(), QueueError> {
        // ---
        let text = serde_json::to_string(entries)?;
        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.key)
        .bind(text)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
