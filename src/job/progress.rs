//! Upload progress bookkeeping.
//!
//! `ProgressStore` holds the last reported percentage per transfer key and is
//! owned by one orchestrator. `ProgressThrottler` turns raw byte ticks into
//! sparse status edits on top of it.

use super::render;
use crate::bot::{StatusHandle, TransferClient, TransferTick};
use crate::config::PROGRESS_STEP_PERCENT;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identity of one in-flight upload: destination chat plus status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferKey {
    /// Chat holding the status message
    pub chat_id: i64,
    /// Status message id
    pub message_id: i32,
}

impl From<&StatusHandle> for TransferKey {
    fn from(status: &StatusHandle) -> Self {
        Self {
            chat_id: status.chat_id,
            message_id: status.message_id,
        }
    }
}

/// Last reported percentage per transfer
///
/// Entries are removed explicitly when a job ends; the idle TTL only catches
/// entries of a process that died mid-job.
#[derive(Clone)]
pub struct ProgressStore {
    cache: Cache<TransferKey, f64>,
}

impl ProgressStore {
    /// Create a store whose entries expire after `idle_ttl` without updates
    #[must_use]
    pub fn new(idle_ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_idle(idle_ttl).build();
        Self { cache }
    }

    /// Last recorded percentage
    pub async fn get(&self, key: TransferKey) -> Option<f64> {
        self.cache.get(&key).await
    }

    /// Record a percentage
    pub async fn record(&self, key: TransferKey, percent: f64) {
        self.cache.insert(key, percent).await;
    }

    /// Forget a transfer
    pub async fn clear(&self, key: TransferKey) {
        self.cache.invalidate(&key).await;
    }

    /// Approximate number of live entries; call [`Self::run_pending_tasks`]
    /// first for an exact figure
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending evictions
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

/// Percentage of `current` over `total`; an empty transfer is complete
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (current as f64 * 100.0 / total as f64).min(100.0)
}

/// Decides which progress ticks become status edits
#[derive(Clone)]
pub struct ProgressThrottler {
    store: ProgressStore,
    step: f64,
}

impl ProgressThrottler {
    /// Throttler with the default 5 point step
    #[must_use]
    pub const fn new(store: ProgressStore) -> Self {
        Self::with_step(store, PROGRESS_STEP_PERCENT)
    }

    /// Throttler with a custom step
    #[must_use]
    pub const fn with_step(store: ProgressStore, step: f64) -> Self {
        Self { store, step }
    }

    /// Feed one tick; returns the percentage to narrate, if any.
    ///
    /// A tick emits once the percentage has moved by at least the step since
    /// the last emission, counting from 0 before the first one. Completion
    /// emits exactly once.
    pub async fn on_tick(&self, key: TransferKey, current: u64, total: u64) -> Option<f64> {
        let percent = percentage(current, total);
        let complete = current >= total;

        let last = self.store.get(key).await.unwrap_or(0.0);
        let emit = percent - last >= self.step || (complete && last < 100.0);

        if emit {
            self.store.record(key, percent).await;
        }
        emit.then_some(percent)
    }
}

/// Spawn the narration loop of one upload.
///
/// Ticks are throttled and turned into status edits until `stop` fires and
/// the queue is empty. Resolves to the number of edits attempted.
pub fn spawn_progress_pump(
    transfer: Arc<dyn TransferClient>,
    throttler: ProgressThrottler,
    status: StatusHandle,
    rx: UnboundedReceiver<TransferTick>,
    stop: CancellationToken,
) -> JoinHandle<usize> {
    tokio::spawn(run_progress_pump(transfer, throttler, status, rx, stop))
}

async fn run_progress_pump(
    transfer: Arc<dyn TransferClient>,
    throttler: ProgressThrottler,
    status: StatusHandle,
    mut rx: UnboundedReceiver<TransferTick>,
    stop: CancellationToken,
) -> usize {
    let key = TransferKey::from(&status);
    let mut edits = 0;

    loop {
        let tick = tokio::select! {
            biased;
            Some(tick) = rx.recv() => tick,
            () = stop.cancelled() => break,
        };

        let Some(percent) = throttler.on_tick(key, tick.current, tick.total).await else {
            continue;
        };
        edits += 1;
        let text = render::upload_progress(percent, tick.current, tick.total);
        if !transfer.edit_status(&status, &text).await {
            debug!(percent, "Progress edit not applied");
        }
    }
    edits
}
