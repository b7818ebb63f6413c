use crate::init::LoggerConfig;
use crate::queue::QueueConsumer;
use crate::record::LogEnvelope;
use crate::sink::LogSink;
use crate::INTERNAL_TARGET;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

/// Lifecycle of the background flush task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// Draining the queue on the configured cadence.
    Running,
    /// Shutdown requested; delivering whatever is left, back to back.
    Draining,
    /// Terminal. The queue is no longer read.
    Stopped,
}

/// Delivery counters maintained by the flush task.
#[derive(Debug, Default)]
pub struct FlushStats {
    pub batches_delivered: AtomicU64,
    pub envelopes_delivered: AtomicU64,
    pub batches_failed: AtomicU64,
    pub envelopes_failed: AtomicU64,
    /// Envelopes still queued when the drain grace period ran out.
    pub envelopes_discarded: AtomicU64,
}

/// Plain-value copy of [`FlushStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    pub batches_delivered: u64,
    pub envelopes_delivered: u64,
    pub batches_failed: u64,
    pub envelopes_failed: u64,
    pub envelopes_discarded: u64,
}

impl FlushStats {
    pub fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            envelopes_delivered: self.envelopes_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            envelopes_failed: self.envelopes_failed.load(Ordering::Relaxed),
            envelopes_discarded: self.envelopes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the single background task that moves envelopes from the
/// queue to a [`LogSink`].
pub struct FlushLoop {
    shutdown: CancellationToken,
    // Cancelled only when the drain grace period elapses. Stops new uploads
    // from being scheduled; never interrupts the one in flight.
    deadline: CancellationToken,
    state: Arc<watch::Sender<FlushState>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<FlushStats>,
}

impl FlushLoop {
    /// Spawn the flush task on the current Tokio runtime.
    ///
    /// `settings` is read at the start of every cycle, so batch size and
    /// flush frequency updates apply without restarting the loop.
    pub fn spawn(
        consumer: QueueConsumer,
        sink: Arc<dyn LogSink>,
        settings: watch::Receiver<LoggerConfig>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let deadline = CancellationToken::new();
        let (state_tx, _) = watch::channel(FlushState::Running);
        let state = Arc::new(state_tx);
        let stats = Arc::new(FlushStats::default());

        let task = FlushTask {
            consumer,
            sink,
            settings,
            shutdown: shutdown.clone(),
            deadline: deadline.clone(),
            state: Arc::clone(&state),
            stats: Arc::clone(&stats),
        };
        let handle = tokio::spawn(task.run());

        Self {
            shutdown,
            deadline,
            state,
            handle: Mutex::new(Some(handle)),
            stats,
        }
    }

    pub fn state(&self) -> FlushState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> &Arc<FlushStats> {
        &self.stats
    }

    /// Stop the loop and drain the queue.
    ///
    /// Signals shutdown, then waits up to `grace` for the drain to finish.
    /// Past the grace period no further batch is started and whatever is
    /// still queued is discarded; an upload already in progress is allowed
    /// to finish. Safe to call more than once and from several tasks: later
    /// callers wait until the loop is stopped.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();

        let handle = self.handle.lock().await.take();
        let Some(mut handle) = handle else {
            let mut state = self.state.subscribe();
            let _ = state.wait_for(|s| *s == FlushState::Stopped).await;
            return;
        };

        if timeout(grace, &mut handle).await.is_err() {
            warn!(target: INTERNAL_TARGET, ?grace, "drain grace period elapsed, discarding remaining log envelopes");
            self.deadline.cancel();
            if let Err(e) = handle.await {
                eprintln!("log flush task failed: {e}");
            }
        }
        self.state.send_replace(FlushState::Stopped);
    }
}

impl Drop for FlushLoop {
    fn drop(&mut self) {
        // Without an explicit shutdown the task still drains on its own for
        // as long as the runtime is alive.
        self.shutdown.cancel();
    }
}

struct FlushTask {
    consumer: QueueConsumer,
    sink: Arc<dyn LogSink>,
    settings: watch::Receiver<LoggerConfig>,
    shutdown: CancellationToken,
    deadline: CancellationToken,
    state: Arc<watch::Sender<FlushState>>,
    stats: Arc<FlushStats>,
}

impl FlushTask {
    async fn run(mut self) {
        debug!(target: INTERNAL_TARGET, "flush loop started");

        while !self.shutdown.is_cancelled() {
            let (batch_size, flush_frequency) = self.current_settings();
            let batch = self.consumer.dequeue_batch(batch_size);
            if batch.is_empty() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = sleep(flush_frequency) => {}
                }
            } else {
                deliver(&*self.sink, &self.stats, &batch).await;
            }
        }

        self.state.send_replace(FlushState::Draining);
        self.consumer.close();
        let (batch_size, _) = self.current_settings();
        let mut drained = 0usize;
        while !self.deadline.is_cancelled() {
            let batch = self.consumer.dequeue_batch(batch_size);
            if batch.is_empty() {
                break;
            }
            drained += batch.len();
            deliver(&*self.sink, &self.stats, &batch).await;
        }

        let discarded = self.consumer.discard_remaining();
        if discarded > 0 {
            self.stats
                .envelopes_discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
        }
        if let Some(notice) = discard_notice(discarded, self.deadline.is_cancelled()) {
            eprintln!("{notice}");
        }

        debug!(target: INTERNAL_TARGET, drained, discarded, "flush loop stopped");
        self.state.send_replace(FlushState::Stopped);
    }

    fn current_settings(&self) -> (usize, Duration) {
        let settings = self.settings.borrow();
        (settings.batch_size.max(1), settings.flush_frequency)
    }
}

// Only a drain cut short by the grace period is a timeout; anything else
// left over slipped in while the queue was closing.
fn discard_notice(discarded: usize, timed_out: bool) -> Option<String> {
    match (discarded, timed_out) {
        (0, _) => None,
        (n, true) => Some(format!("log drain timed out, discarded {n} queued log envelopes")),
        (n, false) => Some(format!("discarded {n} log envelopes queued during shutdown")),
    }
}

async fn deliver(sink: &dyn LogSink, stats: &FlushStats, batch: &[LogEnvelope]) {
    // Whatever the sink logs while uploading runs inside this span, which the
    // layer refuses to ship. Created per batch so it binds to the subscriber
    // current at delivery time.
    let span = info_span!(target: INTERNAL_TARGET, "deliver", envelopes = batch.len());
    match sink.upload(batch).instrument(span).await {
        Ok(()) => {
            stats.batches_delivered.fetch_add(1, Ordering::Relaxed);
            stats
                .envelopes_delivered
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
        }
        Err(e) => {
            stats.batches_failed.fetch_add(1, Ordering::Relaxed);
            stats
                .envelopes_failed
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            eprintln!("failed to upload {} log envelopes: {}", batch.len(), e);
        }
    }
}
