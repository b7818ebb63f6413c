use crate::record::LogEnvelope;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Counters shared between producers and the provider.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Envelopes handed to [`EnvelopeQueue::enqueue`].
    pub submitted: AtomicU64,
    /// Successfully placed into the buffer.
    pub enqueued: AtomicU64,
    /// Dropped because the buffer was full.
    pub dropped_full: AtomicU64,
    /// Rejected because the queue was already closed.
    pub rejected_closed: AtomicU64,
    // Set after a rejection was reported to stderr, cleared by the next
    // successful enqueue, so a burst of rejections prints one line.
    reported: AtomicBool,
}

/// Plain-value copy of [`QueueStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub submitted: u64,
    pub enqueued: u64,
    pub dropped_full: u64,
    pub rejected_closed: u64,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            rejected_closed: self.rejected_closed.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of the batching queue. Cheap to clone; every logger holds
/// one.
#[derive(Clone)]
pub struct EnvelopeQueue {
    sender: mpsc::Sender<LogEnvelope>,
    stats: Arc<QueueStats>,
}

/// Consumer side of the batching queue, owned by the flush loop.
pub struct QueueConsumer {
    receiver: mpsc::Receiver<LogEnvelope>,
}

/// Create a bounded queue holding at most `capacity` envelopes.
pub fn envelope_queue(capacity: usize) -> (EnvelopeQueue, QueueConsumer) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        EnvelopeQueue {
            sender,
            stats: Arc::new(QueueStats::default()),
        },
        QueueConsumer { receiver },
    )
}

impl EnvelopeQueue {
    /// Offer an envelope without waiting.
    ///
    /// Never blocks and never fails towards the caller: a full or closed
    /// queue drops the envelope, bumps a counter and reports to stderr.
    /// Returns whether the envelope was accepted.
    pub fn enqueue(&self, envelope: LogEnvelope) -> bool {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                self.stats.reported.store(false, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped_full.fetch_add(1, Ordering::Relaxed);
                self.report("log queue full, dropping log envelope");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.rejected_closed.fetch_add(1, Ordering::Relaxed);
                self.report("log queue closed, dropping log envelope");
                false
            }
        }
    }

    pub fn stats(&self) -> &Arc<QueueStats> {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    // stderr, not tracing: this runs inside the subscriber's own event path.
    fn report(&self, msg: &str) {
        if !self.stats.reported.swap(true, Ordering::Relaxed) {
            eprintln!("{msg}");
        }
    }
}

impl QueueConsumer {
    /// Take up to `max_count` envelopes that are available right now, in
    /// FIFO order. May return an empty batch; never waits.
    pub fn dequeue_batch(&mut self, max_count: usize) -> Vec<LogEnvelope> {
        let mut batch = Vec::new();
        while batch.len() < max_count {
            match self.receiver.try_recv() {
                Ok(envelope) => batch.push(envelope),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }

    /// Stop accepting new envelopes. Already buffered envelopes can still
    /// be dequeued.
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Drop everything still buffered and return how many were discarded.
    pub fn discard_remaining(&mut self) -> usize {
        let mut discarded = 0;
        while self.receiver.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
