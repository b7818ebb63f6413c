use crate::error::UploadError;
use crate::record::LogEnvelope;
use async_trait::async_trait;

/// Asynchronous destination for batches of [`LogEnvelope`]s.
///
/// Implementations transport a batch to a concrete backend (Better Stack,
/// stdout, a test recorder). The flush loop calls `upload` from its
/// background task, one batch at a time, and never from an application
/// thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one batch.
    ///
    /// **Parameters**
    /// - `batch`: envelopes in FIFO enqueue order, never empty and never
    ///   longer than the configured batch size.
    ///
    /// **Returns**
    /// - `Ok(())` once the backend accepted the whole batch.
    /// - `Err(..)` when delivery failed for good. Implementations own their
    ///   retry policy; the flush loop does not retry and drops the batch.
    async fn upload(&self, batch: &[LogEnvelope]) -> Result<(), UploadError>;
}
