use crate::error::UploadError;
use crate::record::LogEnvelope;
use crate::sink::LogSink;
use async_trait::async_trait;

/// A sink that accepts and discards every batch.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// network I/O, and for tests that don't care about delivery.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn upload(&self, _batch: &[LogEnvelope]) -> Result<(), UploadError> {
        Ok(())
    }
}
