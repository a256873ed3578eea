use std::time::Duration;

use async_trait::async_trait;
use common_kafka::kafka_consumer::{BatchConsumer, MessageBatch};
use health::HealthHandle;
use rdkafka::error::KafkaError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::pipeline::Pipeline;

/// Pause after a failed receive before polling again.
pub const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Where batches of publish events come from.
#[async_trait]
pub trait BatchSource: Send + Sync {
    fn topic(&self) -> &str;

    async fn recv_batch(&self) -> Result<MessageBatch, KafkaError>;

    fn store_offsets(&self, batch: &MessageBatch) -> Result<(), KafkaError>;
}

#[async_trait]
impl BatchSource for BatchConsumer {
    fn topic(&self) -> &str {
        BatchConsumer::topic(self)
    }

    async fn recv_batch(&self) -> Result<MessageBatch, KafkaError> {
        BatchConsumer::recv_batch(self).await
    }

    fn store_offsets(&self, batch: &MessageBatch) -> Result<(), KafkaError> {
        BatchConsumer::store_offsets(self, batch)
    }
}

/// Resolves once `true` is sent on the channel.
pub async fn wait_for_shutdown(mut stop: watch::Receiver<bool>) {
    // A dropped sender means the process is going away too
    if stop.wait_for(|stop| *stop).await.is_err() {
        warn!("shutdown channel closed");
    }
}

/// Receives batches until shutdown. A batch that is being processed when the
/// signal arrives is finished and its offsets are stored.
pub async fn consume<S: BatchSource>(
    source: &S,
    pipeline: &Pipeline,
    liveness: &HealthHandle,
    backoff: Duration,
    stop: watch::Receiver<bool>,
) {
    let stopped = wait_for_shutdown(stop);
    tokio::pin!(stopped);

    loop {
        let batch = tokio::select! {
            _ = &mut stopped => break,
            batch = source.recv_batch() => batch,
        };
        liveness.report_healthy();

        let batch = match batch {
            Ok(batch) => batch,
            Err(error) => {
                error!("failed to receive from {}: {}", source.topic(), error);
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = tokio::time::sleep(backoff) => continue,
                }
            }
        };
        if batch.is_empty() {
            continue;
        }

        let report = pipeline.process_batch(batch.messages()).await;
        debug!(
            received = report.received,
            written = report.written,
            failed = report.failed,
            forwarded = report.forwarded,
            "processed batch from {}",
            source.topic()
        );

        if let Err(error) = source.store_offsets(&batch) {
            error!("failed to store offsets for {}: {}", source.topic(), error);
        }
    }

    info!("consumer for {} stopped", source.topic());
}
