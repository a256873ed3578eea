use std::time::Duration;

use common_kafka::kafka_producer::KafkaProduceError;
use tracing::{debug, error, info};

use crate::error::PipelineError;

pub const MESSAGES_TOTAL: &str = "native_ingester_messages_total";
pub const MESSAGES_WRITTEN: &str = "native_ingester_messages_written";
pub const MESSAGES_FAILED: &str = "native_ingester_messages_failed";
pub const MESSAGES_FORWARDED: &str = "native_ingester_messages_forwarded";
pub const MESSAGES_FORWARD_FAILED: &str = "native_ingester_messages_forward_failed";
pub const WRITE_DURATION: &str = "native_ingester_write_duration_seconds";
pub const BATCH_SIZE: &str = "native_ingester_batch_size";

/// What happened to a publication event as it went through the pipeline.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    Received {
        transaction_id: &'a str,
    },
    Written {
        transaction_id: &'a str,
        collection: &'a str,
        content_uuid: &'a str,
        elapsed: Duration,
    },
    Failed {
        transaction_id: &'a str,
        error: &'a PipelineError,
    },
    Forwarded {
        transaction_id: &'a str,
        topic: &'a str,
    },
    ForwardFailed {
        transaction_id: &'a str,
        topic: &'a str,
        error: &'a KafkaProduceError,
    },
    BatchProcessed {
        size: usize,
    },
}

/// Receives every pipeline event. The pipeline itself never logs.
pub trait PipelineObserver: Send + Sync {
    fn observe(&self, event: &PipelineEvent<'_>);
}

/// Logs pipeline events with `tracing` and records them as metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn observe(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::Received { transaction_id } => {
                debug!(transaction_id, "received native publish event");
                metrics::counter!(MESSAGES_TOTAL).increment(1);
            }
            PipelineEvent::Written {
                transaction_id,
                collection,
                content_uuid,
                elapsed,
            } => {
                info!(
                    transaction_id,
                    uuid = content_uuid,
                    collection,
                    "Successfully finished processing native publish event"
                );
                metrics::counter!(MESSAGES_WRITTEN).increment(1);
                metrics::histogram!(WRITE_DURATION).record(elapsed.as_secs_f64());
            }
            PipelineEvent::Failed {
                transaction_id,
                error,
            } => {
                let stage = error.stage();
                error!(
                    transaction_id,
                    uuid = error.content_uuid().unwrap_or_default(),
                    stage = stage.as_str(),
                    "Dropping native publish event: {}",
                    error
                );
                metrics::counter!(MESSAGES_FAILED, "stage" => stage.as_str()).increment(1);
            }
            PipelineEvent::Forwarded {
                transaction_id,
                topic,
            } => {
                debug!(transaction_id, topic, "forwarded native publish event");
                metrics::counter!(MESSAGES_FORWARDED).increment(1);
            }
            PipelineEvent::ForwardFailed {
                transaction_id,
                topic,
                error,
            } => {
                error!(
                    transaction_id,
                    topic, "failed to forward native publish event: {}", error
                );
                metrics::counter!(MESSAGES_FORWARD_FAILED).increment(1);
            }
            PipelineEvent::BatchProcessed { size } => {
                metrics::histogram!(BATCH_SIZE).record(*size as f64);
            }
        }
    }
}
