use std::collections::HashMap;
use std::time::Duration;

use health::HealthHandle;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::{Message, Offset, TopicPartitionList};
use tracing::{debug, warn};

use crate::config::{ConsumerConfig, KafkaConfig};
use crate::context::KafkaContext;
use crate::message::RawQueueMessage;

/// Messages received in one `recv_batch` call, with the positions needed to
/// store their offsets once they have been handled.
#[derive(Debug, Default)]
pub struct MessageBatch {
    messages: Vec<RawQueueMessage>,
    // partition -> highest offset seen in this batch
    positions: HashMap<i32, i64>,
}

impl MessageBatch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
            positions: HashMap::new(),
        }
    }

    fn push(&mut self, message: RawQueueMessage, partition: i32, offset: i64) {
        self.messages.push(message);
        let highest = self.positions.entry(partition).or_insert(offset);
        *highest = (*highest).max(offset);
    }

    pub fn messages(&self) -> &[RawQueueMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Consumes a single topic in batches, with at-least-once semantics: offsets
/// are only stored after the caller handed the batch back through
/// `store_offsets`.
pub struct BatchConsumer {
    consumer: StreamConsumer<KafkaContext>,
    topic: String,
    batch_size: usize,
    batch_timeout: Duration,
    auto_commit: bool,
}

impl BatchConsumer {
    pub fn new(
        common_config: &KafkaConfig,
        consumer_config: &ConsumerConfig,
        liveness: HealthHandle,
    ) -> Result<Self, KafkaError> {
        let mut client_config = common_config.client_config();
        client_config
            .set("group.id", &consumer_config.kafka_consumer_group)
            .set(
                "auto.offset.reset",
                &consumer_config.kafka_consumer_offset_reset,
            )
            .set(
                "enable.auto.commit",
                consumer_config.kafka_consumer_auto_commit.to_string(),
            )
            .set(
                "auto.commit.interval.ms",
                consumer_config
                    .kafka_consumer_auto_commit_interval_ms
                    .to_string(),
            )
            .set("enable.auto.offset.store", "false");

        debug!("rdkafka consumer configuration: {:?}", client_config);
        let consumer: StreamConsumer<KafkaContext> =
            client_config.create_with_context(liveness.into())?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;

        Ok(Self {
            consumer,
            topic: consumer_config.kafka_consumer_topic.clone(),
            batch_size: consumer_config.kafka_consumer_batch_size.max(1),
            batch_timeout: Duration::from_millis(consumer_config.kafka_consumer_batch_timeout_ms),
            auto_commit: consumer_config.kafka_consumer_auto_commit,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Collects up to `batch_size` messages, waiting at most `batch_timeout`.
    /// Returns an empty batch when nothing arrived in time.
    ///
    /// A Kafka error is only returned when no message was received yet;
    /// otherwise the partial batch is returned and the error is logged.
    pub async fn recv_batch(&self) -> Result<MessageBatch, KafkaError> {
        let deadline = tokio::time::Instant::now() + self.batch_timeout;
        let mut batch = MessageBatch::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Ok(Ok(message)) => batch.push(
                    RawQueueMessage::from_kafka(&message),
                    message.partition(),
                    message.offset(),
                ),
                Ok(Err(error)) if batch.is_empty() => return Err(error),
                Ok(Err(error)) => {
                    warn!(
                        "error receiving from {}, closing batch early: {}",
                        self.topic, error
                    );
                    break;
                }
                Err(_elapsed) => break,
            }
        }

        Ok(batch)
    }

    /// Marks every message of the batch as handled. The stored offsets are
    /// committed right away unless auto commit is enabled.
    pub fn store_offsets(&self, batch: &MessageBatch) -> Result<(), KafkaError> {
        if batch.positions.is_empty() {
            return Ok(());
        }

        let mut offsets = TopicPartitionList::with_capacity(batch.positions.len());
        for (partition, offset) in &batch.positions {
            // The committed offset is the next one to read
            offsets.add_partition_offset(&self.topic, *partition, Offset::Offset(offset + 1))?;
        }

        self.consumer.store_offsets(&offsets)?;
        if !self.auto_commit {
            self.consumer.commit(&offsets, CommitMode::Async)?;
        }
        Ok(())
    }
}
