use async_trait::async_trait;
use common_kafka::context::KafkaContext;
use common_kafka::kafka_producer::{send_raw_message, KafkaProduceError};
use common_kafka::message::RawQueueMessage;
use rdkafka::producer::FutureProducer;

/// Passes successfully written events on to another topic.
#[async_trait]
pub trait Forwarder: Send + Sync {
    fn topic(&self) -> &str;

    async fn forward(&self, message: &RawQueueMessage) -> Result<(), KafkaProduceError>;
}

pub struct KafkaForwarder {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaForwarder {
    pub fn new(producer: FutureProducer<KafkaContext>, topic: &str) -> Self {
        Self {
            producer,
            topic: topic.to_owned(),
        }
    }
}

#[async_trait]
impl Forwarder for KafkaForwarder {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn forward(&self, message: &RawQueueMessage) -> Result<(), KafkaProduceError> {
        send_raw_message(&self.producer, &self.topic, message).await
    }
}
