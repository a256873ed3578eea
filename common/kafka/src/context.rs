use health::HealthHandle;
use rdkafka::consumer::ConsumerContext;
use rdkafka::ClientContext;

/// Client context shared by the consumer and the producer.
///
/// librdkafka calls `stats` from its own thread every `statistics.interval.ms`,
/// which proves the client loop is alive.
pub struct KafkaContext {
    liveness: HealthHandle,
}

impl From<HealthHandle> for KafkaContext {
    fn from(value: HealthHandle) -> Self {
        KafkaContext { liveness: value }
    }
}

impl ClientContext for KafkaContext {
    fn stats(&self, _: rdkafka::Statistics) {
        self.liveness.report_healthy();
    }
}

impl ConsumerContext for KafkaContext {}
