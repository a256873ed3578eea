use envconfig::Envconfig;
use rdkafka::ClientConfig;

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    // SASL/PLAIN credentials, only used when both are set
    pub kafka_sasl_username: Option<String>,
    pub kafka_sasl_password: Option<String>,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    // Time before we stop retrying producing a message: 20 seconds
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32,

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
}

impl KafkaConfig {
    /// Settings shared by the consumer and the producer clients.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.kafka_hosts)
            .set("statistics.interval.ms", "10000");

        match (&self.kafka_sasl_username, &self.kafka_sasl_password) {
            (Some(username), Some(password)) => {
                let protocol = if self.kafka_tls {
                    "sasl_ssl"
                } else {
                    "sasl_plaintext"
                };
                client_config
                    .set("security.protocol", protocol)
                    .set("sasl.mechanisms", "PLAIN")
                    .set("sasl.username", username)
                    .set("sasl.password", password);
            }
            _ if self.kafka_tls => {
                client_config.set("security.protocol", "ssl");
            }
            _ => {}
        }

        client_config
    }
}

#[derive(Envconfig, Clone)]
pub struct ConsumerConfig {
    #[envconfig(default = "native-ingester")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "NativeCmsPublicationEvents")]
    pub kafka_consumer_topic: String,

    // "largest" is librdkafka's alias for "latest": a new group only sees new publications
    #[envconfig(default = "largest")]
    pub kafka_consumer_offset_reset: String, // smallest, earliest, largest, latest

    // Offsets are always stored explicitly once a batch went through the pipeline.
    // With auto commit disabled, they are also committed right away.
    #[envconfig(default = "false")]
    pub kafka_consumer_auto_commit: bool,

    #[envconfig(default = "5000")]
    pub kafka_consumer_auto_commit_interval_ms: u32,

    #[envconfig(default = "100")]
    pub kafka_consumer_batch_size: usize,

    #[envconfig(default = "1000")]
    pub kafka_consumer_batch_timeout_ms: u64,
}
