use std::str::FromStr;
use std::time;

use common_kafka::config::{ConsumerConfig, KafkaConfig};
use envconfig::Envconfig;

use crate::collections::CollectionMapping;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    #[envconfig(default = "http://localhost:8080")]
    pub native_writer_address: String,

    // Sent as the Host header to the native writer, for routing behind a shared ingress
    pub native_writer_host_header: Option<NonEmptyString>,

    #[envconfig(default = "5000")]
    pub request_timeout: EnvMsDuration,

    // JSON object: origin system id -> native store collection
    #[envconfig(default = "{}")]
    pub collections_by_origins: CollectionMapping,

    #[envconfig(default = "uuid")]
    pub content_uuid_field: NonEmptyString,

    // Written messages are forwarded to this topic when set
    pub kafka_producer_topic: Option<NonEmptyString>,

    #[envconfig(default = "30")]
    pub consumer_liveness_deadline_secs: u64,

    #[envconfig(default = "false")]
    pub log_json: bool,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn content_uuid_field(&self) -> &str {
        self.content_uuid_field.as_str()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).expect("failed to load config");

        assert_eq!(config.bind(), "0.0.0.0:8080");
        assert_eq!(config.native_writer_address, "http://localhost:8080");
        assert!(config.native_writer_host_header.is_none());
        assert_eq!(config.request_timeout.0, time::Duration::from_secs(5));
        assert!(config.collections_by_origins.is_empty());
        assert_eq!(config.content_uuid_field(), "uuid");
        assert!(config.kafka_producer_topic.is_none());
        assert_eq!(config.consumer.kafka_consumer_offset_reset, "largest");
        assert!(!config.consumer.kafka_consumer_auto_commit);
    }

    #[test]
    fn reads_collections_and_overrides() {
        let env = HashMap::from([
            (
                "COLLECTIONS_BY_ORIGINS".to_string(),
                r#"{"http://cmdb.ft.com/systems/methode-web-pub": "methode"}"#.to_string(),
            ),
            (
                "NATIVE_WRITER_HOST_HEADER".to_string(),
                "nativerw.ft.com".to_string(),
            ),
            ("REQUEST_TIMEOUT".to_string(), "2500".to_string()),
            (
                "KAFKA_CONSUMER_TOPIC".to_string(),
                "NativeCmsMetadataPublicationEvents".to_string(),
            ),
        ]);
        let config = Config::init_from_hashmap(&env).expect("failed to load config");

        assert_eq!(
            config
                .collections_by_origins
                .resolve("http://cmdb.ft.com/systems/methode-web-pub"),
            Ok("methode")
        );
        assert_eq!(
            config.native_writer_host_header,
            Some(NonEmptyString("nativerw.ft.com".to_string()))
        );
        assert_eq!(config.request_timeout.0, time::Duration::from_millis(2500));
        assert_eq!(
            config.consumer.kafka_consumer_topic,
            "NativeCmsMetadataPublicationEvents"
        );
    }

    #[test]
    fn rejects_bad_values() {
        let env = HashMap::from([("COLLECTIONS_BY_ORIGINS".to_string(), "[]".to_string())]);
        assert!(Config::init_from_hashmap(&env).is_err());

        let env = HashMap::from([("REQUEST_TIMEOUT".to_string(), "5s".to_string())]);
        assert!(Config::init_from_hashmap(&env).is_err());
    }

    #[test]
    fn non_empty_string() {
        assert_eq!("".parse::<NonEmptyString>(), Err(StringIsEmptyError));
        assert_eq!("   ".parse::<NonEmptyString>(), Err(StringIsEmptyError));
        assert_eq!(
            " uuid ".parse::<NonEmptyString>(),
            Ok(NonEmptyString("uuid".to_string()))
        );
    }
}
