use std::collections::HashMap;

use rdkafka::message::{Header, Headers, OwnedHeaders};
use rdkafka::Message;

/// A message as delivered by the queue: string headers and an opaque body.
///
/// The body is expected to be JSON but nothing here checks it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQueueMessage {
    headers: HashMap<String, String>,
    body: String,
}

impl RawQueueMessage {
    pub fn new(headers: HashMap<String, String>, body: impl Into<String>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Builds a message from a Kafka record.
    ///
    /// Header values and the payload are decoded as UTF-8, lossily. A header
    /// without a value maps to an empty string, a record without payload to an
    /// empty body.
    pub fn from_kafka<M: Message>(message: &M) -> Self {
        let mut headers = HashMap::new();
        if let Some(kafka_headers) = message.headers() {
            for idx in 0..kafka_headers.count() {
                let header = kafka_headers.get(idx);
                let value = header
                    .value
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .unwrap_or_default();
                headers.insert(header.key.to_owned(), value);
            }
        }

        let body = message
            .payload()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default();

        Self { headers, body }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn kafka_headers(&self) -> OwnedHeaders {
        self.headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_str()),
                })
            })
    }
}
