use common_kafka::message::RawQueueMessage;
use serde_json::{Map, Value};

use crate::error::ValidationError;

pub const TRANSACTION_ID_HEADER: &str = "X-Request-Id";
pub const ORIGIN_SYSTEM_ID_HEADER: &str = "Origin-System-Id";
pub const MESSAGE_TIMESTAMP_HEADER: &str = "Message-Timestamp";

pub const LAST_MODIFIED_FIELD: &str = "lastModified";
pub const PUBLISH_REFERENCE_FIELD: &str = "publishReference";

/// A publish event, read from a queue message it borrows.
#[derive(Debug, Clone, Copy)]
pub struct PublicationEvent<'a> {
    message: &'a RawQueueMessage,
}

impl<'a> PublicationEvent<'a> {
    pub fn new(message: &'a RawQueueMessage) -> Self {
        Self { message }
    }

    /// Correlation id of the publish, empty when the publisher did not set one.
    pub fn transaction_id(&self) -> &'a str {
        self.message.header(TRANSACTION_ID_HEADER).unwrap_or_default()
    }

    pub fn origin_system_id(&self) -> &'a str {
        self.message
            .header(ORIGIN_SYSTEM_ID_HEADER)
            .unwrap_or_default()
    }

    pub fn timestamp(&self) -> Option<&'a str> {
        self.message
            .header(MESSAGE_TIMESTAMP_HEADER)
            .filter(|timestamp| !timestamp.is_empty())
    }

    pub fn message(&self) -> &'a RawQueueMessage {
        self.message
    }

    /// Parses the message body and stamps it with the publish audit fields:
    /// `lastModified` is the message timestamp and `publishReference` the
    /// transaction id. Both overwrite any value already in the body.
    ///
    /// A missing timestamp fails before the body is even looked at.
    pub fn content_body(&self) -> Result<Map<String, Value>, ValidationError> {
        let timestamp = self.timestamp().ok_or(ValidationError::MissingTimestamp)?;

        let mut body = match serde_json::from_str::<Value>(self.message.body())? {
            Value::Object(body) => body,
            _ => return Err(ValidationError::NotAnObject),
        };

        body.insert(
            LAST_MODIFIED_FIELD.to_owned(),
            Value::String(timestamp.to_owned()),
        );
        body.insert(
            PUBLISH_REFERENCE_FIELD.to_owned(),
            Value::String(self.transaction_id().to_owned()),
        );

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::*;

    const EXPECTED_TID: &str = "tid_test";
    const EXPECTED_ORIGIN_SYSTEM_ID: &str = "http://cmdb.ft.com/systems/methode-web-pub";
    const EXPECTED_TIMESTAMP: &str = "2017-02-16T12:56:16Z";

    fn headers() -> HashMap<String, String> {
        HashMap::from([
            (TRANSACTION_ID_HEADER.to_string(), EXPECTED_TID.to_string()),
            (
                ORIGIN_SYSTEM_ID_HEADER.to_string(),
                EXPECTED_ORIGIN_SYSTEM_ID.to_string(),
            ),
            (
                MESSAGE_TIMESTAMP_HEADER.to_string(),
                EXPECTED_TIMESTAMP.to_string(),
            ),
        ])
    }

    #[test]
    fn reads_transaction_and_origin_system_ids() {
        let message = RawQueueMessage::new(headers(), r#"{"foo":"bar"}"#);
        let event = PublicationEvent::new(&message);

        assert_eq!(event.transaction_id(), EXPECTED_TID);
        assert_eq!(event.origin_system_id(), EXPECTED_ORIGIN_SYSTEM_ID);
    }

    #[test]
    fn missing_ids_are_empty() {
        let message = RawQueueMessage::new(HashMap::new(), r#"{"foo":"bar"}"#);
        let event = PublicationEvent::new(&message);

        assert_eq!(event.transaction_id(), "");
        assert_eq!(event.origin_system_id(), "");
    }

    #[test]
    fn content_body_adds_audit_fields() {
        let message = RawQueueMessage::new(headers(), r#"{"foo":"bar"}"#);
        let event = PublicationEvent::new(&message);

        let body = event.content_body().expect("failed to build content body");

        assert_json_eq!(
            Value::Object(body),
            json!({
                "foo": "bar",
                "lastModified": EXPECTED_TIMESTAMP,
                "publishReference": EXPECTED_TID,
            })
        );
    }

    #[test]
    fn content_body_is_idempotent() {
        let message = RawQueueMessage::new(
            headers(),
            r#"{"uuid":"abc-123","nested":{"list":[1,2.5,true,null]}}"#,
        );
        let event = PublicationEvent::new(&message);

        let first = event.content_body().expect("failed to build content body");
        let second = event.content_body().expect("failed to build content body");

        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn audit_fields_overwrite_body_fields() {
        let message = RawQueueMessage::new(
            headers(),
            r#"{"lastModified":"yesterday","publishReference":"tid_old"}"#,
        );
        let body = PublicationEvent::new(&message)
            .content_body()
            .expect("failed to build content body");

        assert_eq!(body[LAST_MODIFIED_FIELD], EXPECTED_TIMESTAMP);
        assert_eq!(body[PUBLISH_REFERENCE_FIELD], EXPECTED_TID);
    }

    #[test]
    fn content_body_fails_on_bad_body() {
        let message = RawQueueMessage::new(headers(), "I'm not JSON");
        let error = PublicationEvent::new(&message)
            .content_body()
            .expect_err("content body should not parse");

        assert!(matches!(error, ValidationError::InvalidJson(_)));
        assert_eq!(error.to_string(), "expected value at line 1 column 1");
    }

    #[test]
    fn content_body_fails_on_non_object_body() {
        let message = RawQueueMessage::new(headers(), r#"["foo","bar"]"#);
        let error = PublicationEvent::new(&message)
            .content_body()
            .expect_err("content body should not be accepted");

        assert!(matches!(error, ValidationError::NotAnObject));
    }

    #[test]
    fn content_body_fails_on_missing_timestamp() {
        for body in [r#"{"foo":"bar"}"#, "I'm not JSON", ""] {
            let message = RawQueueMessage::new(HashMap::new(), body);
            let error = PublicationEvent::new(&message)
                .content_body()
                .expect_err("content body should require a timestamp");

            assert!(matches!(error, ValidationError::MissingTimestamp));
            assert_eq!(error.to_string(), "missing required timestamp");
        }
    }

    #[test]
    fn empty_timestamp_is_missing() {
        let mut headers = headers();
        headers.insert(MESSAGE_TIMESTAMP_HEADER.to_string(), String::new());
        let message = RawQueueMessage::new(headers, r#"{"foo":"bar"}"#);

        assert!(matches!(
            PublicationEvent::new(&message).content_body(),
            Err(ValidationError::MissingTimestamp)
        ));
    }
}
