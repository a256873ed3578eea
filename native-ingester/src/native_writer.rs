use std::collections::HashMap;
use std::sync::Arc;
use std::time;

use async_trait::async_trait;
use http::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::body_parser::ContentBodyParser;
use crate::collections::CollectionMapping;
use crate::error::{
    CollectionNotFoundError, ConnectivityError, NativeWriterBuildError, StatusError, WriteError,
};
use crate::publication_event::TRANSACTION_ID_HEADER;

pub const NATIVE_HASH_HEADER: &str = "X-Native-Hash";
pub const GTG_PATH: &str = "__gtg";

// How much of an error response is kept to describe the failure. The rest is discarded.
const MAX_RESPONSE_BODY: usize = 4 * 1024;

/// What gets written to the native store: a content body and the headers to send with it.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeMessage {
    body: Map<String, Value>,
    headers: HashMap<String, String>,
}

impl NativeMessage {
    pub fn new(body: Map<String, Value>, transaction_id: &str) -> Self {
        let headers = HashMap::from([(
            TRANSACTION_ID_HEADER.to_owned(),
            transaction_id.to_owned(),
        )]);
        Self { body, headers }
    }

    /// Sets a header, replacing any previous value under the same name.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_owned(), value.to_owned());
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn transaction_id(&self) -> &str {
        self.headers
            .get(TRANSACTION_ID_HEADER)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// A successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub content_uuid: String,
    pub status: StatusCode,
}

/// Writes content to the native store.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Looks up the collection content from `origin_system_id` is written to.
    fn resolve_collection(&self, origin_system_id: &str) -> Result<&str, CollectionNotFoundError>;

    /// Writes a message to a collection. A single attempt: failures are returned, never retried.
    async fn write(
        &self,
        message: &NativeMessage,
        collection: &str,
    ) -> Result<WriteReceipt, WriteError>;

    /// Checks the native store is good to go, returning a status message.
    async fn connectivity_check(&self) -> Result<String, ConnectivityError>;
}

pub struct NativeWriterConfig {
    pub address: String,
    pub host_header: Option<String>,
    pub request_timeout: time::Duration,
}

/// `Writer` for the native store HTTP API:
/// `PUT {address}/{collection}/{uuid}` and `GET {address}/__gtg`.
pub struct NativeWriter {
    address: Url,
    host_header: Option<HeaderValue>,
    client: Client,
    collections: Arc<CollectionMapping>,
    body_parser: Box<dyn ContentBodyParser>,
}

pub fn build_http_client(request_timeout: time::Duration) -> reqwest::Result<Client> {
    reqwest::Client::builder()
        .user_agent("native-ingester")
        .timeout(request_timeout)
        .build()
}

impl NativeWriter {
    pub fn new(
        config: NativeWriterConfig,
        collections: Arc<CollectionMapping>,
        body_parser: Box<dyn ContentBodyParser>,
    ) -> Result<Self, NativeWriterBuildError> {
        let address = Url::parse(&config.address)?;
        if address.cannot_be_a_base() {
            return Err(NativeWriterBuildError::NotABase(config.address));
        }

        let host_header = config
            .host_header
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(HeaderValue::from_str)
            .transpose()?;

        Ok(Self {
            address,
            host_header,
            client: build_http_client(config.request_timeout)?,
            collections,
            body_parser,
        })
    }

    /// `{address}/{segments...}`, with each segment percent-encoded.
    fn url_for(&self, segments: &[&str]) -> Option<Url> {
        let mut url = self.address.clone();
        url.path_segments_mut().ok()?.pop_if_empty().extend(segments);
        Some(url)
    }

    fn with_host(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.host_header {
            Some(host) => request.header(header::HOST, host.clone()),
            None => request,
        }
    }
}

#[async_trait]
impl Writer for NativeWriter {
    fn resolve_collection(&self, origin_system_id: &str) -> Result<&str, CollectionNotFoundError> {
        self.collections.resolve(origin_system_id)
    }

    async fn write(
        &self,
        message: &NativeMessage,
        collection: &str,
    ) -> Result<WriteReceipt, WriteError> {
        let content_uuid = self.body_parser.content_uuid(message.body())?;
        let body = serde_json::to_vec(message.body()).map_err(WriteError::Serialize)?;

        let url = self
            .url_for(&[collection, content_uuid.as_str()])
            .ok_or_else(|| WriteError::Url {
                address: self.address.to_string(),
                collection: collection.to_owned(),
            })?;
        let headers: HeaderMap = message.headers().try_into().map_err(WriteError::Headers)?;

        debug!(
            transaction_id = message.transaction_id(),
            uuid = %content_uuid,
            "writing to {}",
            url
        );

        let request = self
            .client
            .put(url)
            .headers(headers)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);

        let response = self
            .with_host(request)
            .send()
            .await
            .map_err(|source| WriteError::Request {
                content_uuid: content_uuid.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let response = drain(response, MAX_RESPONSE_BODY).await;
            return Err(WriteError::Status(StatusError {
                status,
                content_uuid,
                response,
            }));
        }

        drain(response, 0).await;
        Ok(WriteReceipt {
            content_uuid,
            status,
        })
    }

    async fn connectivity_check(&self) -> Result<String, ConnectivityError> {
        // The base address was checked to be a base url on construction
        let url = self.url_for(&[GTG_PATH]).unwrap_or_else(|| self.address.clone());

        let response = self
            .with_host(self.client.get(url))
            .send()
            .await
            .map_err(ConnectivityError::Request)?;

        let status = response.status();
        drain(response, 0).await;

        if status != StatusCode::OK {
            return Err(ConnectivityError::Status(status));
        }
        Ok("Native writer is good to go.".to_owned())
    }
}

/// Reads a response body to the end so the connection can go back to the pool,
/// keeping up to `keep` bytes of it as text.
async fn drain(mut response: Response, keep: usize) -> Option<String> {
    let mut kept = Vec::with_capacity(keep.min(MAX_RESPONSE_BODY));
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = keep - kept.len();
                kept.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Ok(None) => break,
            Err(error) => {
                warn!("failed to read native writer response body: {}", error);
                break;
            }
        }
    }

    (keep > 0).then(|| String::from_utf8_lossy(&kept).into_owned())
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::body_parser::UuidFieldParser;

    fn writer(address: &str, host_header: Option<&str>) -> NativeWriter {
        let collections: CollectionMapping =
            r#"{"http://cmdb.ft.com/systems/methode-web-pub": "methode"}"#
                .parse()
                .expect("failed to parse collections");
        NativeWriter::new(
            NativeWriterConfig {
                address: address.to_owned(),
                host_header: host_header.map(str::to_owned),
                request_timeout: time::Duration::from_secs(1),
            },
            Arc::new(collections),
            Box::new(UuidFieldParser::default()),
        )
        .expect("failed to build writer")
    }

    fn message(body: Value) -> NativeMessage {
        let Value::Object(body) = body else {
            panic!("test body must be an object")
        };
        let mut message = NativeMessage::new(body, "tid_test");
        message.add_header(NATIVE_HASH_HEADER, "27f9e3");
        message
    }

    #[tokio::test]
    async fn writes_to_collection() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/content/abc-123")
                .header("content-type", "application/json")
                .header("X-Request-Id", "tid_test")
                .header("X-Native-Hash", "27f9e3")
                .json_body(json!({"uuid": "abc-123", "foo": "bar"}));
            then.status(200);
        });

        let receipt = writer(&server.base_url(), None)
            .write(&message(json!({"uuid": "abc-123", "foo": "bar"})), "content")
            .await
            .expect("write failed");

        mock.assert();
        assert_eq!(receipt.content_uuid, "abc-123");
        assert_eq!(receipt.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn overrides_host_header() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/methode/abc-123")
                .header("host", "nativerw.ft.com");
            then.status(201);
        });

        writer(&format!("{}/", server.base_url()), Some("nativerw.ft.com"))
            .write(&message(json!({"uuid": "abc-123"})), "methode")
            .await
            .expect("write failed");

        mock.assert();
    }

    #[tokio::test]
    async fn non_2xx_is_a_write_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT).path("/content/abc-123");
            then.status(503).body("native store unavailable");
        });
        let writer = writer(&server.base_url(), None);

        // Bodies are drained, so repeated failures keep reusing the pool
        for _ in 0..3 {
            let error = writer
                .write(&message(json!({"uuid": "abc-123"})), "content")
                .await
                .expect_err("write should fail");

            assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
            assert!(error.to_string().contains("native store unavailable"));
        }
        mock.assert_hits(3);
    }

    #[tokio::test]
    async fn keeps_only_the_start_of_large_error_bodies() {
        let server = MockServer::start();
        let large_body = "a".repeat(MAX_RESPONSE_BODY * 4);
        server.mock(|when, then| {
            when.method(PUT).path("/content/abc-123");
            then.status(500).body(&large_body);
        });

        let error = writer(&server.base_url(), None)
            .write(&message(json!({"uuid": "abc-123"})), "content")
            .await
            .expect_err("write should fail");

        let WriteError::Status(error) = error else {
            panic!("expected a status error, got {error}")
        };
        assert_eq!(error.response.map(|r| r.len()), Some(MAX_RESPONSE_BODY));
    }

    #[tokio::test]
    async fn does_not_call_without_uuid() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT);
            then.status(200);
        });

        let error = writer(&server.base_url(), None)
            .write(&message(json!({"foo": "bar"})), "content")
            .await
            .expect_err("write should fail");

        assert!(matches!(error, WriteError::ContentUuid(_)));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn transport_failure_is_a_write_error() {
        // Nothing listens on port 9 of localhost
        let error = writer("http://127.0.0.1:9", None)
            .write(&message(json!({"uuid": "abc-123"})), "content")
            .await
            .expect_err("write should fail");

        assert!(matches!(error, WriteError::Request { .. }));
        assert_eq!(error.status(), None);
        assert_eq!(error.content_uuid(), Some("abc-123"));
        assert!(error.to_string().contains("content abc-123"));
    }

    #[tokio::test]
    async fn slow_native_writer_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path("/methode/abc-123");
            then.status(200).delay(time::Duration::from_secs(3));
        });
        let writer = NativeWriter::new(
            NativeWriterConfig {
                address: server.base_url(),
                host_header: None,
                request_timeout: time::Duration::from_millis(200),
            },
            Arc::new(CollectionMapping::default()),
            Box::new(UuidFieldParser::default()),
        )
        .expect("failed to build writer");

        let start = time::Instant::now();
        let error = writer
            .write(&message(json!({"uuid": "abc-123"})), "methode")
            .await
            .expect_err("write should time out");

        assert!(start.elapsed() < time::Duration::from_secs(2));
        let WriteError::Request { content_uuid, source } = error else {
            panic!("expected a request error, got {error}")
        };
        assert!(source.is_timeout());
        assert_eq!(content_uuid, "abc-123");
    }

    #[tokio::test]
    async fn appends_to_base_path() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT).path("/native/methode/abc-123");
            then.status(200);
        });

        writer(&format!("{}/native", server.base_url()), None)
            .write(&message(json!({"uuid": "abc-123"})), "methode")
            .await
            .expect("write failed");

        mock.assert();
    }

    #[tokio::test]
    async fn connectivity_check() {
        let server = MockServer::start();
        let mut gtg = server.mock(|when, then| {
            when.method(GET).path("/__gtg").header("host", "nativerw.ft.com");
            then.status(200).body("OK");
        });
        let writer = writer(&server.base_url(), Some("nativerw.ft.com"));

        assert_eq!(
            writer.connectivity_check().await.expect("check failed"),
            "Native writer is good to go."
        );
        gtg.assert();
        gtg.delete();

        server.mock(|when, then| {
            when.method(GET).path("/__gtg");
            then.status(503);
        });
        let error = writer
            .connectivity_check()
            .await
            .expect_err("check should fail");
        assert!(matches!(
            error,
            ConnectivityError::Status(StatusCode::SERVICE_UNAVAILABLE)
        ));
    }

    #[test]
    fn rejects_bad_configuration() {
        let build = |address: &str, host_header: Option<&str>| {
            NativeWriter::new(
                NativeWriterConfig {
                    address: address.to_owned(),
                    host_header: host_header.map(str::to_owned),
                    request_timeout: time::Duration::from_secs(1),
                },
                Arc::new(CollectionMapping::default()),
                Box::new(UuidFieldParser::default()),
            )
        };

        assert!(matches!(
            build("not a url", None),
            Err(NativeWriterBuildError::Address(_))
        ));
        assert!(matches!(
            build("mailto:nativerw@ft.com", None),
            Err(NativeWriterBuildError::NotABase(_))
        ));
        assert!(matches!(
            build("http://localhost:8080", Some("bad\nhost")),
            Err(NativeWriterBuildError::HostHeader(_))
        ));
        assert!(build("http://localhost:8080", Some("  ")).is_ok());
    }

    #[test]
    fn resolves_collections() {
        let writer = writer("http://localhost:8080", None);
        assert_eq!(
            writer.resolve_collection("http://cmdb.ft.com/systems/methode-web-pub"),
            Ok("methode")
        );
        assert!(writer.resolve_collection("unknown").is_err());
    }
}
