use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// The content identifier could not be extracted from a content body.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("content body does not contain a {0} field")]
    MissingField(String),
    #[error("content body field {0} is empty")]
    EmptyField(String),
    #[error("content body field {0} is not a string")]
    NotAString(String),
}

/// A publication event cannot be turned into a content body.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("missing required timestamp")]
    MissingTimestamp,
    #[error("{0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("content body is not a JSON object")]
    NotAnObject,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("no collection found for origin system {origin_system_id:?}")]
pub struct CollectionNotFoundError {
    pub origin_system_id: String,
}

/// Errors that can occur while writing a message to the native store.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to extract content uuid: {0}")]
    ContentUuid(#[from] ParseError),
    #[error("failed to serialize content body: {0}")]
    Serialize(serde_json::Error),
    #[error("cannot build a write url from {address} for collection {collection}")]
    Url { address: String, collection: String },
    #[error("invalid message headers: {0}")]
    Headers(http::Error),
    #[error("failed to call the native writer for content {content_uuid}: {source}")]
    Request {
        content_uuid: String,
        source: reqwest::Error,
    },
    #[error(transparent)]
    Status(#[from] StatusError),
}

impl WriteError {
    /// The status returned by the native writer, when it answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            WriteError::Status(error) => Some(error.status),
            WriteError::Request { source, .. } => source.status(),
            _ => None,
        }
    }

    /// The content uuid, when the failure happened after it was extracted.
    pub fn content_uuid(&self) -> Option<&str> {
        match self {
            WriteError::Request { content_uuid, .. } => Some(content_uuid),
            WriteError::Status(error) => Some(&error.content_uuid),
            _ => None,
        }
    }
}

/// The native writer answered outside of the 2XX range.
#[derive(Error, Debug)]
pub struct StatusError {
    pub status: StatusCode,
    pub content_uuid: String,
    pub response: Option<String>,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "native writer returned {} for content {}",
            self.status, self.content_uuid
        )?;
        if let Some(response) = self.response.as_deref().filter(|r| !r.is_empty()) {
            write!(f, ": {response}")?;
        }
        Ok(())
    }
}

/// The native writer is not good to go.
#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("Native writer is not good to go: GTG HTTP status code is {0}")]
    Status(StatusCode),
    #[error("Native writer is not good to go: {0}")]
    Request(reqwest::Error),
}

/// Errors that prevent a `NativeWriter` from being built.
#[derive(Error, Debug)]
pub enum NativeWriterBuildError {
    #[error("invalid native writer address: {0}")]
    Address(#[from] url::ParseError),
    #[error("native writer address {0} cannot be used as a base url")]
    NotABase(String),
    #[error("invalid host header: {0}")]
    HostHeader(#[from] http::header::InvalidHeaderValue),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A message was dropped by the pipeline at `stage`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    CollectionNotFound(#[from] CollectionNotFoundError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to compute native hash: {0}")]
    Hash(serde_json::Error),
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::CollectionNotFound(_) => Stage::CollectionResolved,
            PipelineError::Validation(_) => Stage::BodyEnriched,
            PipelineError::Hash(_) => Stage::HashComputed,
            PipelineError::Write(_) => Stage::Written,
        }
    }

    /// The content uuid, when the failure happened after it was extracted.
    pub fn content_uuid(&self) -> Option<&str> {
        match self {
            PipelineError::Write(error) => error.content_uuid(),
            _ => None,
        }
    }
}

/// Steps of the per-event pipeline a message can fail to reach. A failure is
/// tagged with the first step that could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CollectionResolved,
    BodyEnriched,
    HashComputed,
    Written,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CollectionResolved => "collection_resolved",
            Stage::BodyEnriched => "body_enriched",
            Stage::HashComputed => "hash_computed",
            Stage::Written => "written",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_includes_response_when_present() {
        let error = StatusError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            content_uuid: "abc-123".to_string(),
            response: Some("mongo is down".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "native writer returned 503 Service Unavailable for content abc-123: mongo is down"
        );

        let error = StatusError {
            response: Some(String::new()),
            ..error
        };
        assert_eq!(
            error.to_string(),
            "native writer returned 503 Service Unavailable for content abc-123"
        );
    }

    #[test]
    fn pipeline_errors_know_their_stage() {
        let error = PipelineError::from(CollectionNotFoundError {
            origin_system_id: "unknown".to_string(),
        });
        assert_eq!(error.stage(), Stage::CollectionResolved);

        let error = PipelineError::from(ValidationError::MissingTimestamp);
        assert_eq!(error.stage(), Stage::BodyEnriched);
        assert_eq!(error.to_string(), "missing required timestamp");

        let invalid = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = PipelineError::Hash(invalid);
        assert_eq!(error.stage(), Stage::HashComputed);
        assert_eq!(error.stage().to_string(), "hash_computed");

        let error = PipelineError::from(WriteError::from(ParseError::MissingField(
            "uuid".to_string(),
        )));
        assert_eq!(error.stage(), Stage::Written);
        assert_eq!(error.stage().to_string(), "written");
    }
}
