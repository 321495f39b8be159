//! Error types for the OpenTSDB client

use std::num::ParseIntError;
use std::sync::Arc;

use serde::Deserialize;

/// Failure to sanitize a metric name, tag key or tag value
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CleanError {
    #[error("metric/tagk/tagv cleaning passed a zero length string")]
    EmptyInput,
    #[error("cleaning metric/tagk/tagv resulted in a zero length string")]
    EmptyResult,
}

/// Structured error body returned by OpenTSDB on a non-200 response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: String,
}

/// A rejected query, carrying the JSON body that was sent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestError {
    /// The outgoing request body
    #[serde(skip)]
    pub request: String,
    #[serde(rename = "error")]
    pub err: RemoteErrorBody,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tsdb: {}: {}", self.request, self.err.message)
    }
}

impl std::error::Error for RequestError {}

/// Errors produced while building, resolving or executing queries
///
/// The type is `Clone` so that a cached failure can be handed back to every
/// caller that asks for the same request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TsdbError {
    #[error("{source}. original: [{original}] cleaned: [{cleaned}]")]
    Clean {
        #[source]
        source: CleanError,
        original: String,
        cleaned: String,
    },

    #[error("tsdb: bad query format: {0}")]
    BadQuery(String),
    #[error("tsdb: bad rate option {value:?} in {query}: {source}")]
    BadRateOption {
        query: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("tsdb: bad tag: {0}")]
    BadTag(String),
    #[error("tsdb: duplicated tag: {0}")]
    DuplicateTag(String),

    #[error("tsdb: missing start: {0}")]
    MissingStart(String),
    #[error("tsdb: missing m: {0}")]
    MissingQuery(String),

    #[error("start time must be provided")]
    EmptyStart,
    #[error("invalid time {input:?}: {reason}")]
    InvalidTime { input: String, reason: String },
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },
    #[error("target length must be > 0")]
    ZeroTarget,

    #[error("unparseable number {0}")]
    UnparseableNumber(String),

    #[error("invalid host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),
    #[error(transparent)]
    Remote(Box<RequestError>),
    #[error("tsdb: {status}: {body}")]
    RemoteStatus { status: u16, body: String },
    #[error("failed to encode request: {0}")]
    Marshal(Arc<serde_json::Error>),
    #[error("failed to decode response: {0}")]
    Decode(Arc<serde_json::Error>),
}

impl TsdbError {
    pub(crate) fn marshal(err: serde_json::Error) -> Self {
        Self::Marshal(Arc::new(err))
    }

    pub(crate) fn decode(err: serde_json::Error) -> Self {
        Self::Decode(Arc::new(err))
    }

    pub(crate) fn invalid_time(input: &str, reason: impl ToString) -> Self {
        Self::InvalidTime {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for TsdbError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(Arc::new(err))
    }
}

impl From<RequestError> for TsdbError {
    fn from(err: RequestError) -> Self {
        Self::Remote(Box::new(err))
    }
}
