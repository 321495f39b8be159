//! Executing requests against an OpenTSDB server

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{RequestError, TsdbError};
use crate::model::ResponseSet;
use crate::request::Request;

const QUERY_PATH: &str = "/api/query";

/// Anything that can answer a [`Request`]
///
/// Implemented by [`Host`] for direct HTTP access and by the caches in
/// [`crate::cache`], which wrap another context.
#[async_trait]
pub trait QueryContext: Send {
    async fn query(&mut self, request: &Request) -> Result<ResponseSet, TsdbError>;
}

/// HTTP client for a single OpenTSDB server
#[derive(Debug, Clone)]
pub struct Host {
    url: Url,
    http: reqwest::Client,
}

impl Host {
    /// Create a client for `host`, given as `hostname:port` or as a base URL
    pub fn new(host: &str) -> Result<Self, TsdbError> {
        Self::with_client(host, reqwest::Client::new())
    }

    /// Like [`Host::new`], failing requests that take longer than `timeout`
    pub fn with_timeout(host: &str, timeout: Duration) -> Result<Self, TsdbError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(host, http)
    }

    pub fn with_client(host: &str, http: reqwest::Client) -> Result<Self, TsdbError> {
        let invalid = |reason: String| TsdbError::InvalidHost {
            host: host.to_string(),
            reason,
        };
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        let url = Url::parse(&base)
            .and_then(|u| u.join(QUERY_PATH))
            .map_err(|e| invalid(e.to_string()))?;
        if url.host_str().is_none() {
            return Err(invalid("no host name".to_string()));
        }
        Ok(Self { url, http })
    }

    /// The endpoint queries are posted to
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl QueryContext for Host {
    async fn query(&mut self, request: &Request) -> Result<ResponseSet, TsdbError> {
        let body = request.to_json()?;
        log::debug!("POST {} {body}", self.url);

        let resp = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.clone())
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if status != reqwest::StatusCode::OK {
            log::warn!("query to {} failed with {status}", self.url);
            return Err(match serde_json::from_str::<RequestError>(&text) {
                Ok(mut e) => {
                    e.request = body;
                    e.into()
                }
                Err(_) => TsdbError::RemoteStatus {
                    status: status.as_u16(),
                    body: text,
                },
            });
        }

        serde_json::from_str(&text).map_err(TsdbError::decode)
    }
}
