//! Network access for the cache controller.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{CacheError, CacheResult};

use super::types::{Request, Response};

/// Performs network requests on behalf of the controller.
///
/// An HTTP error status is still a response; only a failure to get any
/// response at all is an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, request: &Request) -> CacheResult<Response>;
}

/// reqwest-backed fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, request: &Request) -> CacheResult<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            CacheError::Fetch {
                url: url.to_string(),
                message: format!("invalid method: {e}"),
                status_code: None,
            }
        })?;

        let mut builder = self.client.request(method, url).timeout(self.timeout);
        if let Some(accept) = &request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }

        let resp = builder.send().await.map_err(|e| CacheError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
            status_code: None,
        })?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await.map_err(|e| CacheError::Fetch {
            url: url.to_string(),
            message: format!("reading body: {e}"),
            status_code: Some(status),
        })?;

        let mut response = Response::new(status, body.to_vec());
        if let Some(content_type) = content_type {
            response = response.with_header("content-type", &content_type);
        }
        Ok(response)
    }
}
