//! Reading back a hosted reference copy of the image.
//!
//! The color stage samples the reference copy rather than the local file, so
//! the palette matches what a viewer of the hosted URL would see.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Reads image bytes from `http(s)://` or `file://` URLs.
#[derive(Clone)]
pub struct ImageSource {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: u64,
}

impl ImageSource {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(limits.fetch_timeout_ms),
            max_bytes: limits.max_file_size_bytes(),
        }
    }

    /// Fetch the bytes behind `url`.
    pub async fn fetch(&self, url: &str) -> Result<Arc<[u8]>, PipelineError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| fetch_error(url, e))?;
        match parsed.scheme() {
            "http" | "https" => self.fetch_http(parsed).await,
            "file" => self.fetch_file(url, &parsed).await,
            other => Err(fetch_error(url, format!("unsupported scheme '{other}'"))),
        }
    }

    async fn fetch_http(&self, url: reqwest::Url) -> Result<Arc<[u8]>, PipelineError> {
        let label = url.to_string();
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| fetch_error(&label, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_error(&label, format!("HTTP {status}")));
        }

        // Stream so an oversized body is rejected without buffering all of it
        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| fetch_error(&label, e))?;
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_bytes {
                return Err(fetch_error(
                    &label,
                    format!("body exceeds {} bytes", self.max_bytes),
                ));
            }
        }
        Ok(body.into())
    }

    async fn fetch_file(&self, url: &str, parsed: &reqwest::Url) -> Result<Arc<[u8]>, PipelineError> {
        let path = parsed
            .to_file_path()
            .map_err(|_| fetch_error(url, "not a local path"))?;
        let bytes = tokio::time::timeout(self.timeout, tokio::fs::read(&path))
            .await
            .map_err(|_| fetch_error(url, "timed out"))?
            .map_err(|e| fetch_error(url, e))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(fetch_error(url, format!("file exceeds {} bytes", self.max_bytes)));
        }
        Ok(bytes.into())
    }
}

fn fetch_error(url: &str, message: impl ToString) -> PipelineError {
    PipelineError::Fetch {
        url: url.to_string(),
        message: message.to_string(),
    }
}
