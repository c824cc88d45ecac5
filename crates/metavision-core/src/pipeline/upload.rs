//! Image hosts that turn a validated input into a reference URL.
//!
//! The reference URL is what the color and OCR stages read. [`ImgbbHost`]
//! publishes the image to a public host; [`LocalHost`] stages a copy on disk
//! and hands out a `file://` URL so extraction works without a network.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::UploadConfig;
use crate::error::PipelineError;

use super::hash::Hasher;
use super::input::ImageInput;
use super::retry;

/// A place an image can be published to.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Host name, used in logs.
    fn name(&self) -> &str;

    /// Publish the image and return a URL it can be read back from.
    async fn upload(&self, input: &ImageInput) -> Result<String, PipelineError>;
}

/// Resolve a `${ENV_VAR}` reference to its value.
///
/// Plain values pass through; an empty value or unset variable gives `None`.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// ImgBB upload API.
pub struct ImgbbHost {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ImgbbResponse {
    #[serde(default)]
    success: bool,
    data: Option<ImgbbData>,
    error: Option<ImgbbError>,
}

#[derive(Deserialize)]
struct ImgbbData {
    url: String,
}

#[derive(Deserialize)]
struct ImgbbError {
    message: String,
}

impl ImgbbHost {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, resolving the API key from the environment.
    pub fn from_config(config: &UploadConfig) -> Result<Self, PipelineError> {
        let api_key = resolve_env_var(&config.api_key).ok_or_else(|| PipelineError::Upload {
            message: "Image host API key not set. Set IMGBB_API_KEY env var.".to_string(),
            status_code: None,
        })?;
        Ok(Self::new(&config.endpoint, &api_key))
    }
}

#[async_trait]
impl ImageHost for ImgbbHost {
    fn name(&self) -> &str {
        "imgbb"
    }

    async fn upload(&self, input: &ImageInput) -> Result<String, PipelineError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&input.bytes[..]);
        let form = [
            ("key", self.api_key.as_str()),
            ("image", encoded.as_str()),
            ("name", input.name.as_str()),
        ];

        let resp = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| PipelineError::Upload {
                message: format!("ImgBB request failed: {e}"),
                status_code: None,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Upload {
                message: format!("ImgBB HTTP {status}: {text}"),
                status_code: Some(status.as_u16()),
            });
        }

        let body: ImgbbResponse = resp.json().await.map_err(|e| PipelineError::Upload {
            message: format!("Failed to parse ImgBB response: {e}"),
            status_code: None,
        })?;

        match body {
            ImgbbResponse {
                success: true,
                data: Some(data),
                ..
            } => Ok(data.url),
            ImgbbResponse { error, .. } => Err(PipelineError::Upload {
                message: error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "ImgBB upload failed".to_string()),
                status_code: Some(status.as_u16()),
            }),
        }
    }
}

/// Stages a copy of the image under a local directory.
pub struct LocalHost {
    dir: PathBuf,
}

impl LocalHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ImageHost for LocalHost {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(&self, input: &ImageInput) -> Result<String, PipelineError> {
        let to_upload_error = |message: String| PipelineError::Upload {
            message,
            status_code: None,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| to_upload_error(format!("Cannot create {}: {e}", self.dir.display())))?;

        // Content-addressed so re-staging the same bytes is idempotent
        let digest = Hasher::content_hash_from_bytes(&input.bytes);
        let path = self.dir.join(format!("{}-{}", &digest[..16], input.name));
        tokio::fs::write(&path, &input.bytes[..])
            .await
            .map_err(|e| to_upload_error(format!("Cannot write {}: {e}", path.display())))?;

        let path = tokio::fs::canonicalize(&path).await.unwrap_or(path);
        reqwest::Url::from_file_path(&path)
            .map(|url| url.to_string())
            .map_err(|_| to_upload_error(format!("Not an absolute path: {}", path.display())))
    }
}

/// Wraps a host with timeout and retry on transient failures.
#[derive(Clone)]
pub struct Uploader {
    host: Arc<dyn ImageHost>,
    retry_attempts: u32,
    retry_delay_ms: u64,
    timeout_ms: u64,
}

impl Uploader {
    pub fn new(host: Arc<dyn ImageHost>, config: &UploadConfig) -> Self {
        Self {
            host,
            retry_attempts: config.retry_attempts,
            retry_delay_ms: config.retry_delay_ms,
            timeout_ms: config.timeout_ms,
        }
    }

    pub fn host_name(&self) -> &str {
        self.host.name()
    }

    /// Upload, retrying timeouts, 429 and 5xx with exponential backoff.
    pub async fn upload(&self, input: &ImageInput) -> Result<String, PipelineError> {
        let mut last_error = None;
        for attempt in 0..=self.retry_attempts {
            if attempt > 0 {
                let delay = retry::backoff_duration(attempt - 1, self.retry_delay_ms);
                tracing::debug!(
                    "Retry {attempt}/{} uploading {} after {delay:?}",
                    self.retry_attempts,
                    input.name
                );
                tokio::time::sleep(delay).await;
            }

            let result = tokio::time::timeout(
                Duration::from_millis(self.timeout_ms),
                self.host.upload(input),
            )
            .await
            .unwrap_or_else(|_| {
                Err(PipelineError::Timeout {
                    name: input.name.clone(),
                    stage: "upload".to_string(),
                    timeout_ms: self.timeout_ms,
                })
            });

            match result {
                Ok(url) => {
                    tracing::debug!("Uploaded {} via {}: {url}", input.name, self.host.name());
                    return Ok(url);
                }
                Err(e) => {
                    let retryable = retry::is_retryable(&e);
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        // A timeout that exhausted retries still surfaces as an upload failure
        Err(match last_error {
            Some(e @ PipelineError::Upload { .. }) => e,
            Some(e) => PipelineError::Upload {
                message: e.to_string(),
                status_code: None,
            },
            None => PipelineError::Upload {
                message: "no upload attempt was made".to_string(),
                status_code: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockHost {
        response_fn: Box<dyn Fn(u32) -> Result<String, PipelineError> + Send + Sync>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ImageHost for MockHost {
        fn name(&self) -> &str {
            "mock"
        }

        async fn upload(&self, _input: &ImageInput) -> Result<String, PipelineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.response_fn)(n)
        }
    }

    fn config() -> UploadConfig {
        UploadConfig {
            retry_attempts: 2,
            retry_delay_ms: 1,
            ..UploadConfig::default()
        }
    }

    fn input() -> ImageInput {
        ImageInput::new("photo.png", "image/png", vec![0x89, b'P', b'N', b'G'], None)
    }

    fn uploader(
        f: impl Fn(u32) -> Result<String, PipelineError> + Send + Sync + 'static,
    ) -> (Uploader, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let host = MockHost {
            response_fn: Box::new(f),
            calls: calls.clone(),
        };
        (Uploader::new(Arc::new(host), &config()), calls)
    }

    #[tokio::test]
    async fn test_retries_transient_failure() {
        let (uploader, calls) = uploader(|n| {
            if n == 0 {
                Err(PipelineError::Upload {
                    message: "HTTP 503".to_string(),
                    status_code: Some(503),
                })
            } else {
                Ok("https://i.ibb.co/abc/photo.png".to_string())
            }
        });
        let url = uploader.upload(&input()).await.unwrap();
        assert_eq!(url, "https://i.ibb.co/abc/photo.png");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let (uploader, calls) = uploader(|_| {
            Err(PipelineError::Upload {
                message: "invalid key".to_string(),
                status_code: Some(400),
            })
        });
        let err = uploader.upload(&input()).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (uploader, calls) = uploader(|_| {
            Err(PipelineError::Upload {
                message: "HTTP 429".to_string(),
                status_code: Some(429),
            })
        });
        let err = uploader.upload(&input()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Upload { status_code: Some(429), .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_local_host_returns_readable_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalHost::new(dir.path().join("staged"));
        let url = host.upload(&input()).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("-photo.png"));

        let path = reqwest::Url::parse(&url).unwrap().to_file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), &input().bytes[..]);
    }

    #[test]
    fn test_resolve_env_var() {
        assert_eq!(resolve_env_var("plain-key").as_deref(), Some("plain-key"));
        assert_eq!(resolve_env_var(""), None);
        assert_eq!(resolve_env_var("${METAVISION_TEST_SURELY_UNSET_VAR}"), None);
    }

    #[test]
    fn test_imgbb_requires_key() {
        let config = UploadConfig {
            api_key: "${METAVISION_TEST_SURELY_UNSET_VAR}".to_string(),
            ..UploadConfig::default()
        };
        assert!(matches!(
            ImgbbHost::from_config(&config),
            Err(PipelineError::Upload { .. })
        ));
    }
}
