//! Requests and responses flowing through the cache controller.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Value of the `Content-Type` header for synthesized JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An outgoing request as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Absolute URL, or a path relative to the application origin
    pub url: String,
    pub method: String,
    /// `Accept` header, if any
    pub accept: Option<String>,
}

impl Request {
    /// A plain GET for a subresource.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            accept: None,
        }
    }

    /// A top-level page navigation.
    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            accept: Some("text/html,application/xhtml+xml".to_string()),
            ..Self::get(url)
        }
    }

    /// Whether the caller asked for an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.accept
            .as_deref()
            .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// A response, either fetched, cached or synthesized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Structured JSON error body, e.g. `{"error":"Network unavailable"}`.
    pub fn json_error(message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(200, body).with_header("content-type", JSON_CONTENT_TYPE)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Only complete 200 responses are written to the runtime store.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Network,
    Cache,
    /// The application shell substituted for an offline navigation
    Shell,
    /// Built by the controller because the network was unreachable
    Synthesized,
}

/// The controller's decision for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Not intercepted; the caller uses its default network path.
    Passthrough,
    Responded {
        response: Response,
        served_from: ServedFrom,
    },
}

/// Commands a host page can send to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Activate a waiting version now.
    SkipWaiting,
    /// Delete every store.
    ClearCaches,
}

/// Lifecycle state of one controller version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    /// Installed, waiting for an explicit takeover signal
    Waiting,
    Active,
    /// Install failed or a newer version took over
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        })
    }
}

mod base64_body {
    use super::*;

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
