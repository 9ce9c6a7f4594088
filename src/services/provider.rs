use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyResponse,
    #[error("response contained no image data")]
    MissingImage,
}

impl ProviderError {
    /// Transport-level failures, as opposed to a reply we could not use.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(_) | Self::HttpStatus { .. })
    }
}

pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

pub fn env_u32(key: &str) -> Option<u32> {
    env_string(key)?.parse().ok()
}

pub fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| {
        let v = v.trim().to_ascii_lowercase();
        v == "true" || v == "1" || v == "yes"
    })
}

/// Reads a response body for error reporting, capped so huge HTML error pages
/// do not end up in logs.
pub async fn error_body(resp: reqwest::Response) -> String {
    const MAX_ERROR_BODY: usize = 2_000;
    let body = resp.text().await.unwrap_or_default();
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
