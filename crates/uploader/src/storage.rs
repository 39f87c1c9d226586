use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, ETAG};
use tracing::trace;

use crate::control_plane::BoxFuture;
use crate::error::TransportError;

/// Object storage accepting part bodies at presigned targets.
pub trait PartStore: Send + Sync {
    /// Uploads one part body and returns the integrity tag storage assigned.
    fn put_part(&self, url: String, body: Bytes) -> BoxFuture<'_, Result<String, TransportError>>;
}

/// [`PartStore`] that PUTs raw bytes to presigned URLs.
///
/// Presigned URLs carry their own authorization, so no credential is sent.
pub struct HttpPartStore {
    http: reqwest::Client,
}

impl HttpPartStore {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

impl PartStore for HttpPartStore {
    fn put_part(&self, url: String, body: Bytes) -> BoxFuture<'_, Result<String, TransportError>> {
        Box::pin(async move {
            let len = body.len();
            let resp = self
                .http
                .put(&url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(body)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let etag = resp
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(normalize_etag)
                .filter(|t| !t.is_empty())
                .ok_or(TransportError::MissingEtag)?;
            trace!(bytes = len, %etag, "part stored");
            Ok(etag)
        })
    }
}

/// Strips the quotes storage wraps around entity tags.
pub fn normalize_etag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}
