//! Control-plane API client.
//!
//! The control plane owns upload sessions: it opens them, signs one
//! storage target per part and assembles the final object.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use cinevision_protocol::{
    AbortMultipartRequest, CompleteMultipartRequest, CompleteMultipartResponse,
    InitiateMultipartRequest, InitiateMultipartResponse, PresignedUrlRequest, PresignedUrlResponse,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::TransportError;

/// Boxed future returned by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Session operations exposed by the control plane.
pub trait ControlPlane: Send + Sync {
    fn initiate(
        &self,
        req: InitiateMultipartRequest,
    ) -> BoxFuture<'_, Result<InitiateMultipartResponse, TransportError>>;

    /// Returns a presigned storage target for one part.
    fn presigned_url(&self, req: PresignedUrlRequest)
    -> BoxFuture<'_, Result<String, TransportError>>;

    fn complete(
        &self,
        req: CompleteMultipartRequest,
    ) -> BoxFuture<'_, Result<CompleteMultipartResponse, TransportError>>;

    fn abort(&self, req: AbortMultipartRequest) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// [`ControlPlane`] over HTTP/JSON.
pub struct HttpControlPlane {
    http: reqwest::Client,
    base_url: String,
}

impl HttpControlPlane {
    /// Creates a client for `base_url` (e.g. `http://localhost:3001/api/v1`).
    ///
    /// A `token` is sent as a bearer credential on every request.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::Other(format!("invalid API token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/content-language-upload/{action}", self.base_url)
    }

    async fn post<T: Serialize>(&self, action: &str, body: &T) -> Result<Vec<u8>, TransportError> {
        let url = self.endpoint(action);
        debug!(%url, "control plane request");

        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        action: &str,
        body: &T,
    ) -> Result<R, TransportError> {
        let bytes = self.post(action, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl ControlPlane for HttpControlPlane {
    fn initiate(
        &self,
        req: InitiateMultipartRequest,
    ) -> BoxFuture<'_, Result<InitiateMultipartResponse, TransportError>> {
        Box::pin(async move { self.post_json("initiate-multipart", &req).await })
    }

    fn presigned_url(
        &self,
        req: PresignedUrlRequest,
    ) -> BoxFuture<'_, Result<String, TransportError>> {
        Box::pin(async move {
            let resp: PresignedUrlResponse = self.post_json("presigned-url", &req).await?;
            Ok(resp.url)
        })
    }

    fn complete(
        &self,
        req: CompleteMultipartRequest,
    ) -> BoxFuture<'_, Result<CompleteMultipartResponse, TransportError>> {
        Box::pin(async move { self.post_json("complete-multipart", &req).await })
    }

    fn abort(&self, req: AbortMultipartRequest) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.post("abort-multipart", &req).await?;
            Ok(())
        })
    }
}
