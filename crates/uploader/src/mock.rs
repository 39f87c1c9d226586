//! Test doubles: in-memory control plane and storage, plus a canned
//! HTTP server for exercising the real transports.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use cinevision_protocol::{
    AbortMultipartRequest, CompleteMultipartRequest, CompleteMultipartResponse, CompletionData,
    InitiateMultipartRequest, InitiateMultipartResponse, PresignedUrlRequest,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::control_plane::{BoxFuture, ControlPlane};
use crate::error::TransportError;
use crate::storage::PartStore;

pub const UPLOAD_ID: &str = "upload-1";

fn part_of(url: &str) -> u32 {
    url.split("/part/")
        .nth(1)
        .and_then(|rest| rest.split('?').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[derive(Default)]
pub struct MockControlPlane {
    /// Return one URL per part from `initiate`.
    pub upfront_urls: bool,
    /// Number of upfront URLs to hand out instead of one per part.
    pub url_count: Option<u32>,
    pub initiate_error: Option<TransportError>,
    pub complete_script: Mutex<VecDeque<Result<CompleteMultipartResponse, TransportError>>>,
    pub abort_error: Option<TransportError>,
    pub calls: Mutex<Vec<String>>,
    pub initiated: Mutex<Vec<InitiateMultipartRequest>>,
    pub completed: Mutex<Vec<CompleteMultipartRequest>>,
    /// Time `complete` takes before answering.
    pub complete_delay: Option<Duration>,
    pub signatures: AtomicUsize,
}

impl MockControlPlane {
    pub fn lazy() -> Self {
        Self::default()
    }

    pub fn upfront() -> Self {
        Self {
            upfront_urls: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn push_complete(&self, result: Result<CompleteMultipartResponse, TransportError>) {
        self.complete_script.lock().unwrap().push_back(result);
    }

    fn sign(&self, part_number: u32) -> String {
        let sig = self.signatures.fetch_add(1, Ordering::SeqCst);
        format!("mem://{UPLOAD_ID}/part/{part_number}?sig={sig}")
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ControlPlane for MockControlPlane {
    fn initiate(
        &self,
        req: InitiateMultipartRequest,
    ) -> BoxFuture<'_, Result<InitiateMultipartResponse, TransportError>> {
        Box::pin(async move {
            self.record("initiate".into());
            self.initiated.lock().unwrap().push(req.clone());
            if let Some(err) = &self.initiate_error {
                return Err(err.clone());
            }
            let chunk = req.chunk_size.unwrap_or(req.file_size).max(1);
            let total = req.file_size.div_ceil(chunk) as u32;
            let presigned_urls = if self.upfront_urls {
                (1..=self.url_count.unwrap_or(total))
                    .map(|n| self.sign(n))
                    .collect()
            } else {
                Vec::new()
            };
            Ok(InitiateMultipartResponse {
                upload_id: UPLOAD_ID.into(),
                key: None,
                storage_key: Some(format!("videos/{}", req.file_name)),
                presigned_urls,
                total_parts: Some(total),
            })
        })
    }

    fn presigned_url(
        &self,
        req: PresignedUrlRequest,
    ) -> BoxFuture<'_, Result<String, TransportError>> {
        Box::pin(async move {
            self.record(format!("presign:{}", req.part_number));
            Ok(self.sign(req.part_number))
        })
    }

    fn complete(
        &self,
        req: CompleteMultipartRequest,
    ) -> BoxFuture<'_, Result<CompleteMultipartResponse, TransportError>> {
        Box::pin(async move {
            self.record("complete".into());
            self.completed.lock().unwrap().push(req);
            if let Some(delay) = self.complete_delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.complete_script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(CompleteMultipartResponse {
                    success: true,
                    message: None,
                    data: Some(CompletionData {
                        video_url: Some("https://cdn.example/videos/a.mp4".into()),
                        processing_status: Some("processing".into()),
                    }),
                    video_url: None,
                    file_name: Some("a.mp4".into()),
                })
            })
        })
    }

    fn abort(&self, _req: AbortMultipartRequest) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.record("abort".into());
            match &self.abort_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        })
    }
}

#[derive(Default)]
pub struct MockStore {
    /// Scripted failures per part number; consumed before succeeding.
    pub failures: Mutex<HashMap<u32, VecDeque<TransportError>>>,
    /// Parts whose upload never finishes.
    pub hang_on: Option<u32>,
    /// Simulated transfer time per part.
    pub latency: Option<Duration>,
    pub puts: Mutex<Vec<(String, usize)>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockStore {
    pub fn fail(&self, part_number: u32, errors: impl IntoIterator<Item = TransportError>) {
        self.failures
            .lock()
            .unwrap()
            .entry(part_number)
            .or_default()
            .extend(errors);
    }

    pub fn put_count(&self, part_number: u32) -> usize {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| part_of(url) == part_number)
            .count()
    }

    pub fn urls_for(&self, part_number: u32) -> Vec<String> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| part_of(url) == part_number)
            .map(|(url, _)| url.clone())
            .collect()
    }
}

pub fn server_error() -> TransportError {
    TransportError::Status {
        status: 500,
        body: "internal error".into(),
    }
}

pub fn forbidden() -> TransportError {
    TransportError::Status {
        status: 403,
        body: "Request has expired".into(),
    }
}

impl PartStore for MockStore {
    fn put_part(&self, url: String, body: Bytes) -> BoxFuture<'_, Result<String, TransportError>> {
        Box::pin(async move {
            let part = part_of(&url);
            self.puts.lock().unwrap().push((url, body.len()));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.hang_on == Some(part) {
                std::future::pending::<()>().await;
            }
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let scripted = self
                .failures
                .lock()
                .unwrap()
                .get_mut(&part)
                .and_then(|q| q.pop_front());
            match scripted {
                Some(err) => Err(err),
                None => Ok(format!("etag-{part}")),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Canned HTTP server
// ---------------------------------------------------------------------------

/// Builds a raw HTTP/1.1 response.
pub fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!(
        "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n",
        body.len()
    );
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}

/// Serves a single connection, answering its request with `response`.
///
/// Returns the base URL and a handle resolving to the raw request.
pub async fn serve_once(response: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let request = read_request(&mut sock).await;
        sock.write_all(response.as_bytes()).await.unwrap();
        let _ = sock.shutdown().await;
        request
    });
    (base, handle)
}

/// Accepts one request and never answers it.
pub async fn serve_stalled() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_request(&mut sock).await;
        std::future::pending::<()>().await;
    });
    (base, handle)
}

/// Base URL of a port nothing listens on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    base
}

async fn read_request(sock: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
