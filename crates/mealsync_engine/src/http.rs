//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so the engine
//! carries no network stack of its own. The CLI plugs in a blocking client;
//! tests plug in a scripted one.

use crate::connectivity::ReachabilityProbe;
use crate::transport::{ApiRequest, ApiResponse, MultipartForm, RemoteTransport, RequestBody, TransportError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const MULTIPART_BOUNDARY: &str = "mealsync-boundary-7f3c9e21";

/// A raw HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method name (`GET`, `POST`, ...).
    pub method: &'static str,
    /// Absolute URL including the query string.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Body bytes; empty for bodiless methods.
    pub body: Vec<u8>,
    /// Deadline for the whole exchange.
    pub timeout: Duration,
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implementations return every status as a response; `Err` means no
/// response was received (DNS, refused connection, reset, ...).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Executes a request.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client is usable.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// HTTP-based remote transport.
///
/// Uses JSON bodies, or `multipart/form-data` for uploads.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the API (e.g. "https://api.example.com/api").
    base_url: String,
    client: C,
    request_timeout: Duration,
    upload_timeout: Duration,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            request_timeout: Duration::from_secs(15),
            upload_timeout: Duration::from_secs(30),
            last_error: RwLock::new(None),
        }
    }

    /// Sets the JSON and upload deadlines.
    pub fn with_timeouts(mut self, request: Duration, upload: Duration) -> Self {
        self.request_timeout = request;
        self.upload_timeout = upload;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        let mut url = format!("{}{}", self.base_url, request.path);
        for (i, (key, value)) in request.query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&encode_component(key));
            url.push('=');
            url.push_str(&encode_component(value));
        }
        url
    }

    async fn build(&self, request: &ApiRequest) -> Result<HttpRequest, TransportError> {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(token) = &request.bearer {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        let body = match &request.body {
            RequestBody::Empty => Vec::new(),
            RequestBody::Json(value) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                serde_json::to_vec(value).map_err(|e| TransportError::Io(e.to_string()))?
            }
            RequestBody::Multipart(form) => {
                headers.push((
                    "Content-Type".to_string(),
                    format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
                ));
                encode_multipart(form).await?
            }
        };

        let timeout = if request.is_upload() {
            self.upload_timeout
        } else {
            self.request_timeout
        };

        Ok(HttpRequest {
            method: request.method.as_str(),
            url: self.url_for(request),
            headers,
            body,
            timeout,
        })
    }
}

#[async_trait]
impl<C: HttpClient> RemoteTransport for HttpTransport<C> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        if !self.client.is_healthy() {
            return Err(TransportError::Unreachable("http client unavailable".into()));
        }

        let http = self.build(&request).await?;
        let deadline = http.timeout;
        debug!(method = http.method, url = %http.url, "sending request");

        let response = match tokio::time::timeout(deadline, self.client.execute(http)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.set_error(&e);
                return Err(TransportError::Unreachable(e));
            }
            Err(_) => {
                self.set_error("timed out");
                return Err(TransportError::Timeout(deadline));
            }
        };

        self.clear_error();
        let body = if response.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&response.body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&response.body).into_owned())
            })
        };
        Ok(ApiResponse::new(response.status, body))
    }
}

#[async_trait]
impl<C: HttpClient> ReachabilityProbe for HttpTransport<C> {
    async fn probe(&self) -> bool {
        matches!(self.send(ApiRequest::get("/health")).await, Ok(r) if r.status < 500)
    }
}

async fn encode_multipart(form: &MultipartForm) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    for (name, value) in &form.fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    if let Some(file) = &form.file {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| TransportError::Io(format!("{}: {e}", file.path)))?;
        let filename = std::path::Path::new(&file.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\nContent-Type: {}\r\n\r\n",
                file.field, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(&bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    Ok(body)
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
