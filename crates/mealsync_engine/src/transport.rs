//! Transport layer abstraction for remote API calls.

use async_trait::async_trait;
use mealsync_protocol::{ApiEnvelope, HttpMethod};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure to get any HTTP response at all.
///
/// The gateway treats these as "offline" and degrades to local handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// DNS failure, refused or reset connection, no route.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// No response within the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Local I/O failed while building or sending the request.
    #[error("transport i/o error: {0}")]
    Io(String),
}

/// A file attached to a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name.
    pub field: String,
    /// Path of the file on this device.
    pub path: String,
    /// MIME type.
    pub content_type: String,
}

/// A `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    /// Text fields, in order.
    pub fields: Vec<(String, String)>,
    /// Optional file part.
    pub file: Option<FilePart>,
}

impl MultipartForm {
    /// Builds a form from a flat JSON object, stringifying non-string values.
    pub fn from_object(payload: &Value) -> Self {
        let fields = payload
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| {
                        let text = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), text)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { fields, file: None }
    }

    /// Attaches a file.
    pub fn with_file(mut self, field: &str, path: &str) -> Self {
        self.file = Some(FilePart {
            field: field.to_string(),
            path: path.to_string(),
            content_type: guess_content_type(path).to_string(),
        });
        self
    }
}

fn guess_content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "image/jpeg",
    }
}

/// Body of an API request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// JSON document.
    Json(Value),
    /// Form upload.
    Multipart(MultipartForm),
}

/// A transport-agnostic API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path relative to the server URL, e.g. `/meals/65f0c1`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Bearer token, attached by the gateway.
    pub bearer: Option<String>,
    /// Request body.
    pub body: RequestBody,
}

impl ApiRequest {
    /// Creates a request without a body.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body: RequestBody::Empty,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// `POST path` with a JSON body.
    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(RequestBody::Json(body))
    }

    /// `PUT path` with a JSON body.
    pub fn put_json(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(RequestBody::Json(body))
    }

    /// `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Appends a query parameter.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Sets the bearer token.
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    /// Returns true for multipart uploads, which get the longer timeout.
    pub fn is_upload(&self) -> bool {
        matches!(self.body, RequestBody::Multipart(_))
    }
}

/// An HTTP response with a decoded JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body; non-JSON bodies are carried as a string.
    pub body: Value,
}

impl ApiResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as an envelope.
    ///
    /// # Errors
    ///
    /// Returns the decode error if the body does not match.
    pub fn envelope<T: DeserializeOwned>(&self) -> Result<ApiEnvelope<T>, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }

    /// Returns the server's `message` field, if any.
    pub fn message(&self) -> Option<String> {
        match &self.body {
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// A remote transport sends API requests to the backend.
///
/// This trait abstracts the network layer so the gateway can run against
/// a real HTTP client or the in-process [`MockTransport`].
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Sends a request and returns whatever the server answered.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only if no response was received.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T: RemoteTransport + ?Sized> RemoteTransport for Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).send(request).await
    }
}

type Responder = Arc<dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync>;

/// A scripted transport for testing.
///
/// Answers every request through a responder closure and records what it
/// was sent. While disconnected every call fails with
/// [`TransportError::Unreachable`].
pub struct MockTransport {
    connected: AtomicBool,
    latency: Mutex<Duration>,
    responder: Mutex<Responder>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    /// Creates a connected mock that answers 404 to everything.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            responder: Mutex::new(Arc::new(|_| {
                Ok(ApiResponse::new(
                    404,
                    serde_json::json!({ "success": false, "message": "no mock response set" }),
                ))
            })),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the connected state.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Delays every response.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Replaces the responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        *self.responder.lock() = Arc::new(responder);
    }

    /// Returns every request sent so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests hit `method path`.
    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Forgets recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !self.is_connected() {
            return Err(TransportError::Unreachable("mock transport disconnected".into()));
        }
        self.requests.lock().push(request.clone());
        let responder = self.responder.lock().clone();
        responder(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());

        transport.set_connected(false);
        let result = transport.send(ApiRequest::get("/meals")).await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn mock_transport_responder() {
        let transport = MockTransport::new();
        transport.set_responder(|req| {
            Ok(ApiResponse::new(200, json!({ "success": true, "data": req.path })))
        });

        let response = transport
            .send(ApiRequest::delete("/meals/abc"))
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.body["data"], "/meals/abc");
        assert_eq!(transport.count(HttpMethod::Delete, "/meals/abc"), 1);
    }

    #[test]
    fn response_message() {
        let response = ApiResponse::new(400, json!({ "success": false, "message": "Title is required" }));
        assert!(!response.is_success());
        assert_eq!(response.message().as_deref(), Some("Title is required"));

        let envelope: ApiEnvelope<Value> = response.envelope().unwrap();
        assert!(!envelope.success);
    }

    #[test]
    fn multipart_from_payload() {
        let form = MultipartForm::from_object(&json!({
            "title": "Salad",
            "calories": 420,
            "imagePath": null
        }))
        .with_file("image", "/tmp/salad.PNG");

        assert!(form.fields.contains(&("title".into(), "Salad".into())));
        assert!(form.fields.contains(&("calories".into(), "420".into())));
        assert_eq!(form.fields.len(), 2);
        assert_eq!(form.file.unwrap().content_type, "image/png");
    }

    #[test]
    fn request_builders() {
        let req = ApiRequest::get("/meals")
            .with_query("page", 2)
            .with_bearer(Some("tok".into()));
        assert_eq!(req.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(req.bearer.as_deref(), Some("tok"));
        assert!(!req.is_upload());

        let upload = ApiRequest::new(HttpMethod::Post, "/meals")
            .with_body(RequestBody::Multipart(MultipartForm::default()));
        assert!(upload.is_upload());
    }
}
