//! Driven port that carries API requests to the clinic server.
//!
//! The domain builds an [`ApiRequest`] with a path relative to the API base,
//! the session guard's bearer token, and a [`RequestId`]. Adapters own the
//! base URL, timeouts, and wire encoding. Non-2xx statuses are returned as
//! ordinary [`ApiResponse`]s; only failures to obtain a response are errors.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::define_port_error;
use crate::domain::{AccessToken, RequestId, UploadProgress};

/// HTTP verb used by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        })
    }
}

/// File part of a multipart form.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name.
    pub field: String,
    /// File name announced to the server.
    pub file_name: String,
    /// MIME type of the contents.
    pub content_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Multipart form with text fields and one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    /// Text fields in submission order.
    pub fields: Vec<(String, String)>,
    /// The uploaded file.
    pub file: FilePart,
}

impl MultipartForm {
    /// Value of the first text field called `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// JSON document.
    Json(serde_json::Value),
    /// Multipart form upload.
    Multipart(MultipartForm),
}

/// Publishes upload progress while a body is being sent.
#[derive(Debug, Clone)]
pub struct ProgressReporter(Arc<watch::Sender<UploadProgress>>);

impl ProgressReporter {
    /// Report through `sender`.
    #[must_use]
    pub const fn new(sender: Arc<watch::Sender<UploadProgress>>) -> Self {
        Self(sender)
    }

    /// Record that `sent` of `total` bytes have left the client.
    pub fn report(&self, sent: u64, total: u64) {
        let next = UploadProgress::from_bytes(sent, total);
        self.0.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// One API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Verb.
    pub method: HttpMethod,
    /// Path relative to the API base, without a leading slash.
    pub path: String,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Payload.
    pub body: RequestBody,
    /// Bearer token to send, if any.
    pub bearer: Option<AccessToken>,
    /// Correlation identifier.
    pub request_id: RequestId,
    /// Progress sink for uploads.
    pub progress: Option<ProgressReporter>,
}

impl ApiRequest {
    /// Start a request with a fresh [`RequestId`].
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            path: path.trim_start_matches('/').to_owned(),
            query: Vec::new(),
            body: RequestBody::Empty,
            bearer: None,
            request_id: RequestId::generate(),
            progress: None,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// `POST path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// `PATCH path`.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    /// `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Append a query pair.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Send `value` as the JSON body.
    #[must_use]
    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    /// Send `form` as a multipart body.
    #[must_use]
    pub fn with_multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Use `token` instead of the session token.
    #[must_use]
    pub fn with_bearer(mut self, token: AccessToken) -> Self {
        self.bearer = Some(token);
        self
    }

    /// Report body progress through `reporter`.
    #[must_use]
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }
}

/// What the server answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header value.
    pub content_type: Option<String>,
    /// File name from `Content-Disposition`, when present.
    pub file_name: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Response with a status and body and no notable headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            file_name: None,
            body: body.into(),
        }
    }

    /// JSON response.
    #[must_use]
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            content_type: Some("application/json".to_owned()),
            ..Self::new(status, value.to_string())
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

define_port_error! {
    /// Errors raised when no response could be obtained.
    pub enum TransportError {
        /// Connection, TLS, or I/O failure.
        Network { message: String } => Transport, "network error: {message}",
        /// The request timed out.
        Timeout { message: String } => Transport, "request timed out: {message}",
        /// The request could not be built.
        InvalidRequest { message: String } => Internal, "invalid request: {message}",
    }
}

/// Execute API requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` and return whatever the server answered.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    //! Request building and progress publication.

    use super::*;

    #[test]
    fn paths_are_relative_to_the_api_base() {
        let request = ApiRequest::get("/patients").with_query("status", "approved");
        assert_eq!(request.path, "patients");
        assert_eq!(request.query, vec![("status".to_owned(), "approved".to_owned())]);
    }

    #[test]
    fn progress_reporter_publishes_percentages_once() {
        let (sender, mut receiver) = watch::channel(UploadProgress::default());
        let reporter = ProgressReporter::new(Arc::new(sender));

        reporter.report(512, 1024);
        assert!(receiver.has_changed().expect("sender alive"));
        assert_eq!(receiver.borrow_and_update().percent(), 50);

        reporter.report(513, 1024);
        assert!(!receiver.has_changed().expect("sender alive"));
    }

    #[test]
    fn success_covers_the_2xx_range() {
        assert!(ApiResponse::new(204, Vec::new()).is_success());
        assert!(!ApiResponse::new(301, Vec::new()).is_success());
        assert!(!ApiResponse::new(401, Vec::new()).is_success());
    }
}
