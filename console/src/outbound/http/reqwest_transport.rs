//! Reqwest-backed HTTP transport adapter.
//!
//! This adapter owns transport details only: base URL joining, headers,
//! timeouts, multipart encoding, and mapping reqwest failures. Status codes
//! are passed through untouched for the domain to interpret.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, Url};
use tracing::debug;

use super::upload_body::progress_stream;
use crate::domain::RequestId;
use crate::domain::ports::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, MultipartForm, ProgressReporter,
    RequestBody, TransportError,
};

const USER_AGENT: &str = concat!("clinic-console/", env!("CARGO_PKG_VERSION"));

/// Transport that sends every request beneath one API base URL.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base: Url,
}

impl ReqwestTransport {
    /// Build a transport for `base`, applying `timeout` to whole requests when
    /// given. A missing trailing slash is added so relative paths nest.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base: Url, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base: with_trailing_slash(base),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|err| TransportError::invalid_request(format!("bad path `{path}`: {err}")))
    }
}

fn with_trailing_slash(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let ApiRequest {
            method,
            path,
            query,
            body,
            bearer,
            request_id,
            progress,
        } = request;
        let url = self.endpoint(&path)?;

        let mut builder = self
            .client
            .request(map_method(method), url)
            .header(RequestId::HEADER, request_id.to_string())
            .header(ACCEPT, "application/json");
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token.expose());
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => builder.multipart(build_form(form, progress)?),
        };

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let content_type = header_text(response.headers(), CONTENT_TYPE);
        let file_name = header_text(response.headers(), CONTENT_DISPOSITION)
            .as_deref()
            .and_then(disposition_file_name);
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            debug!(
                status = status.as_u16(),
                body = %body_preview(body.as_ref()),
                "non-success response"
            );
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            content_type,
            file_name,
            body: body.to_vec(),
        })
    }
}

const fn map_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn build_form(
    form: MultipartForm,
    progress: Option<ProgressReporter>,
) -> Result<Form, TransportError> {
    let MultipartForm { fields, file } = form;
    let length = u64::try_from(file.bytes.len()).unwrap_or(u64::MAX);
    let part = match progress {
        Some(reporter) => Part::stream_with_length(
            Body::wrap_stream(progress_stream(file.bytes, reporter)),
            length,
        ),
        None => Part::bytes(file.bytes),
    }
    .file_name(file.file_name)
    .mime_str(&file.content_type)
    .map_err(|err| TransportError::invalid_request(format!("bad content type: {err}")))?;

    let mut multipart = Form::new().part(file.field, part);
    for (name, value) in fields {
        multipart = multipart.text(name, value);
    }
    Ok(multipart)
}

fn header_text(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// File name announced by a `Content-Disposition` header.
fn disposition_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("filename")
                .then(|| value.trim().trim_matches('"').to_owned())
        })
        .filter(|name| !name.is_empty())
}

fn map_transport_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else if error.is_builder() {
        TransportError::invalid_request(error.to_string())
    } else {
        TransportError::network(error.to_string())
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    //! URL joining and header parsing.

    use super::*;
    use rstest::rstest;

    fn transport(base: &str) -> ReqwestTransport {
        ReqwestTransport::new(Url::parse(base).expect("base url"), None).expect("client")
    }

    #[rstest]
    #[case("http://localhost:5000/api", "patients", "http://localhost:5000/api/patients")]
    #[case("http://localhost:5000/api/", "patients/5/status", "http://localhost:5000/api/patients/5/status")]
    #[case("https://clinic.test", "admins/all", "https://clinic.test/admins/all")]
    fn endpoints_nest_beneath_the_base(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        let url = transport(base).endpoint(path).expect("join");
        assert_eq!(url.as_str(), expected);
    }

    #[rstest]
    #[case("attachment; filename=\"report.pdf\"", Some("report.pdf"))]
    #[case("attachment; FILENAME=summary.pdf", Some("summary.pdf"))]
    #[case("inline", None)]
    #[case("attachment; filename=\"\"", None)]
    fn parses_content_disposition(#[case] header: &str, #[case] expected: Option<&str>) {
        assert_eq!(disposition_file_name(header).as_deref(), expected);
    }

    #[test]
    fn body_preview_truncates_and_compacts() {
        let long = "word ".repeat(100);
        let preview = body_preview(long.as_bytes());
        assert!(preview.ends_with("..."));
        assert_eq!(body_preview(b"  a \n b  "), "a b");
    }
}
