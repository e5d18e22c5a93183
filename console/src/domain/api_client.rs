//! Transport layer: every API call goes through [`ApiClient`].
//!
//! The client attaches the session's bearer token, tags the request with a
//! [`RequestId`](super::RequestId) span, and turns responses into domain
//! results. A 401 for a request that carried the session's own token ends
//! that session through the guard, so concurrent 401s collapse into one
//! sign-out. Requests with an explicit bearer never end the session.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info_span, warn};

use super::ports::{ApiRequest, ApiResponse, HttpTransport};
use super::{Error, SessionGuard};

const UNAUTHORIZED: u16 = 401;

/// Authenticated gateway to the clinic API.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionGuard>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Route requests through `transport`, authenticated by `session`.
    pub fn new(transport: Arc<dyn HttpTransport>, session: Arc<SessionGuard>) -> Self {
        Self { transport, session }
    }

    /// Session guard used for bearer tokens and 401 handling.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionGuard> {
        &self.session
    }

    /// Send `request` and return the successful response.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::Unauthorized`](super::ErrorCode::Unauthorized) when a
    ///   session request is rejected with 401 (the session has been ended).
    /// - [`ErrorCode::Server`](super::ErrorCode::Server) for other non-2xx
    ///   statuses, including 401 on anonymous requests such as login and on
    ///   requests carrying their own bearer.
    /// - [`ErrorCode::Transport`](super::ErrorCode::Transport) when no
    ///   response arrived.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, Error> {
        let epoch = match (request.bearer.is_none(), self.session.credential()) {
            (true, Some(held)) => {
                request.bearer = Some(held.token().clone());
                Some(held.epoch())
            }
            _ => None,
        };

        let span = info_span!(
            "api_request",
            method = %request.method,
            path = %request.path,
            request_id = %request.request_id,
        );
        let response = async {
            debug!(authenticated = request.bearer.is_some(), "dispatching request");
            self.transport.execute(request).await
        }
        .instrument(span.clone())
        .await
        .map_err(|err| {
            span.in_scope(|| warn!(error = %err, "request failed without a response"));
            Error::from(err)
        })?;

        if response.is_success() {
            span.in_scope(|| debug!(status = response.status, "request succeeded"));
            return Ok(response);
        }

        let message = server_message(&response);
        if response.status == UNAUTHORIZED {
            if let Some(epoch) = epoch {
                span.in_scope(|| warn!("unauthorized response; ending session"));
                self.session.expire(epoch);
                return Err(Error::unauthorized(message));
            }
        }
        span.in_scope(|| debug!(status = response.status, %message, "server rejected request"));
        Err(Error::server(response.status, message))
    }

    /// Send `request` and decode a JSON body.
    ///
    /// # Errors
    ///
    /// As [`Self::send`], plus [`ErrorCode::Decode`](super::ErrorCode::Decode)
    /// when the body is not the expected JSON.
    pub async fn json<T>(&self, request: ApiRequest) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let response = self.send(request).await?;
        decode_json(&response)
    }

    /// Send `request` and discard the body.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub async fn empty(&self, request: ApiRequest) -> Result<(), Error> {
        self.send(request).await.map(drop)
    }
}

/// Decode a JSON response body.
pub(crate) fn decode_json<T>(response: &ApiResponse) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(&response.body).map_err(|err| {
        Error::decode(format!("unexpected response body: {err}")).with_status(response.status)
    })
}

/// Message the server attached to a failed response.
///
/// Looks at `message`, then `msg`, then `error`, and falls back to a generic
/// text naming the status.
pub(crate) fn server_message(response: &ApiResponse) -> String {
    serde_json::from_slice::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|body| {
            ["message", "msg", "error"].into_iter().find_map(|field| {
                body.get(field)
                    .and_then(serde_json::Value::as_str)
                    .filter(|text| !text.trim().is_empty())
                    .map(str::to_owned)
            })
        })
        .unwrap_or_else(|| format!("request failed with status {}", response.status))
}
