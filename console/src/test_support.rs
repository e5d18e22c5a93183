//! Scripted doubles for integration tests.
//!
//! Only compiled with the `test-support` feature. The doubles implement the
//! driven ports in memory so behaviour tests can wire a real
//! [`ClinicConsole`] without a server or a download directory.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mockable::DefaultClock;
use serde_json::json;
use tokio::sync::Notify;

use crate::domain::ports::{
    ApiRequest, ApiResponse, Artifact, ArtifactStore, ArtifactStoreError, HttpMethod,
    HttpTransport, RequestBody, SavedArtifact, SignOutListener, SignOutReason, TransportError,
};
use crate::domain::{AccessToken, CacheOptions, ClinicConsole, Role, SessionUser, UserId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Route {
    method: HttpMethod,
    path: String,
    responses: VecDeque<Result<ApiResponse, TransportError>>,
    last_served: bool,
}

/// In-memory [`HttpTransport`] answering from per-route response queues.
///
/// Each route replays its queued responses in order and keeps repeating the
/// last one until another response is scripted for it. Requests without a
/// route get a JSON 404. Multipart requests carrying a progress reporter
/// report half-way and full progress before the response is returned.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<ApiRequest>>,
    holds: Mutex<Vec<(HttpMethod, String, Arc<Notify>)>>,
}

impl ScriptedTransport {
    /// Transport with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for `method path`.
    pub fn respond(&self, method: HttpMethod, path: &str, response: ApiResponse) {
        self.push(method, path, Ok(response));
    }

    /// Queue a JSON response for `method path`.
    pub fn respond_json(&self, method: HttpMethod, path: &str, status: u16, body: serde_json::Value) {
        self.respond(method, path, ApiResponse::json(status, &body));
    }

    /// Queue a transport failure for `method path`.
    pub fn fail(&self, method: HttpMethod, path: &str, error: TransportError) {
        self.push(method, path, Err(error));
    }

    fn push(&self, method: HttpMethod, path: &str, outcome: Result<ApiResponse, TransportError>) {
        let path = path.trim_start_matches('/');
        let mut routes = lock(&self.routes);
        if let Some(route) = routes
            .iter_mut()
            .find(|route| route.method == method && route.path == path)
        {
            if route.last_served {
                route.responses.clear();
                route.last_served = false;
            }
            route.responses.push_back(outcome);
            return;
        }
        routes.push(Route {
            method,
            path: path.to_owned(),
            responses: VecDeque::from([outcome]),
            last_served: false,
        });
    }

    /// Park requests to `method path` after they are recorded until the
    /// returned handle is notified once per request.
    pub fn hold(&self, method: HttpMethod, path: &str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        lock(&self.holds).push((
            method,
            path.trim_start_matches('/').to_owned(),
            Arc::clone(&release),
        ));
        release
    }

    fn hold_for(&self, request: &ApiRequest) -> Option<Arc<Notify>> {
        lock(&self.holds)
            .iter()
            .find(|(method, path, _)| *method == request.method && *path == request.path)
            .map(|(_, _, release)| Arc::clone(release))
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.requests).clone()
    }

    /// Requests received for `method path`.
    #[must_use]
    pub fn requests_to(&self, method: HttpMethod, path: &str) -> Vec<ApiRequest> {
        let path = path.trim_start_matches('/');
        lock(&self.requests)
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .cloned()
            .collect()
    }

    /// Number of requests received for `method path`.
    #[must_use]
    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    fn answer(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut routes = lock(&self.routes);
        let Some(route) = routes
            .iter_mut()
            .find(|route| route.method == request.method && route.path == request.path)
        else {
            return Ok(ApiResponse::json(
                404,
                &json!({ "message": format!("no route for {} {}", request.method, request.path) }),
            ));
        };
        if route.responses.len() > 1 {
            if let Some(next) = route.responses.pop_front() {
                return next;
            }
        }
        route.last_served = true;
        route
            .responses
            .front()
            .cloned()
            .unwrap_or_else(|| Ok(ApiResponse::new(204, Vec::new())))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        if let (RequestBody::Multipart(form), Some(progress)) = (&request.body, &request.progress) {
            let total = u64::try_from(form.file.bytes.len()).unwrap_or(u64::MAX);
            progress.report(total / 2, total);
            progress.report(total, total);
        }
        lock(&self.requests).push(request.clone());
        if let Some(release) = self.hold_for(&request) {
            release.notified().await;
        }
        self.answer(&request)
    }
}

/// [`SignOutListener`] recording every notification.
#[derive(Debug, Default)]
pub struct RecordingSignOutListener {
    reasons: Mutex<Vec<SignOutReason>>,
}

impl RecordingSignOutListener {
    /// Notifications received so far.
    #[must_use]
    pub fn reasons(&self) -> Vec<SignOutReason> {
        lock(&self.reasons).clone()
    }
}

impl SignOutListener for RecordingSignOutListener {
    fn signed_out(&self, reason: SignOutReason) {
        lock(&self.reasons).push(reason);
    }
}

/// [`ArtifactStore`] keeping saved files in memory.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    saved: Mutex<Vec<Artifact>>,
}

impl MemoryArtifactStore {
    /// Artefacts saved so far.
    #[must_use]
    pub fn saved(&self) -> Vec<Artifact> {
        lock(&self.saved).clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn save(&self, artifact: Artifact) -> Result<SavedArtifact, ArtifactStoreError> {
        if artifact.file_name.trim().is_empty() {
            return Err(ArtifactStoreError::invalid_name(artifact.file_name));
        }
        let saved = SavedArtifact {
            file_name: artifact.file_name.clone(),
            location: PathBuf::from("memory").join(&artifact.file_name),
            size: u64::try_from(artifact.bytes.len()).unwrap_or(u64::MAX),
        };
        lock(&self.saved).push(artifact);
        Ok(saved)
    }
}

/// A console wired to scripted doubles, plus handles on each double.
#[derive(Debug, Clone)]
pub struct ScriptedConsole {
    /// Console under test.
    pub console: ClinicConsole,
    /// Scripted server.
    pub transport: Arc<ScriptedTransport>,
    /// Sign-out notifications seen after the cache purge.
    pub redirects: Arc<RecordingSignOutListener>,
    /// Saved downloads.
    pub artifacts: Arc<MemoryArtifactStore>,
}

impl ScriptedConsole {
    /// Signed-out console with empty doubles and no cache expiry.
    #[must_use]
    pub fn new() -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let redirects = Arc::new(RecordingSignOutListener::default());
        let artifacts = Arc::new(MemoryArtifactStore::default());
        let console = ClinicConsole::new(
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
            Arc::clone(&redirects) as Arc<dyn SignOutListener>,
            CacheOptions {
                clock: Arc::new(DefaultClock),
                max_age: None,
            },
        );
        Self {
            console,
            transport,
            redirects,
            artifacts,
        }
    }

    /// Sign in with `role` holding `token` without contacting the server.
    ///
    /// # Panics
    ///
    /// Panics when `token` is blank.
    pub fn sign_in(&self, token: &str, role: Role) {
        let Some(token) = AccessToken::new(token) else {
            panic!("token must not be blank");
        };
        let name = match role {
            Role::Admin => "Ada Admin",
            Role::Staff => "Dana Staff",
            Role::Patient => "Pat Patient",
        };
        self.console
            .session()
            .set_auth(token, SessionUser::new(UserId::from(1), name, role));
    }
}

impl Default for ScriptedConsole {
    fn default() -> Self {
        Self::new()
    }
}
