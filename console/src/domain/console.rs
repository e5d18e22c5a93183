//! Composition root for the console's domain services.
//!
//! [`ClinicConsole`] owns the one session guard, API client, and query
//! cache shared by every service, and wires sign-out so the cache is purged
//! before the caller's redirect runs.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use query_cache::CacheEvent;
use tokio::sync::broadcast;

use super::ports::{ArtifactStore, HttpTransport, SignOutListener, SignOutReason};
use super::{
    AdminDirectory, ApiClient, AuthService, ConsoleCache, DocumentPipeline, PatientDirectory,
    PatientId, SessionGuard, TransferGates,
};

/// Clears cached data, then forwards the sign-out to the presentation layer.
struct PurgeThenRedirect {
    cache: ConsoleCache,
    redirect: Arc<dyn SignOutListener>,
}

impl SignOutListener for PurgeThenRedirect {
    fn signed_out(&self, reason: SignOutReason) {
        self.cache.clear();
        self.redirect.signed_out(reason);
    }
}

/// Cache behaviour knobs.
#[derive(Clone)]
pub struct CacheOptions {
    /// Clock used to stamp cached entries.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// Entries older than this are refetched; `None` keeps them until
    /// invalidated.
    pub max_age: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(mockable::DefaultClock),
            max_age: None,
        }
    }
}

impl std::fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptions")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

/// Entry point handing out every console service.
#[derive(Clone)]
pub struct ClinicConsole {
    api: ApiClient,
    cache: ConsoleCache,
    artifacts: Arc<dyn ArtifactStore>,
    patients: PatientDirectory,
    admins: AdminDirectory,
    transfers: TransferGates,
}

impl std::fmt::Debug for ClinicConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClinicConsole")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl ClinicConsole {
    /// Wire the console over its three driven ports.
    ///
    /// `redirect` runs once per ended session, after cached data is gone.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        artifacts: Arc<dyn ArtifactStore>,
        redirect: Arc<dyn SignOutListener>,
        cache_options: CacheOptions,
    ) -> Self {
        let cache = ConsoleCache::with_options(cache_options.clock, cache_options.max_age);
        let listener = Arc::new(PurgeThenRedirect {
            cache: cache.clone(),
            redirect,
        });
        let session = Arc::new(SessionGuard::new(listener));
        let api = ApiClient::new(transport, session);
        Self {
            patients: PatientDirectory::new(api.clone(), cache.clone()),
            admins: AdminDirectory::new(api.clone(), cache.clone()),
            api,
            cache,
            artifacts,
            transfers: TransferGates::default(),
        }
    }

    /// Session guard.
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionGuard> {
        self.api.session()
    }

    /// Authentication flows.
    #[must_use]
    pub fn auth(&self) -> AuthService {
        AuthService::new(self.api.clone())
    }

    /// Patient directory.
    #[must_use]
    pub const fn patients(&self) -> &PatientDirectory {
        &self.patients
    }

    /// Administrator directory.
    #[must_use]
    pub const fn admins(&self) -> &AdminDirectory {
        &self.admins
    }

    /// Document pipeline for `patient`.
    #[must_use]
    pub fn documents(&self, patient: PatientId) -> DocumentPipeline {
        DocumentPipeline::new(
            patient,
            self.api.clone(),
            self.cache.clone(),
            Arc::clone(&self.artifacts),
            self.transfers.clone(),
        )
    }

    /// Invalidation events for re-reading active views.
    #[must_use]
    pub fn cache_events(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }
}

#[cfg(test)]
mod tests {
    //! Sign-out ordering between cache purge and redirect.

    use std::sync::Mutex;

    use super::*;
    use crate::domain::ports::{ApiResponse, MockArtifactStore, MockHttpTransport};
    use crate::domain::query_keys::admins_key;
    use crate::domain::{AccessToken, Role, SessionUser, UserId};

    struct ObservingRedirect {
        cache: Mutex<Option<ConsoleCache>>,
        saw_cached_admins: Mutex<Vec<bool>>,
    }

    impl SignOutListener for ObservingRedirect {
        fn signed_out(&self, _reason: SignOutReason) {
            let cached = self
                .cache
                .lock()
                .expect("lock")
                .as_ref()
                .is_some_and(|cache| cache.peek::<Vec<crate::domain::AdminUser>>(&admins_key("")).is_some());
            self.saw_cached_admins.lock().expect("lock").push(cached);
        }
    }

    #[tokio::test]
    async fn redirect_runs_after_cache_is_purged() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .returning(|_| Ok(ApiResponse::json(200, &serde_json::json!([]))));
        let redirect = Arc::new(ObservingRedirect {
            cache: Mutex::new(None),
            saw_cached_admins: Mutex::new(Vec::new()),
        });
        let console = ClinicConsole::new(
            Arc::new(transport),
            Arc::new(MockArtifactStore::new()),
            redirect.clone(),
            CacheOptions::default(),
        );
        *redirect.cache.lock().expect("lock") = Some(console.cache.clone());
        console.session().set_auth(
            AccessToken::new("tok").expect("token"),
            SessionUser::new(UserId::from(1), "Ada", Role::Admin),
        );
        console.admins().list("").await.expect("list");

        assert!(console.session().logout());

        assert_eq!(*redirect.saw_cached_admins.lock().expect("lock"), vec![false]);
    }

    #[tokio::test]
    async fn cached_lists_are_refetched_once_past_max_age() {
        use chrono::{TimeDelta, TimeZone, Utc};
        use mockable::MockClock;

        let start = Utc
            .with_ymd_and_hms(2026, 3, 2, 8, 0, 0)
            .single()
            .expect("valid timestamp");
        let now = Arc::new(Mutex::new(start));
        let mut clock = MockClock::new();
        clock.expect_utc().returning({
            let now = Arc::clone(&now);
            move || *now.lock().expect("lock")
        });
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(2)
            .returning(|_| Ok(ApiResponse::json(200, &serde_json::json!([]))));
        let console = ClinicConsole::new(
            Arc::new(transport),
            Arc::new(MockArtifactStore::new()),
            Arc::new(crate::domain::ports::MockSignOutListener::new()),
            CacheOptions {
                clock: Arc::new(clock),
                max_age: Some(Duration::from_secs(60)),
            },
        );
        console.session().set_auth(
            AccessToken::new("tok").expect("token"),
            SessionUser::new(UserId::from(1), "Ada", Role::Admin),
        );

        console.admins().list("").await.expect("first read");
        console.admins().list("").await.expect("served from cache");
        let advance = |by: TimeDelta| {
            let mut guard = now.lock().expect("lock");
            *guard = *guard + by;
        };
        advance(TimeDelta::seconds(61));
        console.admins().list("").await.expect("refetched");
    }
}
