//! Administrator directory: cached search and delete.

use std::sync::Arc;

use query_cache::MutationGate;
use tracing::{info, warn};

use super::ports::ApiRequest;
use super::query_keys::{Resource, admins_key};
use super::{AdminId, AdminUser, ApiClient, ConsoleCache, Error};

/// Admin-only view over administrator accounts.
#[derive(Debug, Clone)]
pub struct AdminDirectory {
    api: ApiClient,
    cache: ConsoleCache,
    deleting: MutationGate<AdminId>,
}

impl AdminDirectory {
    /// Read through `api`, caching in `cache`.
    #[must_use]
    pub fn new(api: ApiClient, cache: ConsoleCache) -> Self {
        Self {
            api,
            cache,
            deleting: MutationGate::new(),
        }
    }

    /// Administrators matching `search`; an empty term lists everyone.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure; any previously cached list is kept.
    pub async fn list(&self, search: &str) -> Result<Arc<Vec<AdminUser>>, Error> {
        let search = search.trim();
        let api = self.api.clone();
        let request = ApiRequest::get("admins/all").with_query("search", search);
        self.cache
            .fetch(&admins_key(search), move || async move {
                api.json::<Vec<AdminUser>>(request).await
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a delete of `id` is in flight.
    #[must_use]
    pub fn is_delete_pending(&self, id: &AdminId) -> bool {
        self.deleting.is_pending(id)
    }

    /// Delete `id` and invalidate every cached admin list.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Busy`](super::ErrorCode::Busy) while a delete of
    /// the same account is pending, or the server's rejection.
    pub async fn delete(&self, id: &AdminId) -> Result<(), Error> {
        let Some(permit) = self.deleting.try_acquire(id.clone()) else {
            return Err(Error::busy("this administrator is already being deleted"));
        };
        let api = self.api.clone();
        let request = ApiRequest::delete(format!("admins/{id}"));
        self.cache
            .run_mutation(permit, vec![Resource::Admins.prefix()], async move {
                api.empty(request).await
            })
            .await
            .map_err(|failure| {
                let error = Error::from(failure);
                warn!(admin_id = %id, %error, "admin delete failed");
                error
            })?;
        info!(admin_id = %id, "administrator deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Search keys and delete invalidation.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::ports::{ApiResponse, MockHttpTransport, MockSignOutListener};
    use crate::domain::{AccessToken, Role, SessionGuard, SessionUser, UserId};
    use serde_json::json;

    fn directory(transport: MockHttpTransport) -> AdminDirectory {
        let mut listener = MockSignOutListener::new();
        listener.expect_signed_out().return_const(());
        let session = Arc::new(SessionGuard::new(Arc::new(listener)));
        session.set_auth(
            AccessToken::new("tok").expect("token"),
            SessionUser::new(UserId::from(1), "Ada", Role::Admin),
        );
        AdminDirectory::new(
            ApiClient::new(Arc::new(transport), session),
            ConsoleCache::new(),
        )
    }

    #[tokio::test]
    async fn delete_invalidates_every_search() {
        let lists = Arc::new(AtomicUsize::new(0));
        let mut transport = MockHttpTransport::new();
        let counter = Arc::clone(&lists);
        transport
            .expect_execute()
            .withf(|request| request.path == "admins/all")
            .returning(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ApiResponse::json(200, &json!([{ "id": 7, "full_name": "Ada" }])))
            });
        transport
            .expect_execute()
            .withf(|request| request.path == "admins/7")
            .times(1)
            .returning(|_| Ok(ApiResponse::new(204, Vec::new())));
        let admins = directory(transport);

        admins.list("").await.expect("list all");
        admins.list(" ada ").await.expect("search");
        admins.list("ada").await.expect("cached search");
        assert_eq!(lists.load(Ordering::SeqCst), 2);

        admins.delete(&AdminId::from(7)).await.expect("delete");
        admins.list("").await.expect("refetch all");
        admins.list("ada").await.expect("refetch search");
        assert_eq!(lists.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failed_delete_keeps_cached_lists() {
        let lists = Arc::new(AtomicUsize::new(0));
        let mut transport = MockHttpTransport::new();
        let counter = Arc::clone(&lists);
        transport
            .expect_execute()
            .withf(|request| request.path == "admins/all")
            .returning(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ApiResponse::json(200, &json!([])))
            });
        transport
            .expect_execute()
            .withf(|request| request.path == "admins/7")
            .returning(|_| Ok(ApiResponse::json(404, &json!({ "message": "Admin not found" }))));
        let admins = directory(transport);

        admins.list("").await.expect("list");
        let err = admins.delete(&AdminId::from(7)).await.expect_err("missing");
        admins.list("").await.expect("cached");

        assert_eq!(err.notice().as_deref(), Some("Admin not found"));
        assert_eq!(lists.load(Ordering::SeqCst), 1);
        assert!(!admins.is_delete_pending(&AdminId::from(7)));
    }
}
