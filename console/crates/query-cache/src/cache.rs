//! Single-flight query cache with generation-checked invalidation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use mockable::{Clock, DefaultClock};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{MutationError, QueryError};
use crate::key::{QueryKey, QueryPrefix};

type AnyValue = Arc<dyn Any + Send + Sync>;
type SharedFetch<E> = Shared<BoxFuture<'static, Result<AnyValue, QueryError<E>>>>;

const EVENT_CAPACITY: usize = 64;

/// Number of keys a cache holds before idle entries are evicted.
pub const DEFAULT_CAPACITY: usize = 256;

/// Notification published whenever cached entries stop being fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Keys under `prefix` were marked stale.
    Invalidated {
        /// Prefix passed to [`QueryCache::invalidate`].
        prefix: QueryPrefix,
        /// Number of cached keys that matched.
        keys: usize,
    },
    /// Every entry was dropped.
    Cleared,
}

struct StoredValue {
    value: AnyValue,
    fetched_at: DateTime<Utc>,
}

struct InFlight<E> {
    ticket: u64,
    fetch: SharedFetch<E>,
}

struct Entry<E> {
    generation: u64,
    fresh: bool,
    value: Option<StoredValue>,
    in_flight: Option<InFlight<E>>,
}

impl<E> Entry<E> {
    const fn empty(generation: u64) -> Self {
        Self {
            generation,
            fresh: false,
            value: None,
            in_flight: None,
        }
    }

    fn fetched_at(&self) -> DateTime<Utc> {
        self.value
            .as_ref()
            .map_or(DateTime::<Utc>::MIN_UTC, |stored| stored.fetched_at)
    }

    fn fresh_value(&self, now: DateTime<Utc>, max_age: Option<TimeDelta>) -> Option<AnyValue> {
        if !self.fresh {
            return None;
        }
        let stored = self.value.as_ref()?;
        match max_age {
            Some(limit) if now.signed_duration_since(stored.fetched_at) >= limit => None,
            _ => Some(Arc::clone(&stored.value)),
        }
    }
}

struct Inner<E> {
    entries: Mutex<HashMap<QueryKey, Entry<E>>>,
    generations: AtomicU64,
    tickets: AtomicU64,
    clock: Arc<dyn Clock + Send + Sync>,
    max_age: Option<TimeDelta>,
    capacity: usize,
    events: broadcast::Sender<CacheEvent>,
}

/// Keyed cache of fetched query results.
///
/// Cloning is cheap and every clone shares the same entries. Fetches run on
/// the Tokio runtime as detached tasks, so dropping the caller that started
/// one does not abort the network request; its result is still stored
/// unless the key was invalidated in the meantime.
pub struct QueryCache<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for QueryCache<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for QueryCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("max_age", &self.inner.max_age)
            .finish_non_exhaustive()
    }
}

impl<E> Default for QueryCache<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> QueryCache<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Cache whose entries stay fresh until invalidated.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(Arc::new(DefaultClock), None)
    }

    /// Cache with an explicit clock and an optional maximum entry age.
    #[must_use]
    pub fn with_options(clock: Arc<dyn Clock + Send + Sync>, max_age: Option<Duration>) -> Self {
        Self::with_capacity(clock, max_age, DEFAULT_CAPACITY)
    }

    /// As [`Self::with_options`], evicting idle entries once `capacity`
    /// keys are held.
    ///
    /// Stale and expired entries go first, then the least recently fetched
    /// ones. Keys with a fetch in flight are never evicted.
    #[must_use]
    pub fn with_capacity(
        clock: Arc<dyn Clock + Send + Sync>,
        max_age: Option<Duration>,
        capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                tickets: AtomicU64::new(0),
                clock,
                max_age: max_age.and_then(|age| TimeDelta::from_std(age).ok()),
                capacity,
                events,
            }),
        }
    }

    /// Read `key`, calling `fetcher` only when no fresh value exists and no
    /// fetch for the same key is already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Fetch`] when the fetch fails,
    /// [`QueryError::TypeMismatch`] when the key holds a value of another
    /// type, and [`QueryError::Aborted`] when the fetch task died.
    pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<Arc<T>, QueryError<E>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let pending = {
            let mut entries = self.lock();
            let now = self.inner.clock.utc();
            if !entries.contains_key(key) && entries.len() >= self.inner.capacity {
                self.make_room(&mut entries, now);
            }
            let generation_seed = &self.inner.generations;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::empty(next_id(generation_seed)));

            if let Some(value) = entry.fresh_value(now, self.inner.max_age) {
                debug!(%key, "query cache hit");
                return downcast(key, value);
            }

            if let Some(in_flight) = &entry.in_flight {
                debug!(%key, "joining in-flight query");
                in_flight.fetch.clone()
            } else {
                debug!(%key, "query cache miss, fetching");
                let ticket = next_id(&self.inner.tickets);
                let fetch = self.spawn_fetch(key.clone(), ticket, entry.generation, fetcher());
                entry.in_flight = Some(InFlight {
                    ticket,
                    fetch: fetch.clone(),
                });
                fetch
            }
        };

        let value = pending.await?;
        downcast(key, value)
    }

    /// Last stored value for `key`, fresh or stale, without fetching.
    #[must_use]
    pub fn peek<T>(&self, key: &QueryKey) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let entries = self.lock();
        let stored = entries.get(key)?.value.as_ref()?;
        Arc::clone(&stored.value).downcast::<T>().ok()
    }

    /// Return whether `key` would be served without a fetch.
    #[must_use]
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        let entries = self.lock();
        let now = self.inner.clock.utc();
        entries
            .get(key)
            .and_then(|entry| entry.fresh_value(now, self.inner.max_age))
            .is_some()
    }

    /// Return whether a fetch for `key` is currently in flight.
    #[must_use]
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Mark every key under `prefix` stale and detach in-flight fetches so
    /// the next read issues a new request. Returns the number of keys hit.
    pub fn invalidate(&self, prefix: &QueryPrefix) -> usize {
        let keys = {
            let mut entries = self.lock();
            let mut keys = 0_usize;
            for (_, entry) in entries.iter_mut().filter(|(key, _)| key.matches(prefix)) {
                entry.generation = next_id(&self.inner.generations);
                entry.fresh = false;
                entry.in_flight = None;
                keys = keys.saturating_add(1);
            }
            keys
        };
        debug!(%prefix, keys, "invalidated cached queries");
        self.publish(CacheEvent::Invalidated {
            prefix: prefix.clone(),
            keys,
        });
        keys
    }

    /// Drop entries that are neither fresh nor being fetched. Returns the
    /// number of keys removed.
    pub fn evict_stale(&self) -> usize {
        let mut entries = self.lock();
        let now = self.inner.clock.utc();
        let removed = self.drop_idle_stale(&mut entries, now);
        debug!(removed, "evicted stale queries");
        removed
    }

    /// Number of keys currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Return whether no key is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry; results of fetches still in flight are discarded.
    pub fn clear(&self) {
        self.lock().clear();
        info!("query cache cleared");
        self.publish(CacheEvent::Cleared);
    }

    /// Subscribe to invalidation notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Run `mutation` to completion on a detached task and, only when it
    /// succeeds, invalidate each prefix in `invalidates`.
    ///
    /// `guard` is held until the mutation settles; pass a
    /// [`crate::MutationPermit`] to keep the target's control disabled even
    /// when the caller stops waiting.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Failed`] with the mutation's own error, or
    /// [`MutationError::Aborted`] when the task died.
    pub async fn run_mutation<T, M, Fut, G>(
        &self,
        guard: G,
        invalidates: Vec<QueryPrefix>,
        mutation: Fut,
    ) -> Result<T, MutationError<M>>
    where
        T: Send + 'static,
        M: Send + 'static,
        Fut: Future<Output = Result<T, M>> + Send + 'static,
        G: Send + 'static,
    {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let outcome = mutation.await;
            if outcome.is_ok() {
                for prefix in &invalidates {
                    cache.invalidate(prefix);
                }
            }
            drop(guard);
            outcome
        });

        match task.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(MutationError::Failed(error)),
            Err(_) => Err(MutationError::Aborted),
        }
    }

    fn spawn_fetch<T, Fut>(
        &self,
        key: QueryKey,
        ticket: u64,
        generation: u64,
        request: Fut,
    ) -> SharedFetch<E>
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let cache = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let outcome = request
                .await
                .map(|value| Arc::new(value) as AnyValue)
                .map_err(QueryError::Fetch);
            cache.settle(&task_key, ticket, generation, &outcome);
            outcome
        });

        let cache = self.clone();
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(_) => {
                    cache.release(&key, ticket);
                    Err(QueryError::Aborted {
                        key: key.to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    fn settle(
        &self,
        key: &QueryKey,
        ticket: u64,
        generation: u64,
        outcome: &Result<AnyValue, QueryError<E>>,
    ) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            debug!(%key, "discarding result for cleared query");
            return;
        };
        if entry
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.ticket == ticket)
        {
            entry.in_flight = None;
        }
        if entry.generation != generation {
            debug!(%key, "discarding result superseded by invalidation");
            return;
        }
        if let Ok(value) = outcome {
            entry.value = Some(StoredValue {
                value: Arc::clone(value),
                fetched_at: self.inner.clock.utc(),
            });
            entry.fresh = true;
        }
    }

    fn drop_idle_stale(&self, entries: &mut HashMap<QueryKey, Entry<E>>, now: DateTime<Utc>) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.in_flight.is_some() || entry.fresh_value(now, self.inner.max_age).is_some()
        });
        before.saturating_sub(entries.len())
    }

    fn make_room(&self, entries: &mut HashMap<QueryKey, Entry<E>>, now: DateTime<Utc>) {
        let mut removed = self.drop_idle_stale(entries, now);
        let excess = entries
            .len()
            .saturating_add(1)
            .saturating_sub(self.inner.capacity);
        if excess > 0 {
            let mut idle: Vec<(DateTime<Utc>, QueryKey)> = entries
                .iter()
                .filter(|(_, entry)| entry.in_flight.is_none())
                .map(|(key, entry)| (entry.fetched_at(), key.clone()))
                .collect();
            idle.sort_unstable_by_key(|(fetched_at, _)| *fetched_at);
            for (_, key) in idle.into_iter().take(excess) {
                entries.remove(&key);
                removed = removed.saturating_add(1);
            }
        }
        debug!(removed, capacity = self.inner.capacity, "evicted queries at capacity");
    }

    fn release(&self, key: &QueryKey, ticket: u64) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.ticket == ticket)
        {
            entry.in_flight = None;
        }
    }

    fn publish(&self, event: CacheEvent) {
        if self.inner.events.send(event).is_err() {
            // No subscribers.
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<E>>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn next_id(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed)
}

fn downcast<T, E>(key: &QueryKey, value: AnyValue) -> Result<Arc<T>, QueryError<E>>
where
    T: Send + Sync + 'static,
{
    value.downcast::<T>().map_err(|_| QueryError::TypeMismatch {
        key: key.to_string(),
    })
}
