//! Keyed synchronisation layer shared by the clinic console services.
//!
//! A [`QueryCache`] maps a [`QueryKey`] (resource name plus an ordered
//! parameter tuple) to the last value fetched for it. It guarantees:
//!
//! - a fresh entry is served without calling the fetcher;
//! - concurrent reads of one key share a single in-flight fetch;
//! - [`QueryCache::invalidate`] marks every key under a [`QueryPrefix`]
//!   stale so the next read refetches, and results from fetches started
//!   before the invalidation are discarded;
//! - a failed fetch never replaces the previously stored value;
//! - once the key limit is reached, idle stale entries are evicted before
//!   the least recently fetched ones.
//!
//! Mutations run through [`QueryCache::run_mutation`], which invalidates
//! the supplied prefixes only after the mutation succeeds. The
//! [`MutationGate`] provides the per-target re-entrancy guard.
//!
//! # Example
//!
//! ```
//! use query_cache::{QueryCache, QueryKey, QueryPrefix};
//!
//! # tokio::runtime::Runtime::new().expect("runtime").block_on(async {
//! let cache: QueryCache<String> = QueryCache::new();
//! let key = QueryKey::new("admins").with("ann");
//!
//! let first = cache
//!     .fetch(&key, || async { Ok::<_, String>(vec!["Ann Lee".to_owned()]) })
//!     .await
//!     .expect("fetch succeeds");
//! assert_eq!(first.len(), 1);
//! assert!(cache.is_fresh(&key));
//!
//! cache.invalidate(&QueryPrefix::resource("admins"));
//! assert!(!cache.is_fresh(&key));
//! # });
//! ```

mod cache;
mod error;
mod key;
mod mutation;

pub use cache::{CacheEvent, DEFAULT_CAPACITY, QueryCache};
pub use error::{MutationError, QueryError};
pub use key::{KeyParam, QueryKey, QueryPrefix};
pub use mutation::{MutationGate, MutationPermit};
