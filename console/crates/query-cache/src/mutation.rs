//! Per-target re-entrancy guard for mutations.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Tracks which mutation targets currently have a call in flight.
///
/// A caller acquires a [`MutationPermit`] before issuing a mutation and the
/// target stays pending until the permit is dropped. Different targets never
/// block each other.
///
/// ```
/// use query_cache::MutationGate;
///
/// let gate = MutationGate::new();
/// let permit = gate.try_acquire("patient-5").expect("first toggle proceeds");
/// assert!(gate.try_acquire("patient-5").is_none());
/// assert!(gate.try_acquire("patient-6").is_some());
/// drop(permit);
/// assert!(!gate.is_pending(&"patient-5"));
/// ```
#[derive(Debug)]
pub struct MutationGate<K> {
    pending: Arc<Mutex<HashSet<K>>>,
}

impl<K> Clone for MutationGate<K> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<K> Default for MutationGate<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K> MutationGate<K>
where
    K: Eq + Hash + Clone,
{
    /// Create a gate with no pending targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or return `None` when a mutation on it is still pending.
    #[must_use]
    pub fn try_acquire(&self, key: K) -> Option<MutationPermit<K>> {
        let mut pending = lock(&self.pending);
        if !pending.insert(key.clone()) {
            return None;
        }
        Some(MutationPermit {
            pending: Arc::clone(&self.pending),
            key: Some(key),
        })
    }

    /// Return whether a mutation on `key` is in flight; callers use this to
    /// disable the triggering control.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains(key)
    }
}

/// Proof that the holder owns the in-flight slot for one target.
#[derive(Debug)]
pub struct MutationPermit<K>
where
    K: Eq + Hash,
{
    pending: Arc<Mutex<HashSet<K>>>,
    key: Option<K>,
}

impl<K> Drop for MutationPermit<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.pending).remove(&key);
        }
    }
}

fn lock<K>(pending: &Mutex<HashSet<K>>) -> MutexGuard<'_, HashSet<K>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
