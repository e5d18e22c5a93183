//! Driven port notified when the session ends.
//!
//! The console uses it to purge cached data and send the user back to the
//! login screen. Implementations run synchronously on the thread that ended
//! the session and must not call back into the session guard.

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// The user asked to sign out.
    UserRequested,
    /// The server rejected the session with a 401.
    Unauthorized,
}

/// Receives exactly one notification per ended session.
#[cfg_attr(test, mockall::automock)]
pub trait SignOutListener: Send + Sync {
    /// Called after the token and user have been cleared.
    fn signed_out(&self, reason: SignOutReason);
}
