//! Session Guard: the single owner of the signed-in identity.
//!
//! Every request captures a [`Credential`] stamped with the session epoch it
//! was issued under. A 401 only ends the session when that epoch is still
//! current, so a burst of concurrent 401s signs the user out exactly once
//! and a late 401 from an older login never ends a newer one.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::UserId;
use super::ports::{SignOutListener, SignOutReason};

/// Account role as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Role {
    /// Clinic staff managing patients and documents.
    Staff,
    /// Administrator managing staff and admin accounts.
    Admin,
    /// Patient account.
    Patient,
}

/// Raised for role names the console does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            "patient" => Ok(Self::Patient),
            _ => Err(UnknownRole(raw.to_owned())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::Patient => "patient",
        })
    }
}

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "UserPayload")]
pub struct SessionUser {
    id: UserId,
    name: String,
    email: Option<String>,
    role: Role,
}

#[derive(Deserialize)]
struct UserPayload {
    id: UserId,
    role: Role,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

impl From<UserPayload> for SessionUser {
    fn from(payload: UserPayload) -> Self {
        let joined = [payload.first_name, payload.last_name]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = non_blank(payload.name)
            .or_else(|| non_blank(payload.full_name))
            .or_else(|| non_blank(Some(joined)))
            .or_else(|| payload.email.clone())
            .unwrap_or_default();
        Self {
            id: payload.id,
            name,
            email: payload.email,
            role: payload.role,
        }
    }
}

impl SessionUser {
    /// Build a user directly.
    pub fn new(id: UserId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
            role,
        }
    }

    /// Attach the account email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Account identifier.
    #[must_use]
    pub const fn id(&self) -> &UserId {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Account email when the server reported one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Account role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }
}

/// Opaque bearer token. Memory is wiped on drop and `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(Zeroizing<String>);

impl AccessToken {
    /// Wrap a raw token, rejecting blank input.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self(Zeroizing::new(raw)))
    }

    /// Raw token for the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Monotonic counter identifying one signed-in period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionEpoch(u64);

/// Token captured for one request together with the epoch it belongs to.
#[derive(Debug, Clone)]
pub struct Credential {
    token: AccessToken,
    epoch: SessionEpoch,
}

impl Credential {
    /// Bearer token to attach.
    #[must_use]
    pub const fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Epoch the token was issued under.
    #[must_use]
    pub const fn epoch(&self) -> SessionEpoch {
        self.epoch
    }
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<AccessToken>,
    refresh: Option<AccessToken>,
    user: Option<SessionUser>,
    epoch: u64,
}

impl SessionState {
    fn clear(&mut self) -> bool {
        let had_session = self.token.is_some();
        self.token = None;
        self.refresh = None;
        self.user = None;
        self.epoch += 1;
        had_session
    }
}

/// Holds the current token and user and enforces the sign-out contract.
///
/// ## Invariants
/// - Token and user are either both present or both absent.
/// - Sign-out runs its listener exactly once per signed-in period.
pub struct SessionGuard {
    state: Mutex<SessionState>,
    listener: Arc<dyn SignOutListener>,
    changes: watch::Sender<Option<SessionUser>>,
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl SessionGuard {
    /// Create a signed-out guard notifying `listener` on every sign-out.
    pub fn new(listener: Arc<dyn SignOutListener>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            state: Mutex::new(SessionState::default()),
            listener,
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a freshly issued token and its user, starting a new epoch.
    pub fn set_auth(&self, token: AccessToken, user: SessionUser) {
        {
            let mut state = self.lock();
            state.token = Some(token);
            state.refresh = None;
            state.user = Some(user.clone());
            state.epoch += 1;
        }
        info!(user_id = %user.id(), role = %user.role(), "session started");
        self.changes.send_replace(Some(user));
    }

    /// Remember the refresh token issued with the current login.
    pub fn set_refresh_token(&self, token: AccessToken) {
        let mut state = self.lock();
        if state.token.is_some() {
            state.refresh = Some(token);
        }
    }

    /// Swap in a refreshed access token for the same user.
    ///
    /// Requests still carrying the old token belong to the previous epoch and
    /// their 401s are ignored. Returns `false` when no session exists.
    pub fn replace_token(&self, token: AccessToken) -> bool {
        let mut state = self.lock();
        if state.token.is_none() {
            return false;
        }
        state.token = Some(token);
        state.epoch += 1;
        debug!("access token refreshed");
        true
    }

    /// Replace the stored user after a profile reload.
    pub fn update_user(&self, user: SessionUser) {
        {
            let mut state = self.lock();
            if state.token.is_none() {
                return;
            }
            state.user = Some(user.clone());
        }
        self.changes.send_replace(Some(user));
    }

    /// Explicit sign-out. Returns `false` when nobody was signed in.
    pub fn logout(&self) -> bool {
        self.end(None, SignOutReason::UserRequested)
    }

    /// Handle a 401 for a request issued under `epoch`.
    ///
    /// Returns `true` only for the call that actually ended the session.
    pub fn expire(&self, epoch: SessionEpoch) -> bool {
        self.end(Some(epoch), SignOutReason::Unauthorized)
    }

    fn end(&self, epoch: Option<SessionEpoch>, reason: SignOutReason) -> bool {
        {
            let mut state = self.lock();
            if let Some(SessionEpoch(seen)) = epoch {
                if seen != state.epoch {
                    debug!(seen, current = state.epoch, "ignoring 401 from a stale session");
                    return false;
                }
            }
            if !state.clear() {
                return false;
            }
        }
        match reason {
            SignOutReason::Unauthorized => warn!("session rejected by server; signing out"),
            SignOutReason::UserRequested => info!("signed out"),
        }
        self.changes.send_replace(None);
        self.listener.signed_out(reason);
        true
    }

    /// Credential for the next request, if signed in.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        let state = self.lock();
        state.token.clone().map(|token| Credential {
            token,
            epoch: SessionEpoch(state.epoch),
        })
    }

    /// Current access token, if signed in.
    #[must_use]
    pub fn current_token(&self) -> Option<AccessToken> {
        self.lock().token.clone()
    }

    /// Refresh token of the current login, if the server issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<AccessToken> {
        self.lock().refresh.clone()
    }

    /// Signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<SessionUser> {
        self.lock().user.clone()
    }

    /// Whether a session exists.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock().token.is_some()
    }

    /// Observe sign-in and sign-out transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionUser>> {
        self.changes.subscribe()
    }
}
