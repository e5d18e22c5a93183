//! Sign-in, registration, token refresh, and sign-out flows.

use serde::Deserialize;
use tracing::{debug, info};

use super::ports::ApiRequest;
use super::{AccessToken, ApiClient, Error, LoginCredentials, Registration, SessionUser};

#[derive(Deserialize)]
struct TokenEnvelope {
    #[serde(default, alias = "token")]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<SessionUser>,
}

impl TokenEnvelope {
    fn access_token(&self) -> Option<AccessToken> {
        self.access_token.clone().and_then(AccessToken::new)
    }

    fn refresh_token(&self) -> Option<AccessToken> {
        self.refresh_token.clone().and_then(AccessToken::new)
    }
}

/// Account created by [`AuthService::register`].
#[derive(Debug, Clone)]
pub struct RegisteredAccount {
    /// The new user, when the server echoed it back.
    pub user: Option<SessionUser>,
    /// Token issued for the new account, if any.
    pub token: Option<AccessToken>,
}

/// Authentication use-cases backed by the API client's session guard.
#[derive(Debug, Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    /// Authenticate through `api`.
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns a server error such as "Invalid email or password", or a
    /// decode error when the response carries no token.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<SessionUser, Error> {
        let envelope: TokenEnvelope = self
            .api
            .json(ApiRequest::post("auth/login").with_json(credentials.to_body()))
            .await?;
        let token = envelope
            .access_token()
            .ok_or_else(|| Error::decode("login response carried no access token"))?;
        let user = match envelope.user.clone() {
            Some(user) => user,
            None => self.fetch_profile(token.clone()).await?,
        };
        self.api.session().set_auth(token, user.clone());
        if let Some(refresh) = envelope.refresh_token() {
            self.api.session().set_refresh_token(refresh);
        }
        Ok(user)
    }

    /// Start a session from a token obtained elsewhere.
    ///
    /// # Errors
    ///
    /// Fails when the server rejects the token.
    pub async fn resume(&self, token: AccessToken) -> Result<SessionUser, Error> {
        let user = self.fetch_profile(token.clone()).await?;
        self.api.session().set_auth(token, user.clone());
        Ok(user)
    }

    /// Create an account without touching the current session.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection, e.g. a duplicate email.
    pub async fn register(&self, registration: &Registration) -> Result<RegisteredAccount, Error> {
        let envelope: TokenEnvelope = self
            .api
            .json(ApiRequest::post("auth/register").with_json(registration.to_body()))
            .await?;
        info!(role = %registration.role(), "account registered");
        Ok(RegisteredAccount {
            token: envelope.access_token(),
            user: envelope.user,
        })
    }

    /// Register and sign in as the new account.
    ///
    /// # Errors
    ///
    /// As [`Self::register`] and [`Self::login`].
    pub async fn sign_up(
        &self,
        registration: &Registration,
        password: &str,
    ) -> Result<SessionUser, Error> {
        let account = self.register(registration).await?;
        if let (Some(token), Some(user)) = (account.token, account.user) {
            self.api.session().set_auth(token, user.clone());
            return Ok(user);
        }
        let credentials = LoginCredentials::try_from_parts(registration.email(), password)?;
        self.login(&credentials).await
    }

    /// Reload the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Fails when signed out or when the request fails.
    pub async fn profile(&self) -> Result<SessionUser, Error> {
        let user: SessionUser = self.api.json(ApiRequest::get("auth/me")).await?;
        self.api.session().update_user(user.clone());
        Ok(user)
    }

    /// Replace the access token using the stored refresh token.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no refresh token is held.
    pub async fn refresh(&self) -> Result<(), Error> {
        let refresh = self
            .api
            .session()
            .refresh_token()
            .ok_or_else(|| Error::validation("no refresh token available"))?;
        let envelope: TokenEnvelope = self
            .api
            .json(ApiRequest::post("auth/refresh").with_bearer(refresh))
            .await?;
        let token = envelope
            .access_token()
            .ok_or_else(|| Error::decode("refresh response carried no access token"))?;
        if !self.api.session().replace_token(token) {
            return Err(Error::unauthorized("signed out during refresh"));
        }
        Ok(())
    }

    /// Sign out, revoking the token server-side when possible.
    ///
    /// The local session is cleared whatever the server answers.
    pub async fn logout(&self) {
        if self.api.session().is_authenticated() {
            if let Err(err) = self.api.empty(ApiRequest::post("auth/logout")).await {
                debug!(error = %err, "server-side logout failed; clearing local session");
            }
        }
        self.api.session().logout();
    }

    async fn fetch_profile(&self, token: AccessToken) -> Result<SessionUser, Error> {
        self.api
            .json(ApiRequest::get("auth/me").with_bearer(token))
            .await
    }
}
