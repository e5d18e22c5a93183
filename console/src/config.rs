//! Console configuration loaded via OrthoConfig.
//!
//! Values come from `CLINIC_CONSOLE_*` environment variables or a config
//! file; command-line flags parsed by the CLI override them.

use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use zeroize::Zeroizing;

use crate::domain::AccessToken;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Raised when configured values cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// The base URL does not parse.
    #[error("invalid api_base_url `{value}`: {message}")]
    InvalidBaseUrl {
        /// Configured value.
        value: String,
        /// Parser message.
        message: String,
    },
    /// The base URL is not HTTP(S).
    #[error("api_base_url must use http or https, got `{scheme}`")]
    UnsupportedScheme {
        /// Scheme found.
        scheme: String,
    },
}

/// Configuration for talking to the clinic API.
#[derive(Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "CLINIC_CONSOLE")]
pub struct ConsoleSettings {
    /// API base URL.
    #[ortho_config(default = String::from(DEFAULT_API_BASE_URL))]
    pub api_base_url: String,
    /// Whole-request timeout in seconds; unset leaves requests unbounded.
    pub request_timeout_secs: Option<u64>,
    /// Directory downloads and summaries are saved into.
    pub download_dir: Option<PathBuf>,
    /// Maximum age of cached lists in seconds; unset keeps them until
    /// invalidated.
    pub cache_max_age_secs: Option<u64>,
    /// Access token for non-interactive use.
    pub token: Option<String>,
}

impl std::fmt::Debug for ConsoleSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSettings")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_dir", &self.download_dir)
            .field("cache_max_age_secs", &self.cache_max_age_secs)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConsoleSettings {
    /// Validated base URL, always ending in `/` so endpoint paths nest.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] for unparsable or non-HTTP URLs.
    pub fn api_base_url(&self) -> Result<Url, SettingsError> {
        let trimmed = self.api_base_url.trim();
        let raw = if trimmed.is_empty() {
            DEFAULT_API_BASE_URL
        } else {
            trimmed
        };
        let mut url = Url::parse(raw).map_err(|err| SettingsError::InvalidBaseUrl {
            value: raw.to_owned(),
            message: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SettingsError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
            });
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Request timeout, when configured and non-zero.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Download directory, defaulting to the working directory.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Cache entry lifetime, when configured and non-zero.
    #[must_use]
    pub fn cache_max_age(&self) -> Option<Duration> {
        self.cache_max_age_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Configured access token, if any.
    #[must_use]
    pub fn token(&self) -> Option<AccessToken> {
        let raw = Zeroizing::new(self.token.clone()?);
        AccessToken::new(raw.as_str())
    }
}
