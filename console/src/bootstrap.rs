//! Wires outbound adapters into a [`ClinicConsole`] from settings.

use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use mockable::DefaultClock;

use crate::config::ConsoleSettings;
use crate::domain::{CacheOptions, ClinicConsole};
use crate::outbound::artifacts::DirectoryArtifactStore;
use crate::outbound::http::ReqwestTransport;
use crate::outbound::redirect::LoginPromptRedirect;

/// Build a console talking to the configured API and saving downloads into
/// the configured directory.
///
/// # Errors
///
/// Fails when the base URL is invalid, the HTTP client cannot be built, or
/// the download directory cannot be opened.
pub fn build_console(settings: &ConsoleSettings) -> Result<ClinicConsole> {
    let base = settings.api_base_url()?;
    let transport = ReqwestTransport::new(base, settings.request_timeout())
        .wrap_err("failed to build HTTP client")?;
    let download_dir = settings.download_dir();
    let artifacts = DirectoryArtifactStore::open(&download_dir).wrap_err_with(|| {
        format!("failed to open download directory {}", download_dir.display())
    })?;
    Ok(ClinicConsole::new(
        Arc::new(transport),
        Arc::new(artifacts),
        Arc::new(LoginPromptRedirect),
        CacheOptions {
            clock: Arc::new(DefaultClock),
            max_age: settings.cache_max_age(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(base: &str, dir: &TempDir) -> ConsoleSettings {
        ConsoleSettings {
            api_base_url: base.to_owned(),
            request_timeout_secs: Some(5),
            download_dir: Some(dir.path().join("downloads")),
            cache_max_age_secs: None,
            token: None,
        }
    }

    #[test]
    fn builds_signed_out_console_and_creates_download_dir() {
        let dir = TempDir::new().expect("temp dir");
        let console = build_console(&settings("http://localhost:5000/api", &dir)).expect("console");
        assert!(!console.session().is_authenticated());
        assert!(dir.path().join("downloads").is_dir());
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let err = build_console(&settings("mailto:ops@clinic.test", &dir)).expect_err("bad url");
        assert!(err.to_string().contains("http or https"));
    }
}
