//! Command-line entry-point: loads settings, wires the console, and runs one
//! command.

use std::ffi::OsString;
use std::io;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use ortho_config::OrthoConfig;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use clinic_console::domain::AccessToken;
use clinic_console::inbound::cli::{Cli, run};
use clinic_console::{ConsoleSettings, build_console};

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let token = cli
        .token
        .as_deref()
        .and_then(AccessToken::new)
        .or_else(|| settings.token());

    let console = build_console(&settings)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start async runtime")?;
    let mut stdout = io::stdout().lock();
    runtime.block_on(run(&console, cli.command, token, &mut stdout))
}

/// Layer the command-line overrides over environment and file settings.
fn load_settings(cli: &Cli) -> Result<ConsoleSettings> {
    // Flags are handled by clap, so OrthoConfig only sees the binary name.
    let mut settings = ConsoleSettings::load_from_iter([OsString::from("clinic-console")])
        .wrap_err("failed to load settings")?;
    if let Some(url) = cli.api_base_url.clone() {
        settings.api_base_url = url;
    }
    if let Some(dir) = cli.download_dir.clone() {
        settings.download_dir = Some(dir);
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use env_lock::lock_env;

    const VARS: [&str; 3] = [
        "CLINIC_CONSOLE_API_BASE_URL",
        "CLINIC_CONSOLE_DOWNLOAD_DIR",
        "CLINIC_CONSOLE_TOKEN",
    ];

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments parse")
    }

    #[test]
    fn clean_environment_loads_local_defaults() {
        let _guard = lock_env(VARS.map(|name| (name, None::<String>)));

        let settings = load_settings(&cli(&["clinic-console", "whoami"])).expect("settings load");

        assert_eq!(
            settings.api_base_url().expect("url").as_str(),
            "http://localhost:5000/api/"
        );
        assert_eq!(settings.download_dir(), PathBuf::from("."));
    }

    #[test]
    fn flags_override_the_environment() {
        let _guard = lock_env([
            ("CLINIC_CONSOLE_API_BASE_URL", Some("https://env.clinic.test/api".to_owned())),
            ("CLINIC_CONSOLE_DOWNLOAD_DIR", Some("/tmp/env".to_owned())),
            ("CLINIC_CONSOLE_TOKEN", None),
        ]);

        let settings = load_settings(&cli(&[
            "clinic-console",
            "--api-base-url",
            "https://flag.clinic.test/api",
            "--download-dir",
            "/tmp/flag",
            "whoami",
        ]))
        .expect("settings load");

        assert_eq!(settings.api_base_url, "https://flag.clinic.test/api");
        assert_eq!(settings.download_dir(), PathBuf::from("/tmp/flag"));
    }
}
