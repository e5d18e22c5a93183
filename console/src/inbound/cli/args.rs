//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::PatientStatus;

/// `clinic-console` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "clinic-console",
    about = "Manage clinic patients, administrators, and documents",
    version
)]
pub struct Cli {
    /// API base URL; overrides `CLINIC_CONSOLE_API_BASE_URL`.
    #[arg(long, global = true, value_name = "url")]
    pub api_base_url: Option<String>,
    /// Access token; overrides `CLINIC_CONSOLE_TOKEN`.
    #[arg(long, global = true, value_name = "token")]
    pub token: Option<String>,
    /// Where downloads are saved; overrides `CLINIC_CONSOLE_DOWNLOAD_DIR`.
    #[arg(long, global = true, value_name = "dir")]
    pub download_dir: Option<PathBuf>,
    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level operations.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in and print an access token for later commands.
    Login(LoginArgs),
    /// Revoke the current token.
    Logout,
    /// Show the signed-in profile.
    Whoami,
    /// Patient directory operations.
    #[command(subcommand)]
    Patients(PatientsCommand),
    /// Administrator directory operations.
    #[command(subcommand)]
    Admins(AdminsCommand),
    /// Document transfers for one patient.
    #[command(subcommand)]
    Documents(DocumentsCommand),
}

/// Credentials for `login`.
#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    /// Account email.
    #[arg(long)]
    pub email: String,
    /// Account password.
    #[arg(long)]
    pub password: String,
}

/// Status tab selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    /// Approved patients.
    Approved,
    /// Patients awaiting approval.
    Unapproved,
}

impl From<StatusArg> for PatientStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Approved => Self::Approved,
            StatusArg::Unapproved => Self::Unapproved,
        }
    }
}

/// `patients` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum PatientsCommand {
    /// List one status tab.
    List {
        /// Status tab.
        #[arg(long, value_enum, default_value_t = StatusArg::Approved)]
        status: StatusArg,
        /// Search term.
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Flip a patient's approval status.
    Toggle {
        /// Patient identifier.
        id: String,
    },
    /// Change a patient's phone number.
    UpdatePhone {
        /// Patient identifier.
        id: String,
        /// New phone number.
        phone: String,
    },
    /// Delete a patient.
    Delete {
        /// Patient identifier.
        id: String,
    },
    /// Create a patient account.
    Register {
        /// Account email.
        #[arg(long)]
        email: String,
        /// Initial password.
        #[arg(long)]
        password: String,
        /// Full name.
        #[arg(long)]
        name: String,
    },
}

/// `admins` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum AdminsCommand {
    /// List administrators.
    List {
        /// Search term.
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Delete an administrator.
    Delete {
        /// Administrator identifier.
        id: String,
    },
}

/// `documents` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum DocumentsCommand {
    /// List a patient's documents.
    List {
        /// Patient identifier.
        patient: String,
    },
    /// Upload a file for a patient.
    Upload {
        /// Patient identifier.
        patient: String,
        /// File to upload.
        file: PathBuf,
        /// Document title; defaults to the file name.
        #[arg(long)]
        title: Option<String>,
        /// MIME type; guessed from the extension when omitted.
        #[arg(long, value_name = "mime")]
        content_type: Option<String>,
    },
    /// Download a document.
    Download {
        /// Patient identifier.
        patient: String,
        /// Document identifier.
        document: String,
    },
    /// Generate and save a summary of all of a patient's documents.
    Summary {
        /// Patient identifier.
        patient: String,
    },
}
