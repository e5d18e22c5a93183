//! Domain primitives, services, and ports.
//!
//! Purpose: hold every rule of the console (session lifetime, cache
//! consistency, transfer validation) independent of HTTP clients,
//! filesystems, and the CLI. Adapters reach the domain only through
//! [`ports`].
//!
//! Public surface:
//! - [`ClinicConsole`]: composition root handing out the services.
//! - [`SessionGuard`], [`ApiClient`]: authentication and the transport layer.
//! - [`PatientDirectory`], [`AdminDirectory`], [`DocumentPipeline`]: use-cases.
//! - [`Error`], [`ErrorCode`]: the shared failure type.

pub mod ports;
pub mod query_keys;

mod admin;
mod admin_directory;
mod api_client;
mod auth;
mod auth_service;
mod console;
mod document;
mod document_pipeline;
mod error;
mod ids;
mod patient;
mod patient_directory;
mod request_id;
mod session;

pub use self::admin::AdminUser;
pub use self::admin_directory::AdminDirectory;
pub use self::api_client::ApiClient;
pub use self::auth::{CredentialsValidationError, LoginCredentials, Registration};
pub use self::auth_service::{AuthService, RegisteredAccount};
pub use self::console::{CacheOptions, ClinicConsole};
pub use self::document::{
    AcceptedContentType, Document, MAX_UPLOAD_BYTES, UploadCandidate, UploadProgress,
    UploadRejection, ValidatedUpload, document_file_name, summary_file_name, validate_upload,
};
pub use self::document_pipeline::{DocumentPipeline, TransferError, TransferGates, UploadOutcome};
pub use self::error::{Error, ErrorCode};
pub use self::ids::{AdminId, DocumentId, InvalidIdentifier, PatientId, UserId};
pub use self::patient::{Patient, PatientListQuery, PatientStatus};
pub use self::patient_directory::PatientDirectory;
pub use self::request_id::RequestId;
pub use self::session::{
    AccessToken, Credential, Role, SessionEpoch, SessionGuard, SessionUser, UnknownRole,
};

/// Query cache holding every list the console reads.
pub type ConsoleCache = query_cache::QueryCache<Error>;
