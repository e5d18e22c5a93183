//! Driven port that persists downloaded files.
//!
//! Downloads and generated summaries arrive as byte buffers; the store turns
//! them into something the user can open and releases the buffer afterwards.

use std::path::PathBuf;

use async_trait::async_trait;

use super::define_port_error;

/// Binary payload received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Suggested file name.
    pub file_name: String,
    /// MIME type reported by the server.
    pub content_type: Option<String>,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Where a saved artefact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    /// File name actually used.
    pub file_name: String,
    /// Full location of the saved file.
    pub location: PathBuf,
    /// Number of bytes written.
    pub size: u64,
}

define_port_error! {
    /// Errors raised while saving an artefact.
    pub enum ArtifactStoreError {
        /// The suggested name cannot be used as a file name.
        InvalidName { name: String } => Validation, "cannot save file as `{name}`",
        /// Writing the file failed.
        Write { message: String } => Internal, "could not save file: {message}",
    }
}

/// Persist artefacts for the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Save `artifact` and return where it was written.
    async fn save(&self, artifact: Artifact) -> Result<SavedArtifact, ArtifactStoreError>;
}
