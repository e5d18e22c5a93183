//! Filesystem-backed artefact store.

mod directory_store;

pub use directory_store::DirectoryArtifactStore;
