//! Saves downloads into one directory using a temp file and rename.
//!
//! Bytes are first written to a hidden temporary file next to the target,
//! then renamed into place, so the target is never partially written. The
//! temporary file is removed on every failure path.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs::{Dir, OpenOptions};
use tracing::debug;

use crate::domain::ports::{Artifact, ArtifactStore, ArtifactStoreError, SavedArtifact};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Artefact store rooted at a single download directory.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactStore {
    dir: Arc<Dir>,
    root: PathBuf,
}

impl DirectoryArtifactStore {
    /// Open (creating if needed) the download directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the directory cannot be created or opened.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        Dir::create_ambient_dir_all(root, ambient_authority())?;
        let dir = Dir::open_ambient_dir(root, ambient_authority())?;
        Ok(Self {
            dir: Arc::new(dir),
            root: root.to_path_buf(),
        })
    }

    /// Directory files are saved into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for DirectoryArtifactStore {
    async fn save(&self, artifact: Artifact) -> Result<SavedArtifact, ArtifactStoreError> {
        let file_name = sanitise_file_name(&artifact.file_name)
            .ok_or_else(|| ArtifactStoreError::invalid_name(artifact.file_name.clone()))?;
        let dir = Arc::clone(&self.dir);
        let target = file_name.clone();
        let size = tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &artifact.bytes))
            .await
            .map_err(|err| ArtifactStoreError::write(err.to_string()))??;
        let location = self.root.join(&file_name);
        debug!(location = %location.display(), size, "artefact saved");
        Ok(SavedArtifact {
            file_name,
            location,
            size,
        })
    }
}

/// Reduce `raw` to a single safe path component.
fn sanitise_file_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_owned())
}

fn write_atomic(dir: &Dir, file_name: &str, contents: &[u8]) -> Result<u64, ArtifactStoreError> {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(".{file_name}.part.{}.{counter}", std::process::id());

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    let mut file = dir
        .open_with(&tmp_name, &options)
        .map_err(|err| ArtifactStoreError::write(err.to_string()))?;

    if let Err(err) = file.write_all(contents).and_then(|()| file.sync_all()) {
        drop(file);
        drop(dir.remove_file(&tmp_name));
        return Err(ArtifactStoreError::write(err.to_string()));
    }
    drop(file);

    if let Err(err) = dir.rename(&tmp_name, dir, file_name) {
        drop(dir.remove_file(&tmp_name));
        return Err(ArtifactStoreError::write(err.to_string()));
    }
    Ok(u64::try_from(contents.len()).unwrap_or(u64::MAX))
}
