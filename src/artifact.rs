//! Transient files produced by collaborators (synthesized audio, generated images).
//!
//! Every artifact lives at a unique path so concurrent requests never share a
//! file, and is removed once it has been sent.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors raised while materializing an artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem failure
    #[error("artifact IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A locally written file awaiting delivery
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    /// Writes `bytes` to a fresh `<uuid>.<extension>` file inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the write fails.
    pub async fn write(dir: &Path, extension: &str, bytes: &[u8]) -> Result<Self, ArtifactError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = unique_path(dir, extension);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Artifact written");
        Ok(Self { path })
    }

    #[cfg(test)]
    pub(crate) const fn from_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Location of the file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file. A missing file is not an error.
    pub async fn discard(self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove artifact: {e}"),
        }
    }
}

/// Builds a collision-free file path inside `dir`
#[must_use]
pub fn unique_path(dir: &Path, extension: &str) -> PathBuf {
    dir.join(format!("{}.{extension}", Uuid::new_v4().as_simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_paths_differ() {
        let dir = Path::new("/tmp/artifacts");
        let a = unique_path(dir, "mp3");
        let b = unique_path(dir, "mp3");
        assert_ne!(a, b);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("mp3"));
        assert!(a.starts_with(dir));
    }

    #[tokio::test]
    async fn test_write_then_discard_removes_file() -> Result<(), ArtifactError> {
        let dir = std::env::temp_dir().join(format!("sakura-test-{}", Uuid::new_v4()));
        let artifact = Artifact::write(&dir, "png", b"fake image").await?;
        let path = artifact.path().to_path_buf();
        assert_eq!(tokio::fs::read(&path).await?, b"fake image");

        artifact.discard().await;
        assert!(!path.exists());

        // Discarding twice is harmless
        Artifact::from_path(path).discard().await;
        tokio::fs::remove_dir_all(&dir).await?;
        Ok(())
    }
}
