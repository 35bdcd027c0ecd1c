//! Blob files under the blob root.
//!
//! Files are addressed by the location recorded in the catalog, relative to
//! the root. Writes go through a uniquely named temp file and a rename, so a
//! reader never observes a partial blob and concurrent writers never share a
//! temp path.

use insignia_error::{InsigniaResult, StorageError, StorageErrorKind};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Blob file area.
#[derive(Debug, Clone)]
pub struct BlobFiles {
    root: PathBuf,
}

impl BlobFiles {
    /// Open the blob root, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    #[tracing::instrument(skip(root))]
    pub fn new(root: impl Into<PathBuf>) -> InsigniaResult<Self> {
        let root = root.into();

        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                root.display(),
                e
            )))
        })?;

        tracing::info!(path = %root.display(), "Opened blob root");
        Ok(Self { root })
    }

    /// The blob root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a catalog location.
    ///
    /// # Errors
    ///
    /// `InvalidPath` for absolute locations or locations that climb out of the root.
    pub fn path_of(&self, location: &Path) -> InsigniaResult<PathBuf> {
        let escapes = location
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || location.as_os_str().is_empty() {
            return Err(StorageError::new(StorageErrorKind::InvalidPath(
                location.display().to_string(),
            ))
            .into());
        }
        Ok(self.root.join(location))
    }

    /// Write bytes atomically at `location`.
    #[tracing::instrument(skip(self, data), fields(location = %location.display(), size = data.len()))]
    pub async fn write(&self, location: &Path, data: &[u8]) -> InsigniaResult<PathBuf> {
        let path = self.path_of(location)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let temp_path = temp_sibling(&path);
        if let Err(e) = tokio::fs::write(&temp_path, data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::new(StorageErrorKind::FileWrite(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
            .into());
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::new(StorageErrorKind::FileWrite(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            )))
            .into());
        }

        tracing::debug!(path = %path.display(), "Wrote blob file");
        Ok(path)
    }

    /// Read the bytes at `location`; `None` if the file is missing.
    #[tracing::instrument(skip(self), fields(location = %location.display()))]
    pub async fn read(&self, location: &Path) -> InsigniaResult<Option<Vec<u8>>> {
        let path = self.path_of(location)?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::new(StorageErrorKind::FileRead(format!(
                "{}: {}",
                path.display(),
                e
            )))
            .into()),
        }
    }

    /// Remove the file at `location`. Returns whether a file was removed;
    /// a missing file is not an error.
    #[tracing::instrument(skip(self), fields(location = %location.display()))]
    pub async fn remove(&self, location: &Path) -> InsigniaResult<bool> {
        let path = self.path_of(location)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed blob file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::new(StorageErrorKind::FileRemove(format!(
                "{}: {}",
                path.display(),
                e
            )))
            .into()),
        }
    }
}

/// `dir/.name.<uuid>.tmp` next to `path`.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_read_remove() {
        let dir = TempDir::new().unwrap();
        let files = BlobFiles::new(dir.path()).unwrap();
        let location = Path::new("font/abc.ttf");

        let path = files.write(location, b"bytes").await.unwrap();
        assert_eq!(path, dir.path().join("font/abc.ttf"));
        assert_eq!(files.read(location).await.unwrap().unwrap(), b"bytes");

        assert!(files.remove(location).await.unwrap());
        assert!(!files.remove(location).await.unwrap());
        assert!(files.read(location).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let files = BlobFiles::new(dir.path()).unwrap();
        files.write(Path::new("font/a.ttf"), b"one").await.unwrap();
        files.write(Path::new("font/a.ttf"), b"two").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("font"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("a.ttf")]);
    }

    #[test]
    fn locations_cannot_escape_the_root() {
        let dir = TempDir::new().unwrap();
        let files = BlobFiles::new(dir.path()).unwrap();
        assert!(files.path_of(Path::new("../etc/passwd")).is_err());
        assert!(files.path_of(Path::new("/etc/passwd")).is_err());
        assert!(files.path_of(Path::new("")).is_err());
        assert!(files.path_of(Path::new("team-logo/x.png")).is_ok());
    }
}
