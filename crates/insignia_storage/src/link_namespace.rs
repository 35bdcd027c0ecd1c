//! Physical link namespace.
//!
//! Each media class gets its own directory under the link root (by default
//! `{class}s/`), holding one entry per link name. Entries are hard links into
//! the blob root so a link can be served without consulting the catalog; when
//! the two roots are on different devices a symbolic link is used instead.

use crate::filesystem::temp_sibling;
use insignia_core::MediaPolicy;
use insignia_error::{InsigniaResult, StorageError, StorageErrorKind};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Link namespace rooted at a directory.
#[derive(Debug, Clone)]
pub struct LinkNamespace {
    root: PathBuf,
}

impl LinkNamespace {
    /// Open the link root, creating it if needed.
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

        tracing::info!(path = %root.display(), "Opened link root");
        Ok(Self { root })
    }

    /// The link root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `name` in the policy's namespace.
    pub fn entry_path(&self, policy: &MediaPolicy, name: &str) -> PathBuf {
        self.root.join(policy.link_path(name))
    }

    /// Make the entry for `name` point at `target`.
    ///
    /// An entry that already points at `target` is left alone; any other
    /// entry is atomically replaced.
    #[tracing::instrument(skip(self, policy), fields(media_class = %policy.media_class()))]
    pub async fn install(&self, policy: &MediaPolicy, name: &str, target: &Path) -> InsigniaResult<PathBuf> {
        let entry = self.entry_path(policy, name);

        if points_at(&entry, target).await {
            tracing::debug!(entry = %entry.display(), "Link entry already current");
            return Ok(entry);
        }

        if let Some(parent) = entry.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let temp = temp_sibling(&entry);
        link_or_symlink(target, &temp).await?;

        if let Err(e) = tokio::fs::rename(&temp, &entry).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StorageError::new(StorageErrorKind::LinkCreation(format!(
                "rename {} to {}: {}",
                temp.display(),
                entry.display(),
                e
            )))
            .into());
        }

        tracing::debug!(entry = %entry.display(), target = %target.display(), "Installed link entry");
        Ok(entry)
    }

    /// Remove the entry for `name` if it still points at `target`.
    ///
    /// Returns whether an entry was removed. A missing entry, or one that was
    /// already replaced by a newer binding, is left as is.
    #[tracing::instrument(skip(self, policy), fields(media_class = %policy.media_class()))]
    pub async fn remove(&self, policy: &MediaPolicy, name: &str, target: &Path) -> InsigniaResult<bool> {
        let entry = self.entry_path(policy, name);

        if tokio::fs::symlink_metadata(&entry).await.is_err() {
            return Ok(false);
        }
        // Entries whose target file is already gone cannot be compared; they
        // are dangling either way.
        let target_exists = tokio::fs::try_exists(target).await.unwrap_or(false);
        if target_exists && !points_at(&entry, target).await {
            tracing::debug!(entry = %entry.display(), "Link entry rebound, leaving it");
            return Ok(false);
        }

        match tokio::fs::remove_file(&entry).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::new(StorageErrorKind::FileRemove(format!(
                "{}: {}",
                entry.display(),
                e
            )))
            .into()),
        }
    }
}

/// Whether `entry` exists and resolves to the same file as `target`.
async fn points_at(entry: &Path, target: &Path) -> bool {
    let Ok(meta) = tokio::fs::symlink_metadata(entry).await else {
        return false;
    };

    if meta.file_type().is_symlink() {
        return tokio::fs::read_link(entry)
            .await
            .map(|dest| dest == target)
            .unwrap_or(false);
    }

    same_file(entry, target).await
}

#[cfg(unix)]
async fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (tokio::fs::metadata(a).await, tokio::fs::metadata(b).await) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
async fn same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::read(a).await, tokio::fs::read(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn link_or_symlink(target: &Path, entry: &Path) -> InsigniaResult<()> {
    match tokio::fs::hard_link(target, entry).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            tracing::debug!(target = %target.display(), "Hard link crosses devices, using symlink");
            symlink(target, entry).await.map_err(|e| {
                StorageError::new(StorageErrorKind::LinkCreation(format!(
                    "symlink {} -> {}: {}",
                    entry.display(),
                    target.display(),
                    e
                )))
                .into()
            })
        }
        Err(e) => Err(StorageError::new(StorageErrorKind::LinkCreation(format!(
            "{} -> {}: {}",
            entry.display(),
            target.display(),
            e
        )))
        .into()),
    }
}

#[cfg(unix)]
async fn symlink(target: &Path, entry: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, entry).await
}

#[cfg(windows)]
async fn symlink(target: &Path, entry: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_file(target, entry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use insignia_core::PolicyTable;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LinkNamespace, MediaPolicy, PathBuf) {
        let dir = TempDir::new().unwrap();
        let ns = LinkNamespace::new(dir.path().join("links")).unwrap();
        let policy = PolicyTable::builtin().resolve("team-logo").unwrap().clone();
        let blob = dir.path().join("blob-a.png");
        std::fs::write(&blob, b"a").unwrap();
        (dir, ns, policy, blob)
    }

    #[tokio::test]
    async fn install_is_idempotent() {
        let (dir, ns, policy, blob) = setup();

        let entry = ns.install(&policy, "alpha.png", &blob).await.unwrap();
        assert_eq!(entry, dir.path().join("links/team-logos/alpha.png"));
        ns.install(&policy, "alpha.png", &blob).await.unwrap();

        assert_eq!(std::fs::read(&entry).unwrap(), b"a");
        assert_eq!(std::fs::read_dir(entry.parent().unwrap()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn install_replaces_stale_entry() {
        let (dir, ns, policy, blob) = setup();
        let other = dir.path().join("blob-b.png");
        std::fs::write(&other, b"b").unwrap();

        ns.install(&policy, "alpha.png", &other).await.unwrap();
        let entry = ns.install(&policy, "alpha.png", &blob).await.unwrap();
        assert_eq!(std::fs::read(entry).unwrap(), b"a");
    }

    #[tokio::test]
    async fn remove_only_touches_matching_entry() {
        let (dir, ns, policy, blob) = setup();
        let other = dir.path().join("blob-b.png");
        std::fs::write(&other, b"b").unwrap();

        ns.install(&policy, "alpha.png", &other).await.unwrap();
        assert!(!ns.remove(&policy, "alpha.png", &blob).await.unwrap());
        assert!(ns.remove(&policy, "alpha.png", &other).await.unwrap());
        assert!(!ns.remove(&policy, "alpha.png", &other).await.unwrap());
    }
}
