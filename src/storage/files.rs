use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::FileStore;
use crate::error::SessionError;

/// [`FileStore`] over a local directory
///
/// Free space is modelled as an optional byte quota on the directory.
pub struct LocalFileStore {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl LocalFileStore {
    pub fn new(dir: impl Into<PathBuf>, quota_bytes: Option<u64>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create recordings dir {}", dir.display()))?;
        info!("Recordings directory: {}", dir.display());
        Ok(Self { dir, quota_bytes })
    }

    async fn used_bytes(&self) -> Result<u64> {
        let mut used = 0;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                used += meta.len();
            }
        }
        Ok(used)
    }
}

fn file_name(name: &str, ext: &str) -> String {
    if ext.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", name, ext)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn provide_output_file(&self, name: &str, ext: &str) -> Result<PathBuf> {
        let mut candidate = self.dir.join(file_name(name, ext));
        let mut n = 1;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    candidate = self.dir.join(file_name(&format!("{}-{}", name, n), ext));
                    n += 1;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create {}", candidate.display()))
                }
            }
        }

        debug!("Provided output file {}", candidate.display());
        Ok(candidate)
    }

    async fn copy_into(&self, source: &Path, dest: &Path) -> Result<()> {
        tokio::fs::copy(source, dest).await.with_context(|| {
            format!("Failed to copy {} to {}", source.display(), dest.display())
        })?;
        Ok(())
    }

    async fn rename(&self, path: &Path, new_name: &str, ext: &str) -> Result<PathBuf> {
        let parent = path.parent().unwrap_or(self.dir.as_path());
        let target = parent.join(file_name(new_name, ext));

        if tokio::fs::metadata(&target).await.is_ok() {
            return Err(SessionError::NameConflict(target.display().to_string()).into());
        }

        tokio::fs::rename(path, &target).await.with_context(|| {
            format!("Failed to rename {} to {}", path.display(), target.display())
        })?;
        Ok(target)
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len())
    }

    async fn has_available_space(&self) -> Result<bool> {
        match self.quota_bytes {
            Some(quota) => Ok(self.used_bytes().await? < quota),
            None => Ok(true),
        }
    }

    fn recordings_dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_output_files_are_unique() -> Result<()> {
        let dir = TempDir::new()?;
        let store = LocalFileStore::new(dir.path(), None)?;

        let first = store.provide_output_file("Record", "wav").await?;
        let second = store.provide_output_file("Record", "wav").await?;

        assert_eq!(first.file_name().unwrap(), "Record.wav");
        assert_eq!(second.file_name().unwrap(), "Record-1.wav");
        assert!(store.exists(&second).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_rename_refuses_existing_target() -> Result<()> {
        let dir = TempDir::new()?;
        let store = LocalFileStore::new(dir.path(), None)?;
        let a = store.provide_output_file("a", "wav").await?;
        store.provide_output_file("b", "wav").await?;

        let err = store.rename(&a, "b", "wav").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::NameConflict(_))
        ));
        assert!(store.exists(&a).await);

        let renamed = store.rename(&a, "c", "wav").await?;
        assert_eq!(renamed, dir.path().join("c.wav"));
        assert!(!store.exists(&a).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_quota_limits_space() -> Result<()> {
        let dir = TempDir::new()?;
        let store = LocalFileStore::new(dir.path(), Some(10))?;
        assert!(store.has_available_space().await?);

        std::fs::write(dir.path().join("big.wav"), [0u8; 32])?;
        assert!(!store.has_available_space().await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_ok() -> Result<()> {
        let dir = TempDir::new()?;
        let store = LocalFileStore::new(dir.path(), None)?;
        store.delete_file(&dir.path().join("nope.wav")).await?;
        Ok(())
    }
}
