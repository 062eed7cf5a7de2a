use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{RemoteStore, StoreError};
use crate::model::remote_file::RemoteFile;

/// A plain directory on disk, for use with an external sync client.
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(&self) -> Result<Vec<RemoteFile>> {
        let exists = tokio::fs::try_exists(&self.dir)
            .await
            .with_context(|| format!("Failed to check {}", self.dir.display()))?;
        if !exists {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read {}", self.dir.display()))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().to_string();
            let mtime = metadata.modified().ok().map(DateTime::<Utc>::from);
            files.push(RemoteFile::new(
                entry.path().display().to_string(),
                filename,
                mtime,
            ));
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    async fn mkdir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn upload(&self, content: &str, filename: &str) -> Result<(), StoreError> {
        let path = self.dir.join(filename);
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), "Wrote file");
        Ok(())
    }

    async fn rename(&self, old_filename: &str, new_filename: &str) -> Result<(), StoreError> {
        tokio::fs::rename(self.dir.join(old_filename), self.dir.join(new_filename)).await?;
        debug!(from = old_filename, to = new_filename, "Renamed file");
        Ok(())
    }

    async fn delete(&self, filename: &str) -> Result<(), StoreError> {
        tokio::fs::remove_file(self.dir.join(filename)).await?;
        debug!(filename, "Removed file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_dir_lists_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(tmp.path().join("not-yet"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mkdir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out").join("tasks");
        let store = LocalStore::new(dir.clone());
        store.mkdir().await.unwrap();
        store.mkdir().await.unwrap();
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn upload_rename_delete_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(tmp.path().to_path_buf());

        store.upload("# A", "1_A.md").await.unwrap();
        store.upload("summary", "tasks.md").await.unwrap();
        std::fs::create_dir(tmp.path().join("2_subdir")).unwrap();

        let files = store.list().await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["1_A.md", "tasks.md"]);
        assert_eq!(files[0].id, Some(1));
        assert!(files[0].mtime.is_some());

        store.rename("1_A.md", "1_B.md").await.unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("1_B.md")).unwrap(), "# A");
        assert!(!tmp.path().join("1_A.md").exists());

        store.delete("1_B.md").await.unwrap();
        assert!(!tmp.path().join("1_B.md").exists());
    }

    #[tokio::test]
    async fn delete_missing_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::new(tmp.path().to_path_buf());
        assert!(matches!(
            store.delete("9_Nope.md").await,
            Err(StoreError::Io(_))
        ));
    }
}
