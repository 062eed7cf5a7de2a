pub mod local;
pub mod webdav;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::Destination;
use crate::model::remote_file::RemoteFile;

/// Errors from a single remote mutation. The reconciler reports these and
/// carries on with the rest of the batch.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{op} {target} returned {status}: {body}")]
    UnexpectedStatus {
        op: &'static str,
        target: String,
        status: StatusCode,
        body: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// The destination folder. Filenames are relative to it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &str;
    /// List the files directly inside the folder; sub-folders are skipped.
    async fn list(&self) -> Result<Vec<RemoteFile>>;
    /// Create the folder. Succeeds when it already exists.
    async fn mkdir(&self) -> Result<(), StoreError>;
    /// Create or overwrite a file.
    async fn upload(&self, content: &str, filename: &str) -> Result<(), StoreError>;
    async fn rename(&self, old_filename: &str, new_filename: &str) -> Result<(), StoreError>;
    async fn delete(&self, filename: &str) -> Result<(), StoreError>;
}

pub fn create_store(destination: &Destination) -> Box<dyn RemoteStore> {
    match destination {
        Destination::Local { output_dir } => Box::new(local::LocalStore::new(output_dir.clone())),
        Destination::Nextcloud(settings) => Box::new(webdav::WebDavStore::new(
            &settings.base_url,
            &settings.user,
            &settings.password,
            &settings.dir,
        )),
    }
}
