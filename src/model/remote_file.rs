use chrono::{DateTime, Utc};

/// An entry listed from the destination folder.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    /// Task id parsed from the filename prefix; `None` for non-task files.
    pub id: Option<u64>,
    /// Full path or href as reported by the store.
    pub path: String,
    pub filename: String,
    pub mtime: Option<DateTime<Utc>>,
}

impl RemoteFile {
    pub fn new(
        path: impl Into<String>,
        filename: impl Into<String>,
        mtime: Option<DateTime<Utc>>,
    ) -> Self {
        let filename = filename.into();
        Self {
            id: parse_task_id(&filename),
            path: path.into(),
            filename,
            mtime,
        }
    }

    /// Task files are the ones whose name starts with a digit and carry a
    /// parsable id; the summary document and anything else are not.
    pub fn is_task_file(&self) -> bool {
        self.filename.starts_with(|c: char| c.is_ascii_digit()) && self.id.is_some()
    }
}

/// Leading digits before the first `_`, e.g. `42_Title.md` -> 42.
pub fn parse_task_id(filename: &str) -> Option<u64> {
    filename.split('_').next()?.parse().ok()
}
