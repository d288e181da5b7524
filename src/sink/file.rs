// src/sink/file.rs

//! Line-oriented filesystem sink.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::sink::RecordSink;

/// Appends one JSON line per record under
/// `{root}/<entity>/<technology>/<source>.log`.
#[derive(Clone)]
pub struct FileSink {
    root_dir: PathBuf,
}

impl FileSink {
    /// Create a new sink rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn path(&self, qualified_name: &str) -> PathBuf {
        let mut path = self.root_dir.clone();
        for segment in qualified_name.split('.') {
            path.push(segment);
        }
        path.set_extension("log");
        path
    }
}

#[async_trait]
impl RecordSink for FileSink {
    async fn emit(&self, qualified_name: &str, record: &Value) -> Result<()> {
        let path = self.path(qualified_name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
