use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

use crate::models::FileEntry;

/// Source of browse selections (the "browse for file" dialog).
#[async_trait]
pub trait FilePicker: Send + Sync {
    /// Returns the files the user chose; an empty list means the dialog was
    /// dismissed.
    async fn pick(&self, accept: &str, multiple: bool) -> Result<Vec<FileEntry>>;
}

/// Picker that "chooses" a fixed list of paths and reads them from disk.
pub struct PathPicker {
    paths: Vec<PathBuf>,
}

impl PathPicker {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl FilePicker for PathPicker {
    async fn pick(&self, accept: &str, multiple: bool) -> Result<Vec<FileEntry>> {
        tracing::debug!(
            "Picking {} path(s) (accept: {}, multiple: {})",
            self.paths.len(),
            accept,
            multiple
        );

        let mut files = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("{:?} has no usable file name", path))?
                .to_string();
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {:?}", path))?;
            files.push(FileEntry::new(name, Bytes::from(data)));
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_path_picker_reads_files() {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(b"not really a video").unwrap();

        let picker = PathPicker::new(vec![file.path().to_path_buf()]);
        let files = picker.pick(".mp4", false).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].name.ends_with(".mp4"));
        assert_eq!(files[0].size, 18);
    }

    #[tokio::test]
    async fn test_path_picker_missing_file() {
        let picker = PathPicker::new(vec![PathBuf::from("/nonexistent/clip.mp4")]);
        assert!(picker.pick(".mp4", false).await.is_err());
    }
}
