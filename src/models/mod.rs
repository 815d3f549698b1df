use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A file presented to the widget, either on a drag gesture or from a
/// browse selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub content: Bytes,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            size: content.len() as u64,
            content,
        }
    }

    /// Lowercased extension without the leading dot, if the name has one.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Classification of the files carried by the latest drag event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DragState {
    Ok,
    WarningMultipleFiles,
    InvalidNoFiles,
}

impl DragState {
    /// Stateless classifier, re-run on every drag event.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => DragState::InvalidNoFiles,
            1 => DragState::Ok,
            _ => DragState::WarningMultipleFiles,
        }
    }

    pub fn classify(files: &[FileEntry]) -> Self {
        Self::from_count(files.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    #[default]
    Empty,
    Loading,
    Loaded,
}

/// The pass of the two-pass palette encode currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionPass {
    Palette,
    Encode,
}

impl fmt::Display for ConversionPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionPass::Palette => write!(f, "palette generation"),
            ConversionPass::Encode => write!(f, "palette encode"),
        }
    }
}

/// Lifecycle of the conversion job as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum ConversionStatus {
    #[default]
    Idle,
    LoadingService,
    Running(ConversionPass),
    Completed,
    Failed(String),
}

impl ConversionStatus {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ConversionStatus::LoadingService | ConversionStatus::Running(_)
        )
    }
}

/// Output of a finished conversion, resolvable through the artifact store.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertedArtifact {
    pub url: String,
    pub mime_type: String,
    pub size: usize,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
}
