pub mod config;
pub mod dropzone;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;
pub mod widget;

pub use crate::config::WidgetConfig;
pub use crate::dropzone::{DragEvent, DragPhase, DropzoneController, DropzoneOptions, Surface};
pub use crate::error::{Result, WidgetError};
pub use crate::models::{
    ConversionPass, ConversionStatus, ConvertedArtifact, DragState, FileEntry, UploadState,
};
pub use crate::services::artifacts::ArtifactStore;
pub use crate::services::conversion::{ConversionService, ServiceError};
pub use crate::services::service_handle::ServiceHandle;
pub use crate::widget::UploadWidget;
