use thiserror::Error;

use crate::models::ConversionPass;

#[derive(Error, Debug)]
pub enum WidgetError {
    #[error("Selection rejected: {0}")]
    SelectionRejected(String),

    #[error("File picker failed: {0}")]
    PickerFailed(String),

    #[error("No file selected")]
    NoFileSelected,

    #[error("A conversion is already in progress")]
    ConversionInProgress,

    #[error("Conversion service failed to load: {0}")]
    ServiceLoadFailed(String),

    #[error("Conversion failed during {pass}: {reason}")]
    ConversionCommandFailed { pass: ConversionPass, reason: String },

    #[error("Working file not found: {0}")]
    WorkingStorageMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WidgetError {
    /// Whether the error ended a conversion run (as opposed to a rejected
    /// selection or a call that never started one).
    pub fn is_conversion_failure(&self) -> bool {
        matches!(
            self,
            WidgetError::ServiceLoadFailed(_)
                | WidgetError::ConversionCommandFailed { .. }
                | WidgetError::WorkingStorageMissing(_)
                | WidgetError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WidgetError>;
