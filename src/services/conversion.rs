use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::utils::validation::validate_working_name;

/// Observer for the running command; receives a completion ratio in `0.0..=1.0`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("service is not loaded")]
    NotLoaded,

    #[error("failed to load: {0}")]
    Load(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("working file '{0}' does not exist")]
    MissingFile(String),

    #[error("invalid working file name: {0}")]
    InvalidName(String),

    #[error("working storage error: {0}")]
    Storage(String),
}

/// Media conversion backend with a private working storage namespace.
///
/// Commands take ffmpeg-style arguments and refer to working files by name.
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// One-time initialization; must succeed before any other call.
    async fn load(&self) -> Result<(), ServiceError>;

    async fn write_working_file(&self, name: &str, data: Bytes) -> Result<(), ServiceError>;

    async fn read_working_file(&self, name: &str) -> Result<Bytes, ServiceError>;

    /// Executes one conversion command to completion.
    async fn run(&self, args: &[String]) -> Result<(), ServiceError>;

    /// Registers the progress observer, replacing any previous one.
    fn set_progress(&self, callback: ProgressCallback);
}

/// Smallest valid GIF: one transparent pixel.
pub const PLACEHOLDER_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

/// In-memory service for development/testing. Commands check their `-i`
/// inputs exist and write a placeholder image to the output name.
#[derive(Default)]
pub struct NoOpService {
    files: DashMap<String, Bytes>,
    progress: Mutex<Option<ProgressCallback>>,
}

impl NoOpService {
    pub fn new() -> Self {
        Self::default()
    }

    fn report(&self, ratio: f64) {
        let callback = self
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(ratio);
        }
    }
}

#[async_trait]
impl ConversionService for NoOpService {
    async fn load(&self) -> Result<(), ServiceError> {
        tracing::warn!("NoOpService: conversions produce placeholder output (development mode)");
        Ok(())
    }

    async fn write_working_file(&self, name: &str, data: Bytes) -> Result<(), ServiceError> {
        validate_working_name(name).map_err(|e| ServiceError::InvalidName(e.to_string()))?;
        self.files.insert(name.to_string(), data);
        Ok(())
    }

    async fn read_working_file(&self, name: &str) -> Result<Bytes, ServiceError> {
        self.files
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::MissingFile(name.to_string()))
    }

    async fn run(&self, args: &[String]) -> Result<(), ServiceError> {
        let inputs = args
            .windows(2)
            .filter(|pair| pair[0] == "-i")
            .map(|pair| pair[1].as_str());
        for input in inputs {
            if !self.files.contains_key(input) {
                return Err(ServiceError::Command(format!(
                    "{}: No such file or directory",
                    input
                )));
            }
        }

        let output = args
            .last()
            .ok_or_else(|| ServiceError::Command("no output file given".to_string()))?;
        validate_working_name(output).map_err(|e| ServiceError::InvalidName(e.to_string()))?;

        for ratio in [0.0, 0.5, 1.0] {
            self.report(ratio);
        }
        self.files
            .insert(output.clone(), Bytes::from_static(PLACEHOLDER_GIF));
        Ok(())
    }

    fn set_progress(&self, callback: ProgressCallback) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}

/// Factory function to create the configured conversion service
pub fn create_service(service_type: &str, ffmpeg_path: &str, log: bool) -> Arc<dyn ConversionService> {
    match service_type.to_lowercase().as_str() {
        "ffmpeg" => Arc::new(super::ffmpeg::FfmpegService::new(ffmpeg_path, log)),
        "noop" | "none" | "disabled" => Arc::new(NoOpService::new()),
        _ => {
            tracing::warn!("Unknown conversion service '{}', using NoOpService", service_type);
            Arc::new(NoOpService::new())
        }
    }
}
