use crate::config::WidgetConfig;
use crate::services::conversion::create_service;
use crate::services::service_handle::ServiceHandle;
use std::sync::Arc;
use tracing::info;

/// Builds the shared handle for the configured conversion service. Nothing
/// is loaded until the first conversion asks for it.
pub fn setup_service(config: &WidgetConfig) -> Arc<ServiceHandle> {
    let service_type = config.conversion_service.clone();
    let ffmpeg_path = config.ffmpeg_path.clone();
    let log = config.ffmpeg_log;

    info!(
        "🎛️  Conversion service: {} (binary: {}, log: {})",
        service_type, ffmpeg_path, log
    );

    ServiceHandle::new(move || create_service(&service_type, &ffmpeg_path, log))
}
