use std::env;

use crate::utils::validation::{DEFAULT_ACCEPT, parse_accept};

/// Configuration for the upload widget and its conversion service
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Path or name of the ffmpeg binary (default: "ffmpeg")
    pub ffmpeg_path: String,

    /// Accepted file extensions, lowercase without the dot
    /// (default: mp4, mov, avi, webm, mkv)
    pub accepted_extensions: Vec<String>,

    /// Conversion service type: "ffmpeg" or "noop" (default: "ffmpeg")
    pub conversion_service: String,

    /// Forward ffmpeg log lines to tracing (default: true)
    pub ffmpeg_log: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            accepted_extensions: parse_accept(DEFAULT_ACCEPT),
            conversion_service: "ffmpeg".to_string(),
            ffmpeg_log: true,
        }
    }
}

impl WidgetConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),

            accepted_extensions: env::var("ACCEPTED_EXTENSIONS")
                .ok()
                .map(|v| parse_accept(&v))
                .filter(|exts| !exts.is_empty())
                .unwrap_or(default.accepted_extensions),

            conversion_service: env::var("CONVERSION_SERVICE")
                .unwrap_or(default.conversion_service),

            ffmpeg_log: env::var("FFMPEG_LOG")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.ffmpeg_log),
        }
    }

    /// Create config for development (no external binary, quiet service)
    pub fn development() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            accepted_extensions: parse_accept(DEFAULT_ACCEPT),
            conversion_service: "noop".to_string(),
            ffmpeg_log: false,
        }
    }

    /// The accepted extensions rendered as an HTML-style accept string.
    pub fn accept_string(&self) -> String {
        self.accepted_extensions
            .iter()
            .map(|ext| format!(".{}", ext))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WidgetConfig::default();
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.conversion_service, "ffmpeg");
        assert_eq!(
            config.accepted_extensions,
            vec!["mp4", "mov", "avi", "webm", "mkv"]
        );
        assert!(config.ffmpeg_log);
    }

    #[test]
    fn test_development_config() {
        let config = WidgetConfig::development();
        assert_eq!(config.conversion_service, "noop");
        assert!(!config.ffmpeg_log);
    }

    #[test]
    fn test_accept_string() {
        let config = WidgetConfig::default();
        assert_eq!(config.accept_string(), ".mp4,.mov,.avi,.webm,.mkv");
    }
}
