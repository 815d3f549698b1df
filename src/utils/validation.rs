use anyhow::{Result, anyhow};
use std::path::Path;

use crate::models::FileEntry;

/// Accept string for the video formats the widget converts
pub const DEFAULT_ACCEPT: &str = ".mp4,.mov,.avi,.webm,.mkv";

/// Media type of the converted output
pub const GIF_MIME_TYPE: &str = "image/gif";

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Parses an HTML-style accept string (".mp4, .MOV,webm") into lowercase
/// extensions without the leading dot. MIME entries are skipped.
pub fn parse_accept(accept: &str) -> Vec<String> {
    accept
        .split(',')
        .map(|part| part.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
        .collect()
}

/// Checks the file name against the accepted extensions (case-insensitive)
pub fn has_accepted_extension(name: &str, accepted: &[String]) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        accepted.iter().any(|a| a.eq_ignore_ascii_case(ext))
    })
}

/// Validates a browse selection: exactly one file with an accepted extension.
pub fn validate_selection<'a>(files: &'a [FileEntry], accepted: &[String]) -> Result<&'a FileEntry> {
    let file = match files {
        [file] => file,
        _ => {
            return Err(anyhow!(ValidationError {
                code: "INVALID_FILE_COUNT",
                message: format!("expected exactly 1 file, got {}", files.len()),
            }));
        }
    };
    validate_extension(file, accepted)?;
    Ok(file)
}

/// Validates a single file's extension against the accepted list
pub fn validate_extension(file: &FileEntry, accepted: &[String]) -> Result<()> {
    if has_accepted_extension(&file.name, accepted) {
        return Ok(());
    }

    Err(anyhow!(ValidationError {
        code: "INVALID_EXTENSION",
        message: format!(
            "'{}' is not one of the accepted formats ({})",
            file.name,
            accepted.join(", ")
        ),
    }))
}

/// Validates a key for the conversion service's working storage.
/// Keys are flat names; anything that could address a path outside the
/// working directory is refused.
pub fn validate_working_name(name: &str) -> Result<()> {
    let base = Path::new(name).file_name().and_then(|n| n.to_str());

    if name.is_empty() || base != Some(name) || name == ".." || name.contains('\\') {
        tracing::warn!("Refusing working file name: {:?}", name);
        return Err(anyhow!(ValidationError {
            code: "INVALID_WORKING_NAME",
            message: format!("'{}' is not a valid working file name", name),
        }));
    }
    Ok(())
}

/// Checks magic bytes to confirm the buffer holds a GIF image
pub fn is_gif(data: &[u8]) -> bool {
    infer::get(data).is_some_and(|kind| kind.mime_type() == GIF_MIME_TYPE)
}
