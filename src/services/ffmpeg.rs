use anyhow::{Context, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, OnceLock, PoisonError};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::services::conversion::{ConversionService, ProgressCallback, ServiceError};
use crate::services::progress::ProgressParser;
use crate::utils::validation::validate_working_name;

/// Number of trailing stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 12;

/// Runs the ffmpeg binary as a subprocess. Working storage is a temporary
/// directory created on load and removed when the service is dropped.
pub struct FfmpegService {
    binary: String,
    log: bool,
    workdir: OnceLock<TempDir>,
    progress: Mutex<Option<ProgressCallback>>,
}

impl FfmpegService {
    pub fn new(binary: impl Into<String>, log: bool) -> Self {
        Self {
            binary: binary.into(),
            log,
            workdir: OnceLock::new(),
            progress: Mutex::new(None),
        }
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.workdir.get().map(|dir| dir.path())
    }

    fn working_path(&self, name: &str) -> Result<PathBuf, ServiceError> {
        validate_working_name(name).map_err(|e| ServiceError::InvalidName(e.to_string()))?;
        let dir = self.working_dir().ok_or(ServiceError::NotLoaded)?;
        Ok(dir.join(name))
    }

    fn progress_callback(&self) -> Option<ProgressCallback> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn probe_binary(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to execute '{}'", self.binary))?;

        if !output.status.success() {
            return Err(anyhow!(
                "'{} -version' exited with {}",
                self.binary,
                output.status
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }

    async fn execute(&self, dir: &Path, args: &[String]) -> anyhow::Result<()> {
        let mut child = Command::new(&self.binary)
            .arg("-y") // Overwrite output
            .arg("-nostdin")
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", self.binary))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stderr was not captured"))?;

        let callback = self.progress_callback();
        let mut parser = ProgressParser::new();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

        read_log_lines(stderr, |line| {
            if self.log {
                debug!(target: "gif_dropzone::ffmpeg", "{}", line);
            }
            if let (Some(ratio), Some(callback)) = (parser.feed(line), callback.as_ref()) {
                callback(ratio);
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        })
        .await?;

        let status = child.wait().await?;
        if !status.success() {
            let err_msg = tail.into_iter().collect::<Vec<_>>().join("\n");
            error!("ffmpeg failed ({}): {}", status, err_msg);
            return Err(anyhow!("ffmpeg exited with {}: {}", status, err_msg));
        }

        if let Some(callback) = callback {
            callback(1.0);
        }
        Ok(())
    }
}

/// Splits ffmpeg's stderr into lines. Status updates end in `\r` rather
/// than `\n`, so both count as terminators.
async fn read_log_lines<R, F>(mut reader: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut buffer = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        for &byte in &buffer[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !pending.is_empty() {
                    on_line(&String::from_utf8_lossy(&pending));
                    pending.clear();
                }
            } else {
                pending.push(byte);
            }
        }
    }

    if !pending.is_empty() {
        on_line(&String::from_utf8_lossy(&pending));
    }
    Ok(())
}

#[async_trait]
impl ConversionService for FfmpegService {
    async fn load(&self) -> Result<(), ServiceError> {
        let version = self
            .probe_binary()
            .await
            .map_err(|e| ServiceError::Load(e.to_string()))?;

        if self.workdir.get().is_none() {
            let dir = tempfile::Builder::new()
                .prefix("gif-dropzone-")
                .tempdir()
                .map_err(|e| ServiceError::Load(format!("failed to create working directory: {}", e)))?;
            // A concurrent load may have won; its directory is kept and ours is removed.
            let _ = self.workdir.set(dir);
        }

        info!(
            "🎞️  ffmpeg ready: {} (working dir: {:?})",
            version,
            self.working_dir()
        );
        Ok(())
    }

    async fn write_working_file(&self, name: &str, data: Bytes) -> Result<(), ServiceError> {
        let path = self.working_path(name)?;
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ServiceError::Storage(format!("failed to write '{}': {}", name, e)))
    }

    async fn read_working_file(&self, name: &str) -> Result<Bytes, ServiceError> {
        let path = self.working_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ServiceError::MissingFile(name.to_string()))
            }
            Err(e) => Err(ServiceError::Storage(format!(
                "failed to read '{}': {}",
                name, e
            ))),
        }
    }

    async fn run(&self, args: &[String]) -> Result<(), ServiceError> {
        let dir = self.working_dir().ok_or(ServiceError::NotLoaded)?;
        debug!("ffmpeg {}", args.join(" "));
        self.execute(dir, args)
            .await
            .map_err(|e| ServiceError::Command(e.to_string()))
    }

    fn set_progress(&self, callback: ProgressCallback) {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}
