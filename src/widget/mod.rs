//! Single-file upload widget that turns a video into a GIF.
//!
//! The widget owns the selected file and derives the text shown on the drop
//! surface. `convert` runs the two-pass palette pipeline against the shared
//! conversion service:
//!
//! 1. `-i <input> -filter_complex "[0:v] palettegen" palette.png`
//! 2. `-i <input> -i palette.png -filter_complex "[0:v][1:v] paletteuse" output.gif`
//!
//! Only one conversion runs per widget at a time. Both passes share the
//! service's working storage under fixed names, so widgets sharing a
//! service handle take turns through [`ServiceHandle::exclusive`].

use bytes::Bytes;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::WidgetConfig;
use crate::dropzone::{DropzoneController, DropzoneOptions, Surface};
use crate::error::{Result, WidgetError};
use crate::models::{
    ConversionPass, ConversionStatus, ConvertedArtifact, DragState, FileEntry, UploadState,
};
use crate::services::artifacts::ArtifactStore;
use crate::services::conversion::ServiceError;
use crate::services::picker::FilePicker;
use crate::services::progress::ProgressTracker;
use crate::services::service_handle::ServiceHandle;
use crate::utils::validation::{GIF_MIME_TYPE, is_gif, validate_extension, validate_selection};

pub const DEFAULT_MESSAGE: &str = "drag file here or browse for file upload";
pub const NO_FILE_MESSAGE: &str = "no file detected!";
pub const MULTIPLE_FILE_MESSAGE: &str = "can only upload 1 file at a time!";

/// Working storage name of the generated palette
pub const PALETTE_FILE: &str = "palette.png";
/// Working storage name of the encoded GIF
pub const OUTPUT_FILE: &str = "output.gif";

pub fn palette_args(input: &str) -> Vec<String> {
    ["-i", input, "-filter_complex", "[0:v] palettegen", PALETTE_FILE]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn encode_args(input: &str) -> Vec<String> {
    [
        "-i",
        input,
        "-i",
        PALETTE_FILE,
        "-filter_complex",
        "[0:v][1:v] paletteuse",
        OUTPUT_FILE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Text shown on the drop surface. Drag state wins over the selection.
pub fn resolve_message(dragging: bool, drag_state: DragState, selected: Option<&str>) -> String {
    if dragging {
        return match drag_state {
            DragState::Ok => DEFAULT_MESSAGE,
            DragState::WarningMultipleFiles => MULTIPLE_FILE_MESSAGE,
            DragState::InvalidNoFiles => NO_FILE_MESSAGE,
        }
        .to_string();
    }
    selected.unwrap_or(DEFAULT_MESSAGE).to_string()
}

struct WidgetState {
    file: Option<FileEntry>,
    drag_state: DragState,
    status: ConversionStatus,
    artifact: Option<ConvertedArtifact>,
    converting: bool,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            file: None,
            drag_state: DragState::Ok,
            status: ConversionStatus::Idle,
            artifact: None,
            converting: false,
        }
    }
}

type SharedState = Arc<Mutex<WidgetState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, WidgetState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Applies a browse selection: exactly one file with an accepted extension.
fn apply_selection(state: &SharedState, accepted: &[String], files: &[FileEntry]) -> Result<()> {
    let file = validate_selection(files, accepted).map_err(|e| {
        debug!("Browse selection ignored: {}", e);
        WidgetError::SelectionRejected(e.to_string())
    })?;
    info!("📄 Selected {} ({} bytes)", file.name, file.size);
    lock(state).file = Some(file.clone());
    Ok(())
}

/// Applies a drop: the first file is taken when its extension is accepted.
fn apply_drop(state: &SharedState, accepted: &[String], files: &[FileEntry]) {
    let Some(file) = files.first() else {
        return;
    };
    if let Err(e) = validate_extension(file, accepted) {
        debug!("Dropped file ignored: {}", e);
        return;
    }
    info!("📄 Dropped {} ({} bytes)", file.name, file.size);
    lock(state).file = Some(file.clone());
}

/// Clears the in-progress flag on every exit path, including a dropped
/// `convert` future.
struct ConversionGuard {
    state: SharedState,
}

impl Drop for ConversionGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.converting = false;
        if state.status.is_running() {
            warn!("Conversion aborted before completion");
            state.status = ConversionStatus::Failed("conversion aborted".to_string());
        }
    }
}

fn command_error(pass: ConversionPass, err: ServiceError) -> WidgetError {
    match err {
        ServiceError::MissingFile(name) => WidgetError::WorkingStorageMissing(name),
        ServiceError::NotLoaded | ServiceError::Load(_) => {
            WidgetError::ServiceLoadFailed(err.to_string())
        }
        other => WidgetError::ConversionCommandFailed {
            pass,
            reason: other.to_string(),
        },
    }
}

pub struct UploadWidget {
    config: WidgetConfig,
    accepted: Arc<Vec<String>>,
    state: SharedState,
    dropzone: DropzoneController,
    service: Arc<ServiceHandle>,
    artifacts: ArtifactStore,
    progress: Arc<ProgressTracker>,
}

impl UploadWidget {
    pub fn new(config: WidgetConfig, service: Arc<ServiceHandle>, artifacts: ArtifactStore) -> Self {
        Self::build(config, service, artifacts, None)
    }

    /// Like [`UploadWidget::new`], but clicking the drop surface opens
    /// `picker`. The selection is applied on a spawned task.
    pub fn with_picker(
        config: WidgetConfig,
        service: Arc<ServiceHandle>,
        artifacts: ArtifactStore,
        picker: Arc<dyn FilePicker>,
    ) -> Self {
        Self::build(config, service, artifacts, Some(picker))
    }

    fn build(
        config: WidgetConfig,
        service: Arc<ServiceHandle>,
        artifacts: ArtifactStore,
        picker: Option<Arc<dyn FilePicker>>,
    ) -> Self {
        let state: SharedState = Arc::new(Mutex::new(WidgetState::default()));
        let accepted = Arc::new(config.accepted_extensions.clone());

        let resolve_drag_state = {
            let state = state.clone();
            move |files: &[FileEntry]| {
                let drag_state = DragState::classify(files);
                debug!("Drag over surface with {} file(s): {:?}", files.len(), drag_state);
                lock(&state).drag_state = drag_state;
            }
        };
        let resolve_drag_state = Arc::new(resolve_drag_state);

        let mut options = DropzoneOptions::new()
            .on_drag_enter({
                let f = resolve_drag_state.clone();
                move |files: &[FileEntry]| f(files)
            })
            .on_drag_leave({
                let f = resolve_drag_state.clone();
                move |files: &[FileEntry]| f(files)
            })
            .on_drag_start({
                let f = resolve_drag_state.clone();
                move |files: &[FileEntry]| f(files)
            })
            .on_drag_over({
                let f = resolve_drag_state.clone();
                move |files: &[FileEntry]| f(files)
            })
            .on_drag({
                let f = resolve_drag_state.clone();
                move |files: &[FileEntry]| f(files)
            })
            .on_drag_end({
                let f = resolve_drag_state;
                move |files: &[FileEntry]| f(files)
            })
            .on_drop({
                let state = state.clone();
                let accepted = accepted.clone();
                move |files: &[FileEntry]| apply_drop(&state, &accepted, files)
            });

        if let Some(picker) = picker {
            let state = state.clone();
            let accepted = accepted.clone();
            let accept = config.accept_string();
            options = options.on_click(move |_: &[FileEntry]| {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    warn!("No async runtime available, ignoring browse request");
                    return;
                };
                let picker = picker.clone();
                let state = state.clone();
                let accepted = accepted.clone();
                let accept = accept.clone();
                runtime.spawn(async move {
                    match picker.pick(&accept, false).await {
                        Ok(files) => {
                            let _ = apply_selection(&state, &accepted, &files);
                        }
                        Err(e) => error!("File picker failed: {}", e),
                    }
                });
            });
        }

        Self {
            config,
            accepted,
            state,
            dropzone: DropzoneController::new(options),
            service,
            artifacts,
            progress: ProgressTracker::new(),
        }
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn bind(&self, surface: &Surface) {
        self.dropzone.bind(surface);
    }

    pub fn unbind(&self) {
        self.dropzone.unbind();
    }

    pub fn dropzone(&self) -> &DropzoneController {
        &self.dropzone
    }

    pub fn message(&self) -> String {
        let state = lock(&self.state);
        resolve_message(
            self.dropzone.is_dragging(),
            state.drag_state,
            state.file.as_ref().map(|f| f.name.as_str()),
        )
    }

    pub fn drag_state(&self) -> DragState {
        lock(&self.state).drag_state
    }

    pub fn selected_file(&self) -> Option<FileEntry> {
        lock(&self.state).file.clone()
    }

    pub fn upload_state(&self) -> UploadState {
        let state = lock(&self.state);
        if state.file.is_none() {
            UploadState::Empty
        } else if state.converting {
            UploadState::Loading
        } else {
            UploadState::Loaded
        }
    }

    /// Applies the result of a browse dialog. Anything other than exactly
    /// one accepted file leaves the selection unchanged.
    pub fn select_files(&self, files: &[FileEntry]) -> Result<()> {
        apply_selection(&self.state, &self.accepted, files)
    }

    /// Opens `picker` and applies its result as a browse selection. A picker
    /// that cannot produce files fails with [`WidgetError::PickerFailed`].
    pub async fn browse(&self, picker: &dyn FilePicker) -> Result<()> {
        let files = picker
            .pick(&self.config.accept_string(), false)
            .await
            .map_err(|e| WidgetError::PickerFailed(format!("{:#}", e)))?;
        self.select_files(&files)
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress.get()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Option<u8>> {
        self.progress.subscribe()
    }

    pub fn status(&self) -> ConversionStatus {
        lock(&self.state).status.clone()
    }

    /// Label of the convert affordance.
    pub fn convert_label(&self) -> String {
        match self.progress() {
            None => "convert".to_string(),
            Some(percent) => format!("convert ({}%)", percent),
        }
    }

    pub fn can_convert(&self) -> bool {
        let state = lock(&self.state);
        state.file.is_some() && !state.converting
    }

    pub fn can_download(&self) -> bool {
        lock(&self.state).artifact.is_some()
    }

    pub fn artifact(&self) -> Option<ConvertedArtifact> {
        lock(&self.state).artifact.clone()
    }

    /// Bytes behind the current artifact, if any.
    pub fn download(&self) -> Option<Bytes> {
        let artifact = self.artifact()?;
        self.artifacts.resolve(&artifact.url).map(|object| object.data)
    }

    /// Converts the selected video to a GIF.
    ///
    /// Fails fast with [`WidgetError::NoFileSelected`] or
    /// [`WidgetError::ConversionInProgress`] without touching the service.
    /// On failure the status becomes `Failed`, no artifact is exposed and
    /// progress keeps its last value.
    pub async fn convert(&self) -> Result<ConvertedArtifact> {
        let file = {
            let mut state = lock(&self.state);
            let file = state.file.clone().ok_or(WidgetError::NoFileSelected)?;
            if state.converting {
                return Err(WidgetError::ConversionInProgress);
            }
            state.converting = true;
            state.status = ConversionStatus::LoadingService;
            if let Some(previous) = state.artifact.take() {
                self.artifacts.revoke(&previous.url);
            }
            file
        };
        let _guard = ConversionGuard {
            state: self.state.clone(),
        };

        info!("🎬 Starting conversion of {}", file.name);
        self.progress.reset();

        match self.run_pipeline(&file).await {
            Ok(artifact) => {
                let mut state = lock(&self.state);
                state.artifact = Some(artifact.clone());
                state.status = ConversionStatus::Completed;
                info!("✅ {} converted ({} bytes)", file.name, artifact.size);
                Ok(artifact)
            }
            Err(e) => {
                error!("Conversion of {} failed: {}", file.name, e);
                lock(&self.state).status = ConversionStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, file: &FileEntry) -> Result<ConvertedArtifact> {
        let _exclusive = self.service.exclusive().await;
        let service = self
            .service
            .get()
            .await
            .map_err(WidgetError::ServiceLoadFailed)?;

        service
            .write_working_file(&file.name, file.content.clone())
            .await
            .map_err(|e| command_error(ConversionPass::Palette, e))?;

        let passes = [
            (ConversionPass::Palette, palette_args(&file.name)),
            (ConversionPass::Encode, encode_args(&file.name)),
        ];
        for (pass, args) in passes {
            self.set_status(ConversionStatus::Running(pass));
            let reporter = self.progress.begin_pass(pass);
            service.set_progress(Arc::new(move |ratio: f64| reporter.report(ratio)));

            info!("▶️  Running {} for {}", pass, file.name);
            service
                .run(&args)
                .await
                .map_err(|e| command_error(pass, e))?;
        }

        let data = service
            .read_working_file(OUTPUT_FILE)
            .await
            .map_err(|e| command_error(ConversionPass::Encode, e))?;
        if data.is_empty() || !is_gif(&data) {
            return Err(WidgetError::ConversionCommandFailed {
                pass: ConversionPass::Encode,
                reason: format!("{} is not a GIF image ({} bytes)", OUTPUT_FILE, data.len()),
            });
        }

        let size = data.len();
        let url = self.artifacts.create_object_url(data, GIF_MIME_TYPE);
        self.progress.complete();

        Ok(ConvertedArtifact {
            url,
            mime_type: GIF_MIME_TYPE.to_string(),
            size,
            source_name: file.name.clone(),
            created_at: Utc::now(),
        })
    }

    fn set_status(&self, status: ConversionStatus) {
        lock(&self.state).status = status;
    }
}

impl Drop for UploadWidget {
    fn drop(&mut self) {
        if let Some(artifact) = lock(&self.state).artifact.take() {
            self.artifacts.revoke(&artifact.url);
        }
    }
}
