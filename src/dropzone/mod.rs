//! Drag-and-drop tracking for a single drop surface.

pub mod surface;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::FileEntry;
pub use surface::{DragEvent, DragListener, DragPhase, ListenerId, Surface};

pub type FilesCallback = Arc<dyn Fn(&[FileEntry]) + Send + Sync>;

/// Per-phase callbacks, each invoked with the files parsed from the event.
#[derive(Clone, Default)]
pub struct DropzoneOptions {
    pub on_drag_start: Option<FilesCallback>,
    pub on_drag_enter: Option<FilesCallback>,
    pub on_drag_leave: Option<FilesCallback>,
    pub on_drag_over: Option<FilesCallback>,
    pub on_drag: Option<FilesCallback>,
    pub on_drag_end: Option<FilesCallback>,
    pub on_drop: Option<FilesCallback>,
    pub on_click: Option<FilesCallback>,
}

macro_rules! option_setter {
    ($name:ident) => {
        pub fn $name(mut self, f: impl Fn(&[FileEntry]) + Send + Sync + 'static) -> Self {
            self.$name = Some(Arc::new(f));
            self
        }
    };
}

impl DropzoneOptions {
    pub fn new() -> Self {
        Self::default()
    }

    option_setter!(on_drag_start);
    option_setter!(on_drag_enter);
    option_setter!(on_drag_leave);
    option_setter!(on_drag_over);
    option_setter!(on_drag);
    option_setter!(on_drag_end);
    option_setter!(on_drop);
    option_setter!(on_click);

    fn callback(&self, phase: DragPhase) -> Option<&FilesCallback> {
        match phase {
            DragPhase::DragStart => self.on_drag_start.as_ref(),
            DragPhase::DragEnter => self.on_drag_enter.as_ref(),
            DragPhase::DragLeave => self.on_drag_leave.as_ref(),
            DragPhase::DragOver => self.on_drag_over.as_ref(),
            DragPhase::Drag => self.on_drag.as_ref(),
            DragPhase::DragEnd => self.on_drag_end.as_ref(),
            DragPhase::Drop => self.on_drop.as_ref(),
            DragPhase::Click => self.on_click.as_ref(),
        }
    }
}

#[derive(Default)]
struct ControllerState {
    files: Vec<FileEntry>,
    dragging: bool,
}

/// Listener registrations on one surface; detaches them when dropped.
struct SurfaceBinding {
    surface: Surface,
    listeners: Vec<ListenerId>,
}

impl Drop for SurfaceBinding {
    fn drop(&mut self) {
        for id in self.listeners.drain(..) {
            self.surface.detach(id);
        }
        tracing::debug!("Dropzone detached from surface '{}'", self.surface.label());
    }
}

struct ControllerInner {
    options: DropzoneOptions,
    state: Mutex<ControllerState>,
    binding: Mutex<Option<SurfaceBinding>>,
}

impl ControllerInner {
    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DragListener for ControllerInner {
    fn handle_event(&self, event: &mut DragEvent) {
        let files = event.files();

        match event.phase {
            DragPhase::DragStart => self.state().dragging = true,
            DragPhase::DragEnter => {
                event.stop_immediate_propagation();
                self.state().dragging = true;
            }
            DragPhase::DragLeave => event.stop_propagation(),
            DragPhase::DragOver => event.prevent_default(),
            DragPhase::Drag | DragPhase::Click => {}
            DragPhase::DragEnd => self.state().dragging = false,
            DragPhase::Drop => {
                event.prevent_default();
                let mut state = self.state();
                state.files = files.clone();
                state.dragging = false;
            }
        }

        // State lock is released before user code runs so callbacks can
        // read the controller.
        if let Some(callback) = self.options.callback(event.phase) {
            callback(&files);
        }
    }
}

/// Tracks drag gestures over a bound [`Surface`] and forwards them to the
/// configured callbacks.
///
/// The controller attaches one listener per [`DragPhase`] when bound. The
/// registrations are released when the controller is unbound, rebound to
/// another surface, or dropped.
#[derive(Clone)]
pub struct DropzoneController {
    inner: Arc<ControllerInner>,
}

impl DropzoneController {
    pub fn new(options: DropzoneOptions) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                options,
                state: Mutex::new(ControllerState::default()),
                binding: Mutex::new(None),
            }),
        }
    }

    /// Attaches to `surface`. Binding the surface that is already bound is a
    /// no-op; binding another surface releases the previous one first.
    pub fn bind(&self, surface: &Surface) {
        if !surface.supports_drag() {
            tracing::warn!(
                "Surface '{}' has no drag/drop support, dropzone stays inert",
                surface.label()
            );
            return;
        }

        let mut binding = self.lock_binding();
        if binding
            .as_ref()
            .is_some_and(|b| b.surface.same_surface(surface))
        {
            return;
        }
        // Detach from the old surface before attaching to the new one.
        binding.take();

        let listener: Arc<dyn DragListener> = self.inner.clone();
        let weak = Arc::downgrade(&listener);
        let listeners = DragPhase::ALL
            .iter()
            .map(|phase| surface.attach(*phase, weak.clone()))
            .collect();

        tracing::debug!("Dropzone bound to surface '{}'", surface.label());
        *binding = Some(SurfaceBinding {
            surface: surface.clone(),
            listeners,
        });
    }

    pub fn unbind(&self) {
        self.lock_binding().take();
    }

    pub fn is_bound(&self) -> bool {
        self.lock_binding().is_some()
    }

    /// Files captured by the most recent drop.
    pub fn current_files(&self) -> Vec<FileEntry> {
        self.inner.state().files.clone()
    }

    pub fn is_dragging(&self) -> bool {
        self.inner.state().dragging
    }

    /// Forgets the dropped files; the drag phase is left alone.
    pub fn clear(&self) {
        self.inner.state().files.clear();
    }

    fn lock_binding(&self) -> MutexGuard<'_, Option<SurfaceBinding>> {
        self.inner
            .binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DropzoneController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropzoneController")
            .field("dragging", &self.is_dragging())
            .field("files", &self.inner.state().files.len())
            .field("bound", &self.is_bound())
            .finish()
    }
}
