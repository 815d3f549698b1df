//! In-process drag/drop event target.
//!
//! A [`Surface`] stands in for the element a host renders the drop zone
//! into. Hosts translate their native pointer events into [`DragEvent`]s and
//! hand them to [`Surface::dispatch`]; listeners run in registration order
//! and the event then bubbles to the parent surface unless propagation was
//! stopped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use crate::models::FileEntry;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragPhase {
    DragStart,
    DragEnter,
    DragLeave,
    DragOver,
    Drag,
    DragEnd,
    Drop,
    Click,
}

impl DragPhase {
    pub const ALL: [DragPhase; 8] = [
        DragPhase::DragStart,
        DragPhase::DragEnter,
        DragPhase::DragLeave,
        DragPhase::DragOver,
        DragPhase::Drag,
        DragPhase::DragEnd,
        DragPhase::Drop,
        DragPhase::Click,
    ];
}

/// One pointer event delivered to a surface.
#[derive(Debug, Clone)]
pub struct DragEvent {
    pub phase: DragPhase,
    /// `None` when the host could not attach a data transfer to the event.
    pub data_transfer: Option<Vec<FileEntry>>,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
}

impl DragEvent {
    pub fn new(phase: DragPhase, files: Vec<FileEntry>) -> Self {
        Self {
            phase,
            data_transfer: Some(files),
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
        }
    }

    /// An event without a data transfer (clicks, synthetic events).
    pub fn bare(phase: DragPhase) -> Self {
        Self {
            data_transfer: None,
            ..Self::new(phase, Vec::new())
        }
    }

    /// Files on the event; a missing data transfer reads as no files.
    pub fn files(&self) -> Vec<FileEntry> {
        self.data_transfer.clone().unwrap_or_default()
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn immediate_propagation_stopped(&self) -> bool {
        self.immediate_propagation_stopped
    }
}

pub trait DragListener: Send + Sync {
    fn handle_event(&self, event: &mut DragEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    phase: DragPhase,
    listener: Weak<dyn DragListener>,
}

struct SurfaceInner {
    id: u64,
    label: String,
    drag_supported: bool,
    parent: Option<Surface>,
    listeners: Mutex<Vec<Registration>>,
}

#[derive(Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("drag_supported", &self.inner.drag_supported)
            .finish()
    }
}

impl Surface {
    pub fn new(label: impl Into<String>) -> Self {
        Self::build(label.into(), true, None)
    }

    /// A surface nested inside `parent`; events bubble from child to parent.
    pub fn child_of(parent: &Surface, label: impl Into<String>) -> Self {
        Self::build(label.into(), true, Some(parent.clone()))
    }

    /// A surface from a rendering context without drag/drop primitives.
    pub fn headless(label: impl Into<String>) -> Self {
        Self::build(label.into(), false, None)
    }

    fn build(label: String, drag_supported: bool, parent: Option<Surface>) -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
                label,
                drag_supported,
                parent,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn supports_drag(&self) -> bool {
        self.inner.drag_supported
    }

    pub fn same_surface(&self, other: &Surface) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers a listener for one phase. The surface only holds a weak
    /// reference; a dropped listener is skipped and pruned on dispatch.
    pub fn attach(&self, phase: DragPhase, listener: Weak<dyn DragListener>) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push(Registration {
            id,
            phase,
            listener,
        });
        id
    }

    pub fn detach(&self, id: ListenerId) {
        self.lock_listeners().retain(|r| r.id != id);
    }

    /// Live listeners attached to this surface (not counting ancestors).
    pub fn listener_count(&self) -> usize {
        self.lock_listeners()
            .iter()
            .filter(|r| r.listener.strong_count() > 0)
            .count()
    }

    /// Delivers the event to this surface and then to its ancestors.
    /// Returns `false` if a listener prevented the default action.
    pub fn dispatch(&self, event: &mut DragEvent) -> bool {
        let mut current = Some(self.clone());

        while let Some(surface) = current {
            for listener in surface.listeners_for(event.phase) {
                listener.handle_event(event);
                if event.immediate_propagation_stopped {
                    break;
                }
            }
            if event.propagation_stopped {
                break;
            }
            current = surface.inner.parent.clone();
        }

        !event.default_prevented
    }

    fn listeners_for(&self, phase: DragPhase) -> Vec<Arc<dyn DragListener>> {
        let mut listeners = self.lock_listeners();
        listeners.retain(|r| r.listener.strong_count() > 0);
        listeners
            .iter()
            .filter(|r| r.phase == phase)
            .filter_map(|r| r.listener.upgrade())
            .collect()
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
