use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{error, info};

use crate::services::conversion::ConversionService;

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<dyn ConversionService>, String>>>;
type ServiceFactory = Box<dyn Fn() -> Arc<dyn ConversionService> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unloaded,
    Loading,
    Ready,
}

enum LoadState {
    Unloaded,
    Loading { attempt: u64, load: SharedLoad },
    Ready(Arc<dyn ConversionService>),
}

/// Lazily loaded, memoized conversion service shared by every widget.
///
/// The first caller starts the load; callers arriving while it is in flight
/// await the same load. A failed load is reported to all of them and leaves
/// the handle unloaded so a later call can try again.
///
/// Working storage names are fixed, so conversions on one handle must not
/// overlap; callers hold [`ServiceHandle::exclusive`] for a whole pipeline.
pub struct ServiceHandle {
    factory: ServiceFactory,
    state: Mutex<LoadState>,
    attempts: AtomicU64,
    pipeline: AsyncMutex<()>,
}

impl ServiceHandle {
    pub fn new(factory: impl Fn() -> Arc<dyn ConversionService> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            factory: Box::new(factory),
            state: Mutex::new(LoadState::Unloaded),
            attempts: AtomicU64::new(0),
            pipeline: AsyncMutex::new(()),
        })
    }

    pub fn state(&self) -> HandleState {
        match *self.lock_state() {
            LoadState::Unloaded => HandleState::Unloaded,
            LoadState::Loading { .. } => HandleState::Loading,
            LoadState::Ready(_) => HandleState::Ready,
        }
    }

    /// Number of loads started so far.
    pub fn load_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Waits until no other conversion is using the service. The pipeline
    /// owns the working storage until the guard is dropped.
    pub async fn exclusive(&self) -> AsyncMutexGuard<'_, ()> {
        self.pipeline.lock().await
    }

    /// Returns the loaded service, loading it first if needed.
    pub async fn get(&self) -> Result<Arc<dyn ConversionService>, String> {
        let (attempt, load) = {
            let mut state = self.lock_state();
            match &*state {
                LoadState::Ready(service) => return Ok(service.clone()),
                LoadState::Loading { attempt, load } => (*attempt, load.clone()),
                LoadState::Unloaded => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let service = (self.factory)();
                    info!("⏳ Loading conversion service (attempt {})", attempt);
                    let load: SharedLoad = async move {
                        service.load().await.map_err(|e| e.to_string())?;
                        Ok::<_, String>(service)
                    }
                    .boxed()
                    .shared();
                    *state = LoadState::Loading {
                        attempt,
                        load: load.clone(),
                    };
                    (attempt, load)
                }
            }
        };

        let result = load.await;

        let mut state = self.lock_state();
        if matches!(&*state, LoadState::Loading { attempt: current, .. } if *current == attempt) {
            match &result {
                Ok(service) => {
                    info!("✅ Conversion service loaded");
                    *state = LoadState::Ready(service.clone());
                }
                Err(e) => {
                    error!("Conversion service failed to load: {}", e);
                    *state = LoadState::Unloaded;
                }
            }
        }
        result
    }

    fn lock_state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
