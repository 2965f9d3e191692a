//! Process-wide backend lifecycle.
//!
//! Native media libraries are initialised once per process and torn down once.
//! [`MediaLibrary`] makes that explicit: `load` runs the backend's `init`,
//! dropping or unloading the guard runs `deinit`, and the process cannot load
//! again afterwards.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::error::SessionError;
use crate::graph::GraphBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unloaded,
    Loaded,
    TornDown,
}

/// Load state shared by every [`MediaLibrary`] guard of one scope.
pub struct Lifecycle {
    phase: Mutex<Phase>,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Unloaded),
        }
    }

    pub fn is_loaded(&self) -> bool {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) == Phase::Loaded
    }

    pub fn is_torn_down(&self) -> bool {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) == Phase::TornDown
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS: Lifecycle = Lifecycle::new();

/// Guard over a loaded backend.
pub struct MediaLibrary {
    lifecycle: &'static Lifecycle,
    backend: Arc<dyn GraphBackend>,
    unloaded: bool,
}

impl MediaLibrary {
    /// Initialise `backend` for the whole process.
    pub fn load(backend: Arc<dyn GraphBackend>) -> Result<Self, SessionError> {
        Self::load_with(&PROCESS, backend)
    }

    /// Same as [`MediaLibrary::load`] against an explicit lifecycle.
    pub fn load_with(
        lifecycle: &'static Lifecycle,
        backend: Arc<dyn GraphBackend>,
    ) -> Result<Self, SessionError> {
        let mut phase = lifecycle
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *phase {
            Phase::Loaded => return Err(SessionError::LibraryAlreadyLoaded),
            Phase::TornDown => return Err(SessionError::LibraryTornDown),
            Phase::Unloaded => {}
        }
        backend.init()?;
        *phase = Phase::Loaded;
        info!(backend = backend.name(), "media library loaded");
        Ok(Self {
            lifecycle,
            backend,
            unloaded: false,
        })
    }

    pub fn backend(&self) -> &Arc<dyn GraphBackend> {
        &self.backend
    }

    /// Tear the backend down now instead of at drop.
    pub fn unload(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.unloaded {
            return;
        }
        self.unloaded = true;
        let mut phase = self
            .lifecycle
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *phase == Phase::Loaded {
            self.backend.deinit();
            *phase = Phase::TornDown;
            info!(backend = self.backend.name(), "media library unloaded");
        }
    }
}

impl Drop for MediaLibrary {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::NullBackend;

    #[test]
    fn load_twice_is_rejected() {
        static SCOPE: Lifecycle = Lifecycle::new();
        let library = MediaLibrary::load_with(&SCOPE, Arc::new(NullBackend::default())).unwrap();
        assert!(SCOPE.is_loaded());
        assert!(matches!(
            MediaLibrary::load_with(&SCOPE, Arc::new(NullBackend::default())),
            Err(SessionError::LibraryAlreadyLoaded)
        ));
        assert_eq!(library.backend().name(), "null");
    }

    #[test]
    fn no_reload_after_teardown() {
        static SCOPE: Lifecycle = Lifecycle::new();
        MediaLibrary::load_with(&SCOPE, Arc::new(NullBackend::default()))
            .unwrap()
            .unload();
        assert!(SCOPE.is_torn_down());
        assert!(matches!(
            MediaLibrary::load_with(&SCOPE, Arc::new(NullBackend::default())),
            Err(SessionError::LibraryTornDown)
        ));
    }
}
