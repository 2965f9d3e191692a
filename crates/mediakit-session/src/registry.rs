use std::collections::HashMap;

use tracing::{debug, info};

use crate::capture::CaptureSession;
use crate::error::SessionError;
use crate::session::MediaSession;

/// Something that owns native resources and can release them early.
pub trait Disposable {
    fn dispose(&mut self);
}

impl Disposable for MediaSession {
    fn dispose(&mut self) {
        MediaSession::dispose(self)
    }
}

impl Disposable for CaptureSession {
    fn dispose(&mut self) {
        CaptureSession::dispose(self)
    }
}

/// Sessions keyed by id, as held by an adapter for one host.
pub struct SessionRegistry<S> {
    sessions: HashMap<String, S>,
}

impl<S: Disposable> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Register a session built elsewhere. On a duplicate id the offered
    /// session is dropped.
    pub fn insert(&mut self, id: impl Into<String>, session: S) -> Result<&mut S, SessionError> {
        let id = id.into();
        if self.sessions.contains_key(&id) {
            return Err(SessionError::AlreadyExists(id));
        }
        debug!(session = %id, "session registered");
        Ok(self.sessions.entry(id).or_insert(session))
    }

    /// Build and register a session, unless `id` is taken.
    pub fn create_with<F>(&mut self, id: &str, build: F) -> Result<&mut S, SessionError>
    where
        F: FnOnce(&str) -> Result<S, SessionError>,
    {
        if self.sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }
        let session = build(id)?;
        self.insert(id, session)
    }

    pub fn get(&self, id: &str) -> Option<&S> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut S, SessionError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Dispose the session and forget it.
    pub fn dispose(&mut self, id: &str) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.dispose();
        Ok(())
    }

    pub fn dispose_all(&mut self) {
        let count = self.sessions.len();
        for (_, mut session) in self.sessions.drain() {
            session.dispose();
        }
        if count > 0 {
            info!(count, "disposed all sessions");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut S)> {
        self.sessions
            .iter_mut()
            .map(|(id, session)| (id.as_str(), session))
    }
}

impl<S: Disposable> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        disposed: usize,
    }

    impl Disposable for Probe {
        fn dispose(&mut self) {
            self.disposed += 1;
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = SessionRegistry::new();
        registry.insert("a", Probe::default()).unwrap();
        assert!(matches!(
            registry.insert("a", Probe::default()),
            Err(SessionError::AlreadyExists(id)) if id == "a"
        ));
        let mut built = false;
        let result = registry.create_with("a", |_| {
            built = true;
            Ok(Probe::default())
        });
        assert!(result.is_err());
        assert!(!built);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().disposed, 0);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let mut registry: SessionRegistry<Probe> = SessionRegistry::new();
        assert!(matches!(registry.get_mut("x"), Err(SessionError::NotFound(_))));
        assert!(matches!(registry.dispose("x"), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn build_errors_leave_registry_untouched() {
        let mut registry: SessionRegistry<Probe> = SessionRegistry::new();
        let result = registry.create_with("a", |_| Err(SessionError::Disposed));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
