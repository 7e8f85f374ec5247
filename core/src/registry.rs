//! Source registry
//!
//! Holds each live environment's script text keyed by its
//! [`EnvironmentHandle`], and answers lookups for the debug service's
//! script loader.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;

use crate::environment::EnvironmentHandle;

/// Script loader callback handed to the debug service
///
/// Resolves `(handle, path)` to the loaded source text. `None` is the
/// "not found" status; it never fails the session as a whole.
pub type SourceLoader = Arc<dyn Fn(EnvironmentHandle, &str) -> Option<Arc<str>> + Send + Sync>;

/// Loaded sources of all active environments
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Mutex<HashMap<EnvironmentHandle, Arc<str>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sources(&self) -> MutexGuard<'_, HashMap<EnvironmentHandle, Arc<str>>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the source for `handle`
    ///
    /// Entries are immutable once inserted; a second insert for the same
    /// handle is ignored.
    pub fn insert(&self, handle: EnvironmentHandle, source: Arc<str>) {
        let mut sources = self.sources();
        if sources.contains_key(&handle) {
            tracing::warn!(%handle, "source already registered - ignored");
            return;
        }
        tracing::debug!(%handle, bytes = source.len(), "source registered");
        sources.insert(handle, source);
    }

    /// Source text registered for `handle`
    pub fn lookup(&self, handle: EnvironmentHandle) -> Option<Arc<str>> {
        self.sources().get(&handle).cloned()
    }

    /// Drop the entry for `handle`, if any
    pub fn remove(&self, handle: EnvironmentHandle) -> Option<Arc<str>> {
        self.sources().remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.sources().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources().is_empty()
    }

    /// Loader callback bound to this registry
    pub fn loader(self: &Arc<Self>) -> SourceLoader {
        let registry = Arc::clone(self);
        Arc::new(move |handle: EnvironmentHandle, path: &str| {
            let found = registry.lookup(handle);
            if found.is_none() {
                tracing::debug!(%handle, path, "loader miss");
            }
            found
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let registry = SourceRegistry::new();
        let handle = EnvironmentHandle::next();
        registry.insert(handle, Arc::from("(module)"));

        assert_eq!(registry.lookup(handle).as_deref(), Some("(module)"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_entries_are_not_overwritten() {
        let registry = SourceRegistry::new();
        let handle = EnvironmentHandle::next();
        registry.insert(handle, Arc::from("first"));
        registry.insert(handle, Arc::from("second"));

        assert_eq!(registry.lookup(handle).as_deref(), Some("first"));
    }

    #[test]
    fn test_remove() {
        let registry = SourceRegistry::new();
        let handle = EnvironmentHandle::next();
        registry.insert(handle, Arc::from("x"));

        assert!(registry.remove(handle).is_some());
        assert!(registry.remove(handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_loader_miss_is_not_found() {
        let registry = Arc::new(SourceRegistry::new());
        let loader = registry.loader();
        assert!(loader(EnvironmentHandle::next(), "nowhere.wat").is_none());
    }

    #[test]
    fn test_loader_round_trips_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unicode.wat");
        let text = ";; héllo wörld\n(module)\r\n\t;; trailing\n";
        std::fs::write(&path, text).unwrap();

        let registry = Arc::new(SourceRegistry::new());
        let handle = EnvironmentHandle::next();
        let loaded = std::fs::read_to_string(&path).unwrap();
        registry.insert(handle, Arc::from(loaded));

        let loader = registry.loader();
        let served = loader(handle, path.to_str().unwrap()).unwrap();
        assert_eq!(served.as_bytes(), std::fs::read(&path).unwrap().as_slice());
    }

    #[test]
    fn test_handles_do_not_alias() {
        let registry = SourceRegistry::new();
        let a = EnvironmentHandle::next();
        let b = EnvironmentHandle::next();
        registry.insert(a, Arc::from("a"));
        registry.insert(b, Arc::from("b"));

        assert_eq!(registry.lookup(a).as_deref(), Some("a"));
        assert_eq!(registry.lookup(b).as_deref(), Some("b"));
    }
}
