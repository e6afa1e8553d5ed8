use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::hub::viewer::ViewerSession;

/// Thread-safe set of connected viewers, keyed by viewer ID.
///
/// Backed by `parking_lot::RwLock`: the broadcast loop takes the read lock
/// once per packet, registration and removal take the write lock. The lock
/// is never held across I/O.
#[derive(Clone, Default)]
pub struct ViewerRegistry {
    viewers: Arc<RwLock<HashMap<String, Arc<ViewerSession>>>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, viewer: Arc<ViewerSession>) {
        self.viewers.write().insert(viewer.id().to_string(), viewer);
    }

    pub fn get(&self, id: &str) -> Option<Arc<ViewerSession>> {
        self.viewers.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ViewerSession>> {
        self.viewers.write().remove(id)
    }

    /// Remove and return every viewer.
    pub fn drain(&self) -> Vec<Arc<ViewerSession>> {
        self.viewers.write().drain().map(|(_, v)| v).collect()
    }

    /// Run `f` for each viewer under the read lock. `f` must not block.
    pub fn for_each(&self, mut f: impl FnMut(&ViewerSession)) {
        for viewer in self.viewers.read().values() {
            f(viewer);
        }
    }

    pub fn len(&self) -> usize {
        self.viewers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.read().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.viewers.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let registry = ViewerRegistry::new();
        let (viewer, _outbound) = ViewerSession::new(4, 4);
        let id = viewer.id().to_string();

        registry.insert(viewer);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.ids(), vec![id.clone()]);

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_empties() {
        let registry = ViewerRegistry::new();
        for _ in 0..3 {
            registry.insert(ViewerSession::new(4, 4).0);
        }
        assert_eq!(registry.drain().len(), 3);
        assert!(registry.is_empty());
    }
}
