use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use super::util::{TextFormat, format_text};

/// Path values shared between the service handle and the exported bus objects
pub struct DbusSharedState {
    pub(crate) paths: HashMap<String, serde_json::Value>,
    pub(crate) writable: HashSet<String>,
    pub(crate) formats: HashMap<String, TextFormat>,
    pub(crate) connection: Option<Connection>,
    pub(crate) root_path: OwnedObjectPath,
}

impl DbusSharedState {
    pub fn new(root_path: OwnedObjectPath) -> Self {
        Self {
            paths: HashMap::new(),
            writable: HashSet::new(),
            formats: HashMap::new(),
            connection: None,
            root_path,
        }
    }

    /// Text of a path's current value, rendered with its registered format
    pub(crate) fn text_for(&self, path: &str, value: &serde_json::Value) -> String {
        let format = self.formats.get(path).copied().unwrap_or_default();
        format_text(value, format)
    }
}

/// Lock the shared state; a poisoned lock still holds consistent path values
pub(crate) fn lock_shared(shared: &Mutex<DbusSharedState>) -> MutexGuard<'_, DbusSharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
