use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, Value};

use super::items::BusItem;
use super::shared::{DbusSharedState, lock_shared};

fn text_owned(text: &str) -> OwnedValue {
    OwnedValue::try_from(Value::from(text)).unwrap_or_else(|_| OwnedValue::from(0i64))
}

/// Collect every path below `prefix`, keyed by the path relative to it
fn collect_subtree_map(
    shared: &Mutex<DbusSharedState>,
    prefix: &str,
    as_text: bool,
) -> HashMap<String, OwnedValue> {
    let shared = lock_shared(shared);
    let mut px = prefix.to_string();
    if !px.ends_with('/') {
        px.push('/');
    }
    let mut result: HashMap<String, OwnedValue> = HashMap::new();
    for (path, val) in &shared.paths {
        if let Some(suffix) = path.strip_prefix(&px) {
            let ov = if as_text {
                text_owned(&shared.text_for(path, val))
            } else {
                BusItem::serde_to_owned_value(val)
            };
            result.insert(suffix.to_string(), ov);
        }
    }
    result
}

pub struct RootBus {
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl RootBus {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree_map(&self.shared, "/", false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree_map(&self.shared, "/", true))
    }

    #[zbus(name = "GetItems")]
    async fn get_items(&self) -> HashMap<String, HashMap<String, OwnedValue>> {
        let shared = lock_shared(&self.shared);
        let mut out: HashMap<String, HashMap<String, OwnedValue>> = HashMap::new();
        for (path, val) in &shared.paths {
            let mut entry: HashMap<String, OwnedValue> = HashMap::new();
            entry.insert("Value".to_string(), BusItem::serde_to_owned_value(val));
            entry.insert("Text".to_string(), text_owned(&shared.text_for(path, val)));
            out.insert(path.clone(), entry);
        }
        out
    }

    #[zbus(signal)]
    pub async fn items_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, HashMap<&str, OwnedValue>>,
    ) -> zbus::Result<()>;
}

/// Intermediate object (`/Ac`, `/Ac/L1`, `/Pv`, ...) answering for its subtree
pub struct TreeNode {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl TreeNode {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl TreeNode {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree_map(&self.shared, &self.path, false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree_map(&self.shared, &self.path, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::OwnedObjectPath;

    #[test]
    fn subtree_is_keyed_relative_to_prefix() {
        let root = OwnedObjectPath::try_from("/").unwrap();
        let shared = Mutex::new(DbusSharedState::new(root));
        {
            let mut s = shared.lock().unwrap();
            s.paths.insert("/Ac/L1/Power".to_string(), serde_json::json!(100.0));
            s.paths.insert("/Ac/L1/Voltage".to_string(), serde_json::json!(230.0));
            s.paths.insert("/Ac/Power".to_string(), serde_json::json!(100.0));
        }
        let map = collect_subtree_map(&shared, "/Ac/L1", false);
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("Power"));
        assert!(map.contains_key("Voltage"));

        let all = collect_subtree_map(&shared, "/", true);
        assert!(all.contains_key("Ac/Power"));
    }
}
