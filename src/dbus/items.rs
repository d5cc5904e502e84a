use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::shared::{DbusSharedState, lock_shared};
use crate::logging::get_logger;

/// VeDbus-style BusItem implementing com.victronenergy.BusItem
pub struct BusItem {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl BusItem {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    pub(crate) fn serde_to_owned_value(v: &serde_json::Value) -> OwnedValue {
        match v {
            // VeDbus publishes an invalid value as an empty array
            serde_json::Value::Null => OwnedValue::try_from(Value::from(Vec::<i32>::new()))
                .unwrap_or_else(|_| OwnedValue::from(0i64)),
            serde_json::Value::Bool(b) => OwnedValue::from(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    OwnedValue::from(i)
                } else if let Some(u) = n.as_u64() {
                    OwnedValue::from(u)
                } else {
                    OwnedValue::from(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => OwnedValue::try_from(Value::from(s.as_str()))
                .unwrap_or_else(|_| OwnedValue::from(0i64)),
            _ => OwnedValue::from(0i64),
        }
    }

    pub(crate) fn owned_value_to_serde(v: &OwnedValue) -> serde_json::Value {
        if let Ok(b) = <bool as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(b);
        }
        if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(i);
        }
        if let Ok(i) = <i32 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(i);
        }
        if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(u);
        }
        if let Ok(u) = <u32 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(u);
        }
        if let Ok(f) = <f64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(f);
        }
        if let Ok(s) = <&str as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(s.to_string());
        }
        serde_json::json!(v.to_string())
    }

    /// Build the `Value`/`Text` pair carried by change signals
    pub(crate) fn change_entry(
        value: &serde_json::Value,
        text: &str,
    ) -> HashMap<&'static str, OwnedValue> {
        let mut entry: HashMap<&'static str, OwnedValue> = HashMap::new();
        entry.insert("Value", Self::serde_to_owned_value(value));
        if let Ok(text_ov) = OwnedValue::try_from(Value::from(text)) {
            entry.insert("Text", text_ov);
        }
        entry
    }

    fn current(&self) -> (serde_json::Value, String) {
        let shared = lock_shared(&self.shared);
        let val = shared
            .paths
            .get(&self.path)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let text = shared.text_for(&self.path, &val);
        (val, text)
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        Self::serde_to_owned_value(&self.current().0)
    }

    /// External writes are accepted and stored; the engine overwrites them
    /// on its next successful tick
    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        let sv = Self::owned_value_to_serde(&value);
        let (conn_opt, root_path, text) = {
            let mut shared = lock_shared(&self.shared);
            if !shared.writable.contains(&self.path) {
                return 1;
            }
            shared.paths.insert(self.path.clone(), sv.clone());
            let text = shared.text_for(&self.path, &sv);
            (shared.connection.clone(), shared.root_path.clone(), text)
        };

        get_logger("dbus").debug(&format!("someone else updated {} to {}", self.path, sv));

        if let Some(conn) = conn_opt {
            if let Ok(obj_path) = OwnedObjectPath::try_from(self.path.as_str())
                && let Ok(item_ctx) = SignalEmitter::new(&conn, obj_path)
            {
                let _ = BusItem::properties_changed(&item_ctx, Self::change_entry(&sv, &text)).await;
            }
            if let Ok(root_ctx) = SignalEmitter::new(&conn, root_path) {
                let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
                outer.insert(self.path.as_str(), Self::change_entry(&sv, &text));
                let _ = crate::dbus::RootBus::items_changed(&root_ctx, outer).await;
            }
        }

        0
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> String {
        self.current().1
    }

    #[zbus(signal)]
    pub async fn properties_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, OwnedValue>,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbus::TextFormat;

    fn make_shared() -> Arc<Mutex<DbusSharedState>> {
        let root = OwnedObjectPath::try_from("/").unwrap();
        Arc::new(Mutex::new(DbusSharedState::new(root)))
    }

    #[test]
    fn owned_value_conversions_roundtrip() {
        let ov_b = BusItem::serde_to_owned_value(&serde_json::json!(true));
        assert_eq!(BusItem::owned_value_to_serde(&ov_b), serde_json::json!(true));

        let ov_i = BusItem::serde_to_owned_value(&serde_json::json!(-5));
        assert_eq!(BusItem::owned_value_to_serde(&ov_i), serde_json::json!(-5));

        let ov_f = BusItem::serde_to_owned_value(&serde_json::json!(1520.5));
        assert_eq!(BusItem::owned_value_to_serde(&ov_f), serde_json::json!(1520.5));

        let ov_s = BusItem::serde_to_owned_value(&serde_json::json!("pv_X1"));
        assert_eq!(BusItem::owned_value_to_serde(&ov_s), serde_json::json!("pv_X1"));
    }

    #[tokio::test]
    async fn external_writes_are_acknowledged_on_writable_paths() {
        let shared = make_shared();
        {
            let mut s = shared.lock().unwrap();
            s.paths.insert("/Ac/Power".to_string(), serde_json::json!(0.0));
            s.writable.insert("/Ac/Power".to_string());
            s.formats.insert("/Ac/Power".to_string(), TextFormat::Watt);
        }

        let item = BusItem::new("/Ac/Power".to_string(), shared.clone());
        let rc = item.set_value(OwnedValue::from(1500.0f64)).await;
        assert_eq!(rc, 0);
        assert_eq!(
            shared.lock().unwrap().paths.get("/Ac/Power"),
            Some(&serde_json::json!(1500.0))
        );
        assert_eq!(item.get_text().await, "1500.0 W");
    }

    #[tokio::test]
    async fn read_only_paths_reject_writes() {
        let shared = make_shared();
        shared
            .lock()
            .unwrap()
            .paths
            .insert("/Serial".to_string(), serde_json::json!("X1"));

        let item = BusItem::new("/Serial".to_string(), shared.clone());
        let rc = item.set_value(OwnedValue::from(1i64)).await;
        assert_eq!(rc, 1);
        assert_eq!(
            shared.lock().unwrap().paths.get("/Serial"),
            Some(&serde_json::json!("X1"))
        );
    }
}
