use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, Result as ZbusResult, names::WellKnownName};

use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};

use super::items::BusItem;
use super::root::{RootBus, TreeNode};
use super::shared::{DbusSharedState, lock_shared};
use super::util::TextFormat;

/// Bus service name of a pvinverter with the given serial
pub fn service_name_for(serial: &str) -> String {
    let sanitized: String = serial
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("com.victronenergy.pvinverter.pv_{}", sanitized)
}

pub struct DbusService {
    logger: StructuredLogger,
    service_name: String,
    connection: Option<Connection>,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
    registered_paths: HashSet<String>,
    root_path: OwnedObjectPath,
}

impl DbusService {
    /// Create an unconnected service; paths are tracked locally until `start`
    pub fn new(serial: &str) -> Result<Self> {
        let logger = get_logger("dbus");
        let service_name = service_name_for(serial);
        logger.info(&format!("Initializing D-Bus service {}", service_name));
        let root_path = OwnedObjectPath::try_from("/")
            .map_err(|e| HeliosError::dbus(format!("Invalid object path: {}", e)))?;
        Ok(Self {
            logger,
            service_name,
            connection: None,
            shared: Arc::new(Mutex::new(DbusSharedState::new(root_path.clone()))),
            registered_paths: HashSet::new(),
            root_path,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect to the system bus (session bus as fallback), export the root
    /// object and every path registered so far, then claim the service name
    pub async fn start(&mut self) -> Result<()> {
        let connection = match Connection::system().await {
            Ok(c) => {
                self.logger.info("Connected to D-Bus: system bus");
                c
            }
            Err(e_sys) => match Connection::session().await {
                Ok(c) => {
                    self.logger.warn(&format!(
                        "System bus unavailable ({}); using session bus",
                        e_sys
                    ));
                    c
                }
                Err(e_sess) => {
                    return Err(HeliosError::dbus(format!(
                        "DBus connect failed: system={} session={}",
                        e_sys, e_sess
                    )));
                }
            },
        };

        let root = RootBus {
            shared: Arc::clone(&self.shared),
        };
        connection
            .object_server()
            .at(&self.root_path, root)
            .await
            .map_err(|e| HeliosError::dbus(format!("Register root BusItem failed: {}", e)))?;

        // Paths registered before the connection existed are exported now
        self.connection = Some(connection.clone());
        let leaves: Vec<String> = lock_shared(&self.shared).paths.keys().cloned().collect();
        for path in leaves {
            self.export_objects(&path).await?;
        }

        self.request_name(&connection)
            .await
            .map_err(|e| HeliosError::dbus(format!("RequestName failed: {}", e)))?;
        lock_shared(&self.shared).connection = Some(connection);
        self.logger
            .info(&format!("D-Bus service started: {}", self.service_name));
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.logger.info("Stopping D-Bus service");
        lock_shared(&self.shared).connection = None;
        self.connection = None;
        Ok(())
    }

    /// Register a path with its text format; the initial value only applies
    /// when the path is new
    pub async fn register(
        &mut self,
        path: &str,
        initial_value: serde_json::Value,
        format: TextFormat,
        writable: bool,
    ) -> Result<()> {
        lock_shared(&self.shared)
            .formats
            .insert(path.to_string(), format);
        self.ensure_item(path, initial_value, writable).await
    }

    pub async fn ensure_item(
        &mut self,
        path: &str,
        initial_value: serde_json::Value,
        writable: bool,
    ) -> Result<()> {
        self.export_objects(path).await?;
        let mut shared = lock_shared(&self.shared);
        if !shared.paths.contains_key(path) {
            shared.paths.insert(path.to_string(), initial_value);
        }
        if writable {
            shared.writable.insert(path.to_string());
        }
        Ok(())
    }

    /// Export a BusItem for the leaf and a TreeNode for every parent segment
    async fn export_objects(&mut self, path: &str) -> Result<()> {
        let Some(conn) = self.connection.clone() else {
            return Ok(());
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for i in 1..=segments.len() {
            let subpath = format!("/{}", segments[..i].join("/"));
            if self.registered_paths.contains(&subpath) {
                continue;
            }
            let obj_path = OwnedObjectPath::try_from(subpath.as_str()).map_err(|e| {
                HeliosError::dbus(format!("Invalid object path '{}': {}", subpath, e))
            })?;
            if i == segments.len() {
                let item = BusItem::new(subpath.clone(), Arc::clone(&self.shared));
                conn.object_server().at(&obj_path, item).await.map_err(|e| {
                    HeliosError::dbus(format!("Register BusItem failed for {}: {}", subpath, e))
                })?;
            } else {
                let node = TreeNode::new(subpath.clone(), Arc::clone(&self.shared));
                conn.object_server().at(&obj_path, node).await.map_err(|e| {
                    HeliosError::dbus(format!("Register TreeNode failed for {}: {}", subpath, e))
                })?;
            }
            self.registered_paths.insert(subpath);
        }
        Ok(())
    }

    pub async fn update_paths(
        &mut self,
        updates: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Result<()> {
        for (k, v) in updates {
            self.update_path(&k, v).await?;
        }
        Ok(())
    }

    pub async fn update_path(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        {
            let shared = lock_shared(&self.shared);
            if let Some(old) = shared.paths.get(path)
                && old == &value
            {
                return Ok(());
            }
        }
        self.ensure_item(path, value.clone(), false).await?;
        let text = {
            let mut shared = lock_shared(&self.shared);
            shared.paths.insert(path.to_string(), value.clone());
            shared.text_for(path, &value)
        };
        if let Some(conn) = &self.connection {
            let item_ctx = SignalEmitter::new(
                conn,
                OwnedObjectPath::try_from(path).map_err(|e| {
                    HeliosError::dbus(format!("Invalid object path '{}': {}", path, e))
                })?,
            )
            .map_err(|e| HeliosError::dbus(format!("SignalEmitter new failed: {}", e)))?;
            let _ = BusItem::properties_changed(&item_ctx, BusItem::change_entry(&value, &text))
                .await;

            let root_ctx = SignalEmitter::new(conn, self.root_path.clone())
                .map_err(|e| HeliosError::dbus(format!("Root SignalEmitter failed: {}", e)))?;
            let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
            outer.insert(path, BusItem::change_entry(&value, &text));
            let _ = RootBus::items_changed(&root_ctx, outer).await;
        }
        Ok(())
    }

    /// Current value of a path
    pub fn value(&self, path: &str) -> Option<serde_json::Value> {
        lock_shared(&self.shared).paths.get(path).cloned()
    }

    /// Current text of a path, rendered with its registered format
    pub fn text(&self, path: &str) -> Option<String> {
        let shared = lock_shared(&self.shared);
        shared.paths.get(path).map(|v| shared.text_for(path, v))
    }

    pub fn is_writable(&self, path: &str) -> bool {
        lock_shared(&self.shared).writable.contains(path)
    }

    /// Number of registered leaf paths
    pub fn path_count(&self) -> usize {
        lock_shared(&self.shared).paths.len()
    }

    async fn request_name(&self, connection: &Connection) -> ZbusResult<()> {
        use zbus::fdo::{DBusProxy, RequestNameFlags};
        let proxy = DBusProxy::new(connection).await?;
        let name = WellKnownName::try_from(self.service_name.as_str())?;
        let _ = proxy
            .request_name(name, RequestNameFlags::ReplaceExisting.into())
            .await?;
        Ok(())
    }
}
