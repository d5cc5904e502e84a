//! D-Bus integration for Venus OS
//!
//! Exposes the inverter as a `com.victronenergy.pvinverter` service built from
//! VeDbus-style `com.victronenergy.BusItem` objects: one per leaf path, one per
//! intermediate node and a root object answering `GetItems`.

mod items;
mod root;
mod service;
mod shared;
mod util;

pub use items::BusItem;
pub use root::{RootBus, TreeNode};
pub use service::{DbusService, service_name_for};
pub use util::TextFormat;
