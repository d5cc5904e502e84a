//! Normalization engine
//!
//! The driver owns the canonical snapshot and the published path set. Each
//! tick pulls from the single active source, folds the raw reading into a new
//! snapshot and writes it through to the D-Bus service. A failed tick never
//! touches the snapshot, so the last good values stay published.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::dbus::DbusService;
use crate::logging::StructuredLogger;
use crate::topology::PathSet;

mod runtime;
mod runtime_poll;
mod sign_of_life;
mod types;

pub use runtime::resolve_serial;
pub use runtime_poll::{ActiveSource, CloudPoll, CloudSource, FieldBusPoller};
pub use types::{CanonicalSnapshot, PhaseValues, SourceStats, TickOutcome, TrackerValues};

/// Inverter driver: engine context for one process
pub struct InverterDriver {
    config: Config,
    source: ActiveSource,
    dbus: DbusService,
    paths: PathSet,
    snapshot: CanonicalSnapshot,
    /// Wall-clock time of the last successful tick
    last_tick: Option<DateTime<Utc>>,
    logger: StructuredLogger,
}
