//! Published path topology
//!
//! Resolves the set of bus paths from configuration. Phase-templated paths are
//! expanded once per configured phase label, in configured order. Tracker
//! paths are added lazily as trackers are discovered and never removed.

use crate::config::{Config, PHASE_PLACEHOLDER, SourceKind};
use crate::dbus::TextFormat;
use std::collections::BTreeMap;

pub const AC_POWER: &str = "/Ac/Power";
pub const AC_CURRENT: &str = "/Ac/Current";
pub const AC_VOLTAGE: &str = "/Ac/Voltage";
pub const AC_ENERGY_FORWARD: &str = "/Ac/Energy/Forward";

pub const PHASE_VOLTAGE: &str = "/Ac/[*Phase*]/Voltage";
pub const PHASE_CURRENT: &str = "/Ac/[*Phase*]/Current";
pub const PHASE_POWER: &str = "/Ac/[*Phase*]/Power";
pub const PHASE_ENERGY_FORWARD: &str = "/Ac/[*Phase*]/Energy/Forward";

pub const NR_OF_TRACKERS: &str = "/NrOfTrackers";
pub const YIELD_POWER: &str = "/Yield/Power";

/// Data path templates with their text formats, in registration order
const DATA_TEMPLATES: [(&str, TextFormat); 8] = [
    (AC_ENERGY_FORWARD, TextFormat::KiloWattHour),
    (AC_POWER, TextFormat::Watt),
    (AC_CURRENT, TextFormat::Ampere),
    (AC_VOLTAGE, TextFormat::Volt),
    (PHASE_VOLTAGE, TextFormat::Volt),
    (PHASE_CURRENT, TextFormat::Ampere),
    (PHASE_POWER, TextFormat::Watt),
    (PHASE_ENERGY_FORWARD, TextFormat::KiloWattHour),
];

/// Replace the phase placeholder in a template
pub fn substitute_phase(template: &str, label: &str) -> String {
    template.replace(PHASE_PLACEHOLDER, label)
}

/// Expand a template once per label, or return it verbatim when it carries no
/// placeholder
pub fn expand_template(template: &str, labels: &[String]) -> Vec<String> {
    if template.contains(PHASE_PLACEHOLDER) {
        labels
            .iter()
            .map(|label| substitute_phase(template, label))
            .collect()
    } else {
        vec![template.to_string()]
    }
}

/// One registrable bus path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    pub path: String,
    pub format: TextFormat,
}

impl PathSpec {
    fn new(path: impl Into<String>, format: TextFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

/// Resolved paths of one AC phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePaths {
    pub label: String,
    pub voltage: String,
    pub current: String,
    pub power: String,
    pub energy_forward: String,
}

impl PhasePaths {
    fn for_label(label: &str) -> Self {
        Self {
            label: label.to_string(),
            voltage: substitute_phase(PHASE_VOLTAGE, label),
            current: substitute_phase(PHASE_CURRENT, label),
            power: substitute_phase(PHASE_POWER, label),
            energy_forward: substitute_phase(PHASE_ENERGY_FORWARD, label),
        }
    }
}

/// Resolved paths of one MPPT tracker (zero-based index)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerPaths {
    pub voltage: String,
    pub power: String,
}

impl TrackerPaths {
    pub fn for_index(index: usize) -> Self {
        Self {
            voltage: format!("/Pv/{}/V", index),
            power: format!("/Pv/{}/P", index),
        }
    }

    pub fn specs(&self) -> [PathSpec; 2] {
        [
            PathSpec::new(self.voltage.clone(), TextFormat::Volt),
            PathSpec::new(self.power.clone(), TextFormat::Watt),
        ]
    }
}

/// The set of published data paths; grows monotonically
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    specs: Vec<PathSpec>,
    phases: Vec<PhasePaths>,
    trackers: BTreeMap<usize, TrackerPaths>,
}

impl PathSet {
    /// Every data path registered so far, in registration order
    pub fn specs(&self) -> &[PathSpec] {
        &self.specs
    }

    pub fn contains(&self, path: &str) -> bool {
        self.specs.iter().any(|s| s.path == path)
    }

    /// Per-phase path bundles, in configured order
    pub fn phases(&self) -> &[PhasePaths] {
        &self.phases
    }

    pub fn tracker(&self, index: usize) -> Option<&TrackerPaths> {
        self.trackers.get(&index)
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    /// Register the paths of tracker `index` (zero-based)
    ///
    /// Returns the specs added by this call; empty when the tracker was
    /// already known.
    pub fn add_tracker_paths(&mut self, index: usize) -> Vec<PathSpec> {
        if self.trackers.contains_key(&index) {
            return Vec::new();
        }
        let paths = TrackerPaths::for_index(index);
        let added = paths.specs().to_vec();
        self.specs.extend(added.iter().cloned());
        self.trackers.insert(index, paths);
        added
    }

    /// Register trackers `0..count`, returning every newly added spec
    pub fn ensure_trackers(&mut self, count: usize) -> Vec<PathSpec> {
        (0..count).flat_map(|i| self.add_tracker_paths(i)).collect()
    }

    fn push(&mut self, spec: PathSpec) {
        if !self.contains(&spec.path) {
            self.specs.push(spec);
        }
    }
}

/// Resolve the data paths published for a configuration
pub fn resolve_paths(config: &Config) -> PathSet {
    let labels = config.phase_labels();
    let mut set = PathSet::default();

    for (template, format) in DATA_TEMPLATES {
        for path in expand_template(template, &labels) {
            set.push(PathSpec::new(path, format));
        }
    }

    set.phases = labels.iter().map(|l| PhasePaths::for_label(l)).collect();

    if config.source == SourceKind::Modbus {
        set.push(PathSpec::new(NR_OF_TRACKERS, TextFormat::Plain));
        set.push(PathSpec::new(YIELD_POWER, TextFormat::Watt));
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_phase_config() -> Config {
        let mut config = Config::default();
        config.source = SourceKind::Modbus;
        config.phases.clear();
        for (k, v) in [("phase1", "L1"), ("phase2", "L2"), ("phase3", "L3")] {
            config.phases.insert(k.to_string(), v.to_string());
        }
        config
    }

    #[test]
    fn single_phase_cloud_paths() {
        let set = resolve_paths(&Config::default());
        let paths: Vec<&str> = set.specs().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/Ac/Energy/Forward",
                "/Ac/Power",
                "/Ac/Current",
                "/Ac/Voltage",
                "/Ac/L1/Voltage",
                "/Ac/L1/Current",
                "/Ac/L1/Power",
                "/Ac/L1/Energy/Forward",
            ]
        );
        assert!(!set.contains(NR_OF_TRACKERS));
    }

    #[test]
    fn phase_templates_expand_once_per_label_in_order() {
        let set = resolve_paths(&three_phase_config());
        let voltages: Vec<&str> = set
            .specs()
            .iter()
            .map(|s| s.path.as_str())
            .filter(|p| p.ends_with("/Voltage") && p != &AC_VOLTAGE)
            .collect();
        assert_eq!(voltages, vec!["/Ac/L1/Voltage", "/Ac/L2/Voltage", "/Ac/L3/Voltage"]);
        assert_eq!(set.phases().len(), 3);
        assert_eq!(set.phases()[2].energy_forward, "/Ac/L3/Energy/Forward");
        assert!(set.contains(YIELD_POWER));
    }

    #[test]
    fn templates_without_placeholder_are_verbatim() {
        let labels = vec!["L1".to_string(), "L2".to_string()];
        assert_eq!(expand_template("/Ac/Power", &labels), vec!["/Ac/Power"]);
        assert_eq!(
            expand_template(PHASE_POWER, &labels),
            vec!["/Ac/L1/Power", "/Ac/L2/Power"]
        );
    }

    #[test]
    fn tracker_paths_are_added_idempotently() {
        let mut set = resolve_paths(&three_phase_config());
        let before = set.specs().len();

        let added = set.ensure_trackers(3);
        assert_eq!(added.len(), 6);
        assert_eq!(set.tracker(0).unwrap().voltage, "/Pv/0/V");
        assert_eq!(set.tracker(2).unwrap().power, "/Pv/2/P");

        assert!(set.add_tracker_paths(1).is_empty());
        assert!(set.ensure_trackers(2).is_empty());
        assert_eq!(set.specs().len(), before + 6);
        assert_eq!(set.tracker_count(), 3);
    }
}
