use helios::config::{Config, SourceKind};
use helios::topology::{expand_template, resolve_paths};

#[test]
fn expansion_follows_configured_order() {
    let labels = vec!["L2".to_string(), "L1".to_string()];
    assert_eq!(
        expand_template("/Ac/[*Phase*]/Power", &labels),
        vec!["/Ac/L2/Power", "/Ac/L1/Power"]
    );
}

#[test]
fn three_phase_fieldbus_path_set() {
    let mut cfg = Config::default();
    cfg.source = SourceKind::Modbus;
    cfg.phases.insert("phase2".to_string(), "L2".to_string());
    cfg.phases.insert("phase3".to_string(), "L3".to_string());

    let mut paths = resolve_paths(&cfg);
    assert_eq!(paths.phases().len(), 3);
    assert!(paths.contains("/Ac/L3/Energy/Forward"));
    assert!(paths.contains("/NrOfTrackers"));
    assert_eq!(paths.tracker_count(), 0);

    let added = paths.ensure_trackers(2);
    assert_eq!(added.len(), 4);
    assert!(paths.contains("/Pv/1/P"));
    assert!(paths.ensure_trackers(2).is_empty());
}
