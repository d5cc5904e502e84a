use helios::config::{Config, SourceKind};
use std::fs;

fn valid_cloud() -> Config {
    let mut cfg = Config::default();
    cfg.cloud.token_id = "20210101000000000".to_string();
    cfg.cloud.registration_number = "SWABCDEFGH".to_string();
    cfg
}

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = valid_cloud();
    cfg.inverter.grid_voltage = 240.0;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.inverter.grid_voltage, 240.0);
    assert_eq!(loaded.cloud.token_id, cfg.cloud.token_id);
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert!(loaded.validate().is_ok());
}

#[test]
fn phase_order_survives_yaml() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"source: modbus\nphases:\n  phase1: L3\n  phase2: L1\n  phase3: L2\n",
    )
    .unwrap();
    let cfg = Config::load_from(Some(tmp.path())).unwrap();
    assert_eq!(cfg.source, SourceKind::Modbus);
    assert_eq!(cfg.phase_labels(), vec!["L3", "L1", "L2"]);
}

#[test]
fn config_validation_errors() {
    // Empty credentials
    let mut cfg = valid_cloud();
    cfg.cloud.token_id.clear();
    assert!(cfg.validate().is_err());

    cfg = valid_cloud();
    cfg.cloud.registration_number = "   ".to_string();
    assert!(cfg.validate().is_err());

    // Cloud with more than one phase
    cfg = valid_cloud();
    cfg.phases.insert("phase2".to_string(), "L2".to_string());
    assert!(cfg.validate().is_err());

    // Duplicate and malformed labels
    cfg = Config::default();
    cfg.source = SourceKind::Modbus;
    cfg.phases.insert("phase2".to_string(), "L1".to_string());
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.source = SourceKind::Modbus;
    cfg.phases.insert("phase1".to_string(), "L/1".to_string());
    assert!(cfg.validate().is_err());

    // Rate limit below the cloud refresh period
    cfg = valid_cloud();
    cfg.cloud.min_fetch_interval_seconds = 5;
    assert!(cfg.validate().is_err());

    // Poll interval zero
    cfg = valid_cloud();
    cfg.poll_interval_ms = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn missing_file_is_an_io_error() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(tmp_dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("I/O error"));
}
