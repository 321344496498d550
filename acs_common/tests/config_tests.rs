//! Startup configuration chain: station TOML, persisted blob, endpoint CSV.

use acs_common::config::{CanRxMode, ConfigError, ConfigLoader, SerialBackend, StationConfig};
use acs_common::endpoint::{AppConfig, EndpointKind};
use acs_common::endpoint_csv::{load_endpoint_csv, save_endpoint_csv};
use acs_common::persist::ConfigStore;
use std::fs;
use tempfile::TempDir;

fn write_station_toml(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("station.toml");
    fs::write(
        &path,
        r#"
[shared]
service_name = "bench-rig"

[can]
rx_mode = "interrupt"

[paths]
endpoints_csv = "ep.csv"
sequence_csv = "show.csv"
config_blob = "eeprom.bin"

[timing]
status_poll_period_ms = 50
"#,
    )
    .unwrap();
    path
}

#[test]
fn station_toml_overrides_only_given_fields() {
    let dir = TempDir::new().unwrap();
    let cfg = StationConfig::load(&write_station_toml(&dir)).unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.shared.service_name, "bench-rig");
    assert_eq!(cfg.can.rx_mode, CanRxMode::Interrupt);
    assert_eq!(cfg.can.bitrate, 1_000_000);
    assert_eq!(cfg.serial.backend, SerialBackend::Simulation);
    assert_eq!(cfg.paths.sequence_csv.to_str(), Some("show.csv"));
    assert_eq!(cfg.timing.status_poll_period_ms, 50);
    assert_eq!(cfg.timing.cycle_time_us, 1000);
}

#[test]
fn station_toml_unknown_enum_value_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("station.toml");
    fs::write(&path, "[can]\nrx_mode = \"dma\"\n").unwrap();
    assert!(matches!(
        StationConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn blob_then_csv_override() {
    let dir = TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path().join("eeprom.bin"));

    let mut stored = AppConfig::default();
    stored.endpoint_mut(2).unwrap().velocity_max = 1234;
    store.save(&stored).unwrap();

    let csv = dir.path().join("ep.csv");
    fs::write(
        &csv,
        "# id,type,...\n3,MKS,0x05,1,0,0,0,3000,0,255,0,0\n",
    )
    .unwrap();

    let mut cfg = store.load_or_default();
    let report = load_endpoint_csv(&csv, &mut cfg).unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(cfg.endpoint(2).unwrap().velocity_max, 1234);
    let ep3 = cfg.endpoint(3).unwrap();
    assert_eq!(ep3.kind, EndpointKind::MksServo);
    assert_eq!(ep3.can_id(), Some(0x05));
}

#[test]
fn csv_save_and_reload_whole_table() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("endpoints.csv");

    let mut cfg = AppConfig::default();
    cfg.endpoint_mut(16).unwrap().enabled = true;
    cfg.endpoint_mut(16).unwrap().position_max = 9000;
    save_endpoint_csv(&csv, &cfg).unwrap();

    let mut reloaded = AppConfig::default();
    load_endpoint_csv(&csv, &mut reloaded).unwrap();
    assert_eq!(reloaded, cfg);
}

#[test]
fn missing_csv_reports_file_not_found() {
    let dir = TempDir::new().unwrap();
    let mut cfg = AppConfig::default();
    let err = load_endpoint_csv(&dir.path().join("nope.csv"), &mut cfg).unwrap_err();
    assert_eq!(err, ConfigError::FileNotFound);
}
