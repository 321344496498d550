//! Station behaviour through the command surface, with on-disk fixtures.

use std::fs;
use std::path::Path;

use acs_common::config::{CanSettings, ConfigLoader, PathSettings, StationConfig, TimingSettings};
use acs_common::endpoint::{AppConfig, EndpointKind};
use acs_common::endpoint_csv::apply_endpoint_csv;
use acs_common::mks;
use acs_common::sequence::Mode;
use acs_control_unit::command::{EndpointField, Motion};
use acs_control_unit::sequence::parse_sequence;
use acs_control_unit::{Command, CommandError, CommandExecutor, PlayerState, Response, Station};
use acs_hal::BackendRegistry;
use acs_hal::can::sim::{SimCanController, SimCanProbe};
use acs_hal::can::{CanFrame, CanTransport};
use acs_hal::serial::SerialMotorBus;
use acs_hal::serial::sim::{SimRoboClaw, SimRoboClawProbe};

fn paths_in(dir: &Path) -> PathSettings {
    PathSettings {
        endpoints_csv: dir.join("endpoints.csv"),
        sequence_csv: dir.join("animation.csv"),
        config_blob: dir.join("config.bin"),
    }
}

fn station_config(dir: &Path) -> StationConfig {
    StationConfig {
        paths: paths_in(dir),
        ..StationConfig::default()
    }
}

struct Rig {
    station: Station,
    rc: SimRoboClawProbe,
    bus: SimCanProbe,
}

fn rig(dir: &Path) -> Rig {
    let rc_sim = SimRoboClaw::new();
    let rc = rc_sim.probe();
    let mut serial = SerialMotorBus::new();
    serial.bind(0, Box::new(rc_sim)).unwrap();

    let can_sim = SimCanController::new();
    let bus = can_sim.probe();
    let timing = TimingSettings::default();
    let can = CanTransport::new(Box::new(can_sim), &CanSettings::default(), &timing).unwrap();

    let station = Station::new(AppConfig::default(), paths_in(dir), serial, can, &timing);
    Rig { station, rc, bus }
}

#[test]
fn shipped_config_files_parse() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");

    let station = StationConfig::load(&root.join("station.toml")).unwrap();
    station.validate().unwrap();
    assert_eq!(station.timing.cycle_time_us, 1000);

    let mut table = AppConfig::default();
    let report = apply_endpoint_csv(&fs::read_to_string(root.join("endpoints.csv")).unwrap(), &mut table);
    assert_eq!((report.applied, report.skipped), (4, 0));
    assert_eq!(table.endpoint(4).map(|e| e.kind), Some(EndpointKind::MksServo));

    let events = parse_sequence(&fs::read_to_string(root.join("animation.csv")).unwrap()).unwrap();
    assert_eq!(events.len(), 20);
    assert_eq!(events.iter().filter(|e| e.mode == Mode::Velocity).count(), 4);
}

#[test]
fn startup_uses_csv_overrides_and_builtin_animation() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("endpoints.csv"),
        "3,ROBOCLAW,0x81,1,0,0,0,800,0,2000,2,1\nbroken,row\n",
    )
    .unwrap();

    let station = Station::from_config(&station_config(dir.path()), &BackendRegistry::default()).unwrap();
    let ep = station.config().endpoint(3).copied().unwrap();
    assert!(ep.enabled);
    assert_eq!((ep.address, ep.serial_port, ep.velocity_max), (0x81, 2, 800));
    assert_eq!(station.player().len(), 20);
    assert_eq!(station.player().state(), PlayerState::Stopped);
}

#[test]
fn sequence_without_section_leaves_player_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("animation.csv"), "0,1,0,800,250,pos\n").unwrap();
    let station = Station::from_config(&station_config(dir.path()), &BackendRegistry::default()).unwrap();
    assert_eq!(station.player().state(), PlayerState::Empty);
}

#[test]
fn invalid_runtime_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = station_config(dir.path());
    cfg.can.bitrate = 0;
    assert!(Station::from_config(&cfg, &BackendRegistry::default()).is_err());
}

#[test]
fn save_reset_and_factory_reset() {
    let dir = tempfile::tempdir().unwrap();
    let Rig { mut station, .. } = rig(dir.path());

    station
        .execute(Command::SetEndpoint {
            id: 2,
            field: EndpointField::VelocityMax(1234),
        })
        .unwrap();
    station.execute(Command::SaveConfig).unwrap();

    station
        .execute(Command::SetEnabled { id: 2, enabled: false })
        .unwrap();
    station.execute(Command::ResetConfig).unwrap();
    let ep = station.config().endpoint(2).copied().unwrap();
    assert!(ep.enabled);
    assert_eq!(ep.velocity_max, 1234);

    station.execute(Command::FactoryReset).unwrap();
    assert_eq!(station.config(), &AppConfig::default());
    station.execute(Command::ResetConfig).unwrap();
    assert_eq!(station.config(), &AppConfig::default());
}

#[test]
fn reset_without_blob_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let Rig { mut station, .. } = rig(dir.path());
    station
        .execute(Command::SetEnabled { id: 7, enabled: true })
        .unwrap();
    station.execute(Command::ResetConfig).unwrap();
    assert_eq!(station.config(), &AppConfig::default());
}

#[test]
fn endpoint_csv_round_trip_through_commands() {
    let dir = tempfile::tempdir().unwrap();
    let Rig { mut station, .. } = rig(dir.path());
    station
        .execute(Command::SetEndpoint {
            id: 1,
            field: EndpointField::PositionMin(-500),
        })
        .unwrap();
    station.execute(Command::SaveEndpoints(None)).unwrap();
    station.execute(Command::FactoryReset).unwrap();

    let applied = station.execute(Command::LoadEndpoints(None)).unwrap();
    assert_eq!(applied, Response::Count(16));
    assert_eq!(station.config().endpoint(1).map(|e| e.position_min), Some(-500));
}

#[test]
fn sequence_load_save_and_info() {
    let dir = tempfile::tempdir().unwrap();
    let Rig { mut station, .. } = rig(dir.path());
    let path = dir.path().join("show.csv");
    fs::write(
        &path,
        "[sequence]\n4000,1,0,800,250\n0,1,0,800,250\n2000,2,500,800,250,vel\n",
    )
    .unwrap();

    assert_eq!(
        station.execute(Command::LoadSequence(Some(path))).unwrap(),
        Response::Count(3)
    );
    match station.execute(Command::SequenceInfo).unwrap() {
        Response::SequenceInfo {
            count,
            loop_length_ms,
            state,
            ..
        } => {
            assert_eq!(count, 3);
            assert_eq!(loop_length_ms, 4001);
            assert_eq!(state, PlayerState::Stopped);
        }
        other => panic!("unexpected {other:?}"),
    }

    station.execute(Command::SaveSequence(None)).unwrap();
    let text = fs::read_to_string(dir.path().join("animation.csv")).unwrap();
    assert_eq!(
        text,
        "[sequence]\n# time_ms,endpoint_id,position,velocity,accel,mode\n\
         0,1,0,800,250,pos\n2000,2,500,800,250,vel\n4000,1,0,800,250,pos\n"
    );

    let missing = station.execute(Command::LoadSequence(Some(dir.path().join("nope.csv"))));
    assert!(matches!(missing, Err(CommandError::Sequence(_))));
    assert_eq!(station.player().state(), PlayerState::Empty);
}

#[test]
fn direct_serial_paths() {
    let dir = tempfile::tempdir().unwrap();
    let Rig { mut station, rc, .. } = rig(dir.path());

    let motion = Motion {
        mode: Mode::Velocity,
        position: 0,
        velocity: 4000,
        accel: 100,
    };
    station
        .execute(Command::SerialCommand {
            port: 1,
            address: 0x80,
            motor: 2,
            motion,
        })
        .unwrap();
    // Direct commands bypass endpoint clamping.
    assert_eq!(rc.last_command().map(|c| c.speed), Some(4000));

    assert!(matches!(
        station.execute(Command::SerialRead { port: 1, address: 0x80 }),
        Ok(Response::Serial(_))
    ));
    assert!(matches!(
        station.execute(Command::SerialRead { port: 2, address: 0x80 }),
        Err(CommandError::Device(_))
    ));
    assert!(matches!(
        station.execute(Command::SerialRead { port: 9, address: 0x80 }),
        Err(CommandError::Device(_))
    ));

    rc.set_fail_writes(true);
    assert!(station
        .execute(Command::SerialCommand {
            port: 1,
            address: 0x80,
            motor: 1,
            motion,
        })
        .is_err());
}

#[test]
fn direct_can_paths() {
    let dir = tempfile::tempdir().unwrap();
    let Rig { mut station, bus, .. } = rig(dir.path());
    bus.add_servo(0x05, 0);

    let motion = Motion {
        mode: Mode::Position,
        position: 2048,
        velocity: 9999,
        accel: 999,
    };
    station
        .execute(Command::CanCommand { can_id: 0x05, motion })
        .unwrap();
    assert_eq!(
        bus.sent()[0].payload(),
        &mks::pack_position(0x05, 3000, 255, 2048).unwrap()
    );
    assert_eq!(bus.servo_position(0x05), Some(2048));

    assert_eq!(
        station.execute(Command::CanRead(0x05)).unwrap(),
        Response::Can(None)
    );
    station.tick(10_000);
    match station.execute(Command::CanRead(0x05)).unwrap() {
        Response::Can(Some(status)) => assert_eq!(status.position, 2048),
        other => panic!("unexpected {other:?}"),
    }

    assert!(station
        .execute(Command::CanCommand { can_id: 0x800, motion })
        .is_err());
}

#[test]
fn can_health_and_log_dump() {
    let dir = tempfile::tempdir().unwrap();
    let Rig { mut station, bus, .. } = rig(dir.path());
    bus.set_error_registers(0x0000_2000 | (1 << 4), 0x0105);

    match station.execute(Command::CanHealth).unwrap() {
        Response::Health(health) => {
            let line = health.to_string();
            assert!(line.contains("CAN:"), "{line}");
            assert!(line.contains("Error Passive"), "{line}");
            assert!(line.contains("ACK_ERR"), "{line}");
        }
        other => panic!("unexpected {other:?}"),
    }

    for _ in 0..20 {
        bus.inject(CanFrame::new(0x7F, &[1, 2, 3]));
    }
    station.tick(0);
    match station.execute(Command::DumpCanLog(0)).unwrap() {
        Response::CanLog(dump) => assert!(dump.frames.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
}
