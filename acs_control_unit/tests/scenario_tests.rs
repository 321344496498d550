//! End-to-end playback scenarios: files on disk, commands, then cycles.

use std::fs;
use std::path::{Path, PathBuf};

use acs_common::config::{CanSettings, PathSettings, TimingSettings};
use acs_common::endpoint::AppConfig;
use acs_common::mks;
use acs_control_unit::command::EndpointField;
use acs_control_unit::{Command, CommandError, CommandExecutor, Response, Station};
use acs_hal::can::CanTransport;
use acs_hal::can::sim::{SimCanController, SimCanProbe};
use acs_hal::serial::SerialMotorBus;
use acs_hal::serial::sim::{SimRoboClaw, SimRoboClawProbe};

fn station(dir: &Path) -> (Station, SimRoboClawProbe, SimCanProbe) {
    let rc_sim = SimRoboClaw::new();
    let rc = rc_sim.probe();
    let mut serial = SerialMotorBus::new();
    serial.bind(0, Box::new(rc_sim)).unwrap();

    let can_sim = SimCanController::new();
    let bus = can_sim.probe();
    let timing = TimingSettings::default();
    let can = CanTransport::new(Box::new(can_sim), &CanSettings::default(), &timing).unwrap();

    let paths = PathSettings {
        endpoints_csv: dir.join("endpoints.csv"),
        sequence_csv: dir.join("animation.csv"),
        config_blob: dir.join("config.bin"),
    };
    (
        Station::new(AppConfig::default(), paths, serial, can, &timing),
        rc,
        bus,
    )
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn start(station: &mut Station) {
    station.tick(0);
    station.execute(Command::SetPlaying(true)).unwrap();
}

#[test]
fn velocity_is_clamped_to_endpoint_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (mut st, rc, _) = station(dir.path());
    let endpoints = write(
        dir.path(),
        "endpoints.csv",
        "3,ROBOCLAW,0x80,1,0,0,0,800,0,2000,1,1\n",
    );
    let sequence = write(dir.path(), "animation.csv", "[sequence]\n0,3,0,2000,500,vel\n");

    assert_eq!(
        st.execute(Command::LoadEndpoints(Some(endpoints))).unwrap(),
        Response::Count(1)
    );
    assert_eq!(
        st.execute(Command::LoadSequence(Some(sequence))).unwrap(),
        Response::Count(1)
    );
    start(&mut st);

    assert_eq!(st.tick(1_000), 1);
    let cmd = rc.last_command().unwrap();
    assert_eq!(cmd.speed, 800);
    assert_eq!(cmd.accel, 500);
    assert_eq!(cmd.position, None);
}

#[test]
fn show_loops_back_to_the_first_event() {
    let dir = tempfile::tempdir().unwrap();
    let (mut st, rc, _) = station(dir.path());
    let sequence = write(
        dir.path(),
        "animation.csv",
        "[sequence]\n4000,1,200,800,250,pos\n0,1,100,800,250,pos\n",
    );
    st.execute(Command::LoadSequence(Some(sequence))).unwrap();
    start(&mut st);

    let mut positions = Vec::new();
    for now_us in [1_000, 2_000_000, 4_000_000, 4_002_000, 8_001_000] {
        rc.clear_commands();
        st.tick(now_us);
        positions.extend(rc.commands().iter().filter_map(|c| c.position));
    }
    // 4002 wraps to 1 and 8001 wraps to 4000.
    assert_eq!(positions, vec![100, 200, 100, 200]);

    st.execute(Command::Rewind).unwrap();
    rc.clear_commands();
    assert_eq!(st.tick(9_000_000), 0);
    assert!(rc.commands().is_empty());
}

#[test]
fn disabled_endpoint_events_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (mut st, rc, _) = station(dir.path());
    let sequence = write(
        dir.path(),
        "animation.csv",
        "[sequence]\n0,5,100,800,250\n0,1,300,800,250\n",
    );
    st.execute(Command::LoadSequence(Some(sequence))).unwrap();
    start(&mut st);

    assert_eq!(st.tick(1_000), 2);
    let positions: Vec<u32> = rc.commands().iter().filter_map(|c| c.position).collect();
    assert_eq!(positions, vec![300]);
}

#[test]
fn can_endpoint_status_goes_stale_without_replies() {
    let dir = tempfile::tempdir().unwrap();
    let (mut st, _, bus) = station(dir.path());
    bus.add_servo(0x05, 4096);
    let endpoints = write(
        dir.path(),
        "endpoints.csv",
        "1,MKS_SERVO,0x05,1,0,0,0,360,0,100,0,0,16384,0,0,0\n\
         2,ROBOCLAW,0x80,0,0,0,0,3000,0,6000,1,2\n",
    );
    st.execute(Command::LoadEndpoints(Some(endpoints))).unwrap();

    // First visit sends the request; the reply is picked up on the next.
    st.tick(0);
    assert!(matches!(
        st.execute(Command::EndpointStatus(1)),
        Err(CommandError::NoStatus(1))
    ));
    st.tick(100_000);
    match st.execute(Command::EndpointStatus(1)).unwrap() {
        Response::Status(status) => assert_eq!(status.position, Some(4096)),
        other => panic!("unexpected {other:?}"),
    }

    // 4096 pulses is 90 degrees; holding there re-sends the same target.
    bus.clear_sent();
    st.execute(Command::StopInPlace(1)).unwrap();
    let sent = bus.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload()[0], mks::CMD_POSITION);
    assert_eq!(bus.servo_position(0x05), Some(4096));

    bus.set_fail_writes(true);
    st.tick(1_100_000);
    assert!(st.execute(Command::EndpointStatus(1)).is_ok());
    st.tick(2_101_000);
    assert!(matches!(
        st.execute(Command::EndpointStatus(1)),
        Err(CommandError::NoStatus(1))
    ));
}

#[test]
fn inverted_limits_never_command_below_the_floor() {
    let dir = tempfile::tempdir().unwrap();
    let (mut st, rc, _) = station(dir.path());
    // velocity 100..40 and accel 300..200: both ranges are upside down.
    let endpoints = write(
        dir.path(),
        "endpoints.csv",
        "3,ROBOCLAW,0x80,1,0,0,100,40,300,200,1,1\n",
    );
    let sequence = write(
        dir.path(),
        "animation.csv",
        "[sequence]\n0,3,0,70,50,vel\n1000,3,0,5000,9000,vel\n",
    );
    st.execute(Command::LoadEndpoints(Some(endpoints))).unwrap();
    st.execute(Command::LoadSequence(Some(sequence))).unwrap();
    start(&mut st);

    st.tick(1_000);
    let cmd = rc.last_command().unwrap();
    assert_eq!((cmd.speed, cmd.accel), (100, 300));

    rc.clear_commands();
    st.tick(1_000_000);
    let cmd = rc.last_command().unwrap();
    assert_eq!((cmd.speed, cmd.accel), (100, 300));
}

#[test]
fn serial_address_wider_than_a_byte_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (mut st, rc, _) = station(dir.path());
    let endpoints = write(
        dir.path(),
        "endpoints.csv",
        "1,ROBOCLAW,0x180,1,0,0,0,3000,0,6000,1,1\n",
    );
    assert_eq!(
        st.execute(Command::LoadEndpoints(Some(endpoints))).unwrap(),
        Response::Count(0)
    );
    match st.execute(Command::GetEndpoint(1)).unwrap() {
        Response::Endpoint { config, .. } => assert_eq!(config.address, 0x80),
        other => panic!("unexpected {other:?}"),
    }
    let edit = st.execute(Command::SetEndpoint {
        id: 1,
        field: EndpointField::Address(0x180),
    });
    assert!(matches!(edit, Err(CommandError::Config(_))));

    let sequence = write(dir.path(), "animation.csv", "[sequence]\n0,1,300,800,250\n");
    st.execute(Command::LoadSequence(Some(sequence))).unwrap();
    start(&mut st);
    st.tick(1_000);
    assert!(rc.commands().iter().all(|c| c.address == 0x80));
}
