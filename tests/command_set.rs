use applied_motion_lib::serial::sim::{SimulatedBus, SimulatedDrive, SimulatedTransport};
use applied_motion_lib::serial::{AlarmCode, PortInfo, SerialError};
use applied_motion_lib::{Drive, DriveConfig};

const PORT: &str = "COM1";

fn bound_drive() -> (SimulatedBus, Drive<SimulatedTransport>) {
    let bus = SimulatedBus::new();
    bus.add_port(PortInfo::new(PORT, "PNP0501"), Some(SimulatedDrive::new("106G020")));
    let drive = Drive::connect_with(&DriveConfig::new(20, 6), &bus, bus.transport()).unwrap();
    (bus, drive)
}

fn last_written(bus: &SimulatedBus) -> String {
    bus.written(PORT).last().cloned().unwrap_or_default()
}

#[test]
fn test_acceleration_rate_round_trip() {
    let (bus, mut drive) = bound_drive();
    let protocol = drive.protocol_mut();

    assert_eq!(protocol.get_acc_rate().unwrap(), 25);
    assert_eq!(last_written(&bus), "AC");

    protocol.set_acc_rate(100).unwrap();
    assert_eq!(last_written(&bus), "AC100");
    assert_eq!(bus.register(PORT, "AC").as_deref(), Some("100"));
    assert_eq!(protocol.get_acc_rate().unwrap(), 100);
}

#[test]
fn test_repeated_reads_are_stable() {
    let (_bus, mut drive) = bound_drive();
    let protocol = drive.protocol_mut();

    let first = protocol.get_acc_rate().unwrap();
    let second = protocol.get_acc_rate().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_alarm_code_is_hex_and_reset_is_fire_and_forget() {
    let (bus, mut drive) = bound_drive();
    bus.set_register(PORT, "AL", "0002");
    let protocol = drive.protocol_mut();

    let alarm = protocol.get_alarm_code().unwrap();
    assert_eq!(alarm, AlarmCode(2));
    assert!(!alarm.is_clear());

    bus.set_register(PORT, "AL", "00A0");
    assert_eq!(protocol.get_alarm_code().unwrap().bits(), 0xA0);

    protocol.reset_alarm().unwrap();
    assert_eq!(last_written(&bus), "AR");

    // The ack left behind by AR is discarded before the next exchange
    assert!(protocol.get_alarm_code().unwrap().is_clear());
}

#[test]
fn test_jog_parameters_use_three_decimals() {
    let (bus, mut drive) = bound_drive();
    let protocol = drive.protocol_mut();

    protocol.set_jog_speed(12.5).unwrap();
    assert_eq!(last_written(&bus), "JS12.500");
    assert_eq!(protocol.get_jog_speed().unwrap(), 12.5);

    protocol.set_jog_acc(2.0).unwrap();
    assert_eq!(last_written(&bus), "JA2.000");
    assert_eq!(bus.register(PORT, "JA").as_deref(), Some("2.000"));
    assert_eq!(protocol.get_jog_acc().unwrap(), 2.0);
}

#[test]
fn test_jogging_sequence() {
    let (bus, mut drive) = bound_drive();
    let protocol = drive.protocol_mut();

    protocol.commence_jogging().unwrap();
    assert!(bus.is_jogging(PORT));

    protocol.change_jog_speed(3.25).unwrap();
    assert_eq!(last_written(&bus), "CS3.250");

    protocol.stop_jogging().unwrap();
    assert_eq!(last_written(&bus), "SJ");
    assert!(!bus.is_jogging(PORT));
}

#[test]
fn test_rejected_command_is_an_error() {
    let (_bus, mut drive) = bound_drive();

    let err = drive.protocol_mut().change_jog_speed(1.0).unwrap_err();
    match err {
        SerialError::Rejected { opcode, reply } => {
            assert_eq!(opcode, "CS");
            assert_eq!(reply, "?");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unparseable_reply_is_a_typed_error() {
    let (bus, mut drive) = bound_drive();
    bus.set_register(PORT, "AC", "fast");
    bus.set_register(PORT, "JS", "");

    let err = drive.protocol_mut().get_acc_rate().unwrap_err();
    assert!(matches!(
        err,
        SerialError::InvalidValue { ref opcode, kind: "integer", ref value } if opcode == "AC" && value == "fast"
    ));

    let err = drive.protocol_mut().get_jog_speed().unwrap_err();
    assert!(matches!(err, SerialError::InvalidValue { kind: "float", .. }));
}

#[test]
fn test_model_revision_query() {
    let (bus, mut drive) = bound_drive();
    assert_eq!(drive.protocol_mut().model_revision().unwrap(), "106G020");
    assert_eq!(last_written(&bus), "MV");
}

#[test]
fn test_commands_after_disconnect_fail() {
    let (_bus, mut drive) = bound_drive();
    drive.protocol_mut().interface_mut().disconnect();

    assert!(matches!(drive.protocol_mut().get_acc_rate(), Err(SerialError::NotConnected)));
    assert!(matches!(drive.protocol_mut().reset_alarm(), Err(SerialError::NotConnected)));
}

#[test]
fn test_oversized_reply_is_a_read_failure() {
    let (bus, mut drive) = bound_drive();
    bus.set_register(PORT, "AC", &"7".repeat(70_000));

    let result = drive.protocol_mut().get_acc_rate();
    assert!(matches!(result, Err(SerialError::LineTooLong(65536))));
}
