use applied_motion_lib::device::{
    list_candidate_ports, DeviceError, DeviceIdentity, Drive, Handshake, HandshakeState, ProbeResult,
};
use applied_motion_lib::serial::sim::{SimulatedBus, SimulatedDrive};
use applied_motion_lib::serial::{LinkConfig, PortInfo};
use applied_motion_lib::DriveConfig;

fn rs232(name: &str) -> PortInfo {
    PortInfo::new(name, "PNP0501")
}

#[test]
fn test_binds_first_matching_drive_and_stops() {
    let bus = SimulatedBus::new();
    bus.add_port(rs232("COM1"), Some(SimulatedDrive::new("107G020")))
        .add_port(PortInfo::new("COM2", "USB VID:PID=0403:6001"), Some(SimulatedDrive::new("106G020")))
        .add_port(rs232("COM3"), Some(SimulatedDrive::new("106G020")))
        .add_port(rs232("COM4"), Some(SimulatedDrive::new("106G020")));

    let drive = Drive::connect_with(&DriveConfig::new(20, 6), &bus, bus.transport()).unwrap();

    assert_eq!(drive.port_name(), "COM3");
    assert_eq!(drive.revision().raw, "106G020");
    assert_eq!(drive.identity(), DeviceIdentity::new(20, 6));
    assert!(drive.is_connected());

    // COM2 is filtered out, COM4 is never probed
    assert_eq!(bus.open_attempts(), vec!["COM1", "COM3"]);
    assert!(bus.written("COM4").is_empty());
    assert_eq!(bus.written("COM3"), vec!["255620", "MV"]);
    assert_eq!(bus.written("COM1"), vec!["255620", "MV"]);
    assert!(bus.is_open("COM3"));
    assert_eq!(bus.open_sessions(), 1);
}

#[test]
fn test_marker_byte_is_not_interpreted() {
    let bus = SimulatedBus::new();
    bus.add_port(rs232("COM1"), Some(SimulatedDrive::new("X06-020")));

    let drive = Drive::connect_with(&DriveConfig::new(20, 6), &bus, bus.transport()).unwrap();
    assert_eq!(drive.revision().marker, "-");
    assert_eq!(drive.port_name(), "COM1");
}

#[test]
fn test_state_sequence_for_single_match() {
    let bus = SimulatedBus::new();
    bus.add_port(rs232("COM1"), Some(SimulatedDrive::new("106G020")));
    let candidates = list_candidate_ports(&bus, "PNP0501").unwrap();

    let mut handshake = Handshake::new(DeviceIdentity::new(20, 6), candidates, bus.transport(), LinkConfig::default());
    while !handshake.is_finished() {
        handshake.step();
    }

    assert_eq!(
        handshake.history(),
        &[
            HandshakeState::Idle,
            HandshakeState::Configuring { candidate: 0 },
            HandshakeState::Opening { candidate: 0 },
            HandshakeState::PoweringUp { candidate: 0 },
            HandshakeState::AwaitingIdentity { candidate: 0 },
            HandshakeState::Verifying { candidate: 0, reply: "106G020".to_string() },
            HandshakeState::Bound { candidate: 0 },
        ]
    );

    // Terminal states are sticky
    assert_eq!(handshake.step(), &HandshakeState::Bound { candidate: 0 });
    assert_eq!(handshake.history().len(), 7);

    let binding = handshake.into_binding().unwrap();
    assert_eq!(binding.port.port_name, "COM1");
    assert!(binding.protocol.interface().is_connected());
}

#[test]
fn test_configuring_does_no_io() {
    let bus = SimulatedBus::new();
    bus.add_port(rs232("COM1"), Some(SimulatedDrive::new("106G020")));
    let candidates = list_candidate_ports(&bus, "PNP0501").unwrap();

    let mut handshake = Handshake::new(DeviceIdentity::new(20, 6), candidates, bus.transport(), LinkConfig::default());
    handshake.step();
    assert_eq!(handshake.step(), &HandshakeState::Opening { candidate: 0 });
    assert!(bus.open_attempts().is_empty());

    assert_eq!(handshake.step(), &HandshakeState::PoweringUp { candidate: 0 });
    assert!(bus.is_open("COM1"));
    assert!(bus.written("COM1").is_empty());
}

#[test]
fn test_every_failure_mode_reaches_unbound_with_ports_closed() {
    let bus = SimulatedBus::new();
    bus.add_busy_port(rs232("COM1"))
        .add_port(rs232("COM2"), None)
        .add_port(rs232("COM3"), Some(SimulatedDrive::new("106G")))
        .add_port(rs232("COM4"), Some(SimulatedDrive::new("106G021")));
    let candidates = list_candidate_ports(&bus, "PNP0501").unwrap();

    let mut handshake = Handshake::new(DeviceIdentity::new(20, 6), candidates, bus.transport(), LinkConfig::default());
    while !handshake.is_finished() {
        handshake.step();
    }

    assert_eq!(handshake.state(), &HandshakeState::Unbound);
    assert_eq!(bus.open_sessions(), 0);

    let results: Vec<&ProbeResult> = handshake.outcomes().iter().map(|o| &o.result).collect();
    assert_eq!(results.len(), 4);
    assert!(matches!(results[0], ProbeResult::OpenFailed(_)));
    assert_eq!(results[1], &ProbeResult::ShortReply(String::new()));
    assert_eq!(results[2], &ProbeResult::ShortReply("106G".to_string()));
    assert!(matches!(results[3], ProbeResult::Mismatch(rev) if rev.model == "021"));

    assert!(matches!(
        handshake.into_binding(),
        Err(DeviceError::NotFound { candidates: 4 })
    ));
    assert_eq!(bus.open_sessions(), 0);
}

#[test]
fn test_no_candidates_is_unbound() {
    let bus = SimulatedBus::new();
    bus.add_port(PortInfo::new("COM1", "n/a"), Some(SimulatedDrive::new("106G020")));

    let result = Drive::connect_with(&DriveConfig::new(20, 6), &bus, bus.transport());
    assert!(matches!(result, Err(DeviceError::NotFound { candidates: 0 })));
    assert!(bus.open_attempts().is_empty());
}

#[test]
fn test_dropping_drive_closes_port() {
    let bus = SimulatedBus::new();
    bus.add_port(rs232("COM1"), Some(SimulatedDrive::new("106G020")));

    let drive = Drive::connect_with(&DriveConfig::new(20, 6), &bus, bus.transport()).unwrap();
    assert_eq!(bus.open_sessions(), 1);
    drop(drive);
    assert_eq!(bus.open_sessions(), 0);

    let drive = Drive::connect_with(&DriveConfig::new(20, 6), &bus, bus.transport()).unwrap();
    drive.disconnect();
    assert_eq!(bus.open_sessions(), 0);
}

#[test]
fn test_identity_that_cannot_fit_reply_is_rejected() {
    let bus = SimulatedBus::new();
    bus.add_port(rs232("COM1"), Some(SimulatedDrive::new("106G020")));

    let result = Drive::connect_with(&DriveConfig::new(20, 106), &bus, bus.transport());
    assert!(matches!(result, Err(DeviceError::InvalidConfiguration(_))));
    assert!(bus.open_attempts().is_empty());
}

#[test]
fn test_custom_hardware_id() {
    let bus = SimulatedBus::new();
    bus.add_port(rs232("COM1"), Some(SimulatedDrive::new("106G020")))
        .add_port(PortInfo::new("/dev/ttyUSB0", "USB VID:PID=0403:6001"), Some(SimulatedDrive::new("106G020")));

    let config = DriveConfig::new(20, 6).with_hardware_id("USB VID:PID=0403:6001");
    let drive = Drive::connect_with(&config, &bus, bus.transport()).unwrap();
    assert_eq!(drive.port_name(), "/dev/ttyUSB0");
}
