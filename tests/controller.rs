use motionet_driver::{
    Command, CommandError, Config, Controller, FrameCodec, OpenError, ProtocolProfile, Response,
    StatusReport, TransportError,
};
use motionet_driver_test::Interface;
use std::time::Duration;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(50);

fn codec() -> FrameCodec {
    FrameCodec::new(ProtocolProfile::mn_series())
}

fn script_handshake(interface: &Interface, codec: &FrameCodec) {
    interface.add_exchange(
        &codec.encode(&Command::Identify).unwrap(),
        &codec
            .encode_response(&Response::Identity(b"MN100 rev4".to_vec()))
            .unwrap(),
    );
}

fn connect(interface: &Interface) -> Controller {
    Controller::connect(
        Box::new(interface.clone()),
        ProtocolProfile::mn_series(),
        Config::default(),
        HANDSHAKE_TIMEOUT,
    )
    .unwrap()
}

fn status_response(codec: &FrameCodec, position: i32) -> Vec<u8> {
    codec
        .encode_response(&Response::Status(StatusReport {
            position,
            velocity: 0,
            fault_flags: 0,
            busy: false,
        }))
        .unwrap()
}

#[test]
fn connect_performs_the_identify_handshake() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);

    let _controller = connect(&interface);

    assert!(interface.is_empty());
}

#[test]
fn foreign_identity_is_rejected() {
    let interface = Interface::new();
    let codec = codec();
    interface.add_exchange(
        &codec.encode(&Command::Identify).unwrap(),
        &codec
            .encode_response(&Response::Identity(b"ACME-9000".to_vec()))
            .unwrap(),
    );

    let r = Controller::connect(
        Box::new(interface),
        ProtocolProfile::mn_series(),
        Config::default(),
        HANDSHAKE_TIMEOUT,
    );

    match r {
        Err(OpenError::UnexpectedIdentity(id)) => assert_eq!(id, "ACME-9000"),
        other => panic!("expected UnexpectedIdentity, got {:?}", other.err()),
    }
}

#[test]
fn silent_device_is_a_handshake_timeout() {
    let interface = Interface::new();
    let codec = codec();
    // one attempt, no dispatcher retries, so exactly one unanswered write
    let config = Config {
        max_retries: 0,
        handshake_retries: 1,
        ..Config::default()
    };
    interface.add_write(&codec.encode(&Command::Identify).unwrap());

    let r = Controller::connect(
        Box::new(interface.clone()),
        ProtocolProfile::mn_series(),
        config,
        HANDSHAKE_TIMEOUT,
    );

    assert!(matches!(r, Err(OpenError::HandshakeTimeout)));
    assert!(interface.is_empty());
}

#[test]
fn close_is_idempotent_and_commands_fail_afterwards() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    controller.close();
    controller.close();

    let r = controller.stop();
    assert!(matches!(
        r,
        Err(CommandError::Transport(TransportError::LinkLost(_)))
    ));
}

#[test]
fn move_refreshes_a_stale_position_first() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    // the tracked position is still unknown, so the move is preceded by one
    // status query for the deadline estimate
    interface.add_exchange(
        &codec.encode(&Command::GetStatus).unwrap(),
        &status_response(&codec, 0),
    );
    interface.add_exchange(
        &codec
            .encode(&Command::Move {
                target: 10_000,
                speed: 2_000,
            })
            .unwrap(),
        &codec.encode_response(&Response::Ack).unwrap(),
    );

    controller.move_to(10_000, 2_000).unwrap();

    assert_eq!(interface.writes_done(), 3);
    assert!(interface.is_empty());
}

#[test]
fn move_trusts_a_fresh_position() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    // a generous max-age so the snapshot can't go stale mid-test
    let controller = Controller::connect(
        Box::new(interface.clone()),
        ProtocolProfile::mn_series(),
        Config {
            stale_after: Duration::from_secs(600),
            ..Config::default()
        },
        HANDSHAKE_TIMEOUT,
    )
    .unwrap();

    interface.add_exchange(
        &codec.encode(&Command::GetStatus).unwrap(),
        &status_response(&codec, 4_000),
    );
    controller.get_status().unwrap();

    // fresh snapshot: the move goes out without another status query
    interface.add_exchange(
        &codec
            .encode(&Command::Move {
                target: 5_000,
                speed: 1_000,
            })
            .unwrap(),
        &codec.encode_response(&Response::Ack).unwrap(),
    );
    controller.move_to(5_000, 1_000).unwrap();

    assert_eq!(interface.writes_done(), 3);
    assert!(interface.is_empty());
}

#[test]
fn zero_speed_move_is_rejected_before_io() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    let r = controller.move_to(1_000, 0);

    assert!(matches!(r, Err(CommandError::Encoding(_))));
    assert!(interface.is_empty());
}

#[test]
fn status_updates_the_tracked_state() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    let (_, stale) = controller.state();
    assert!(stale);

    interface.add_exchange(
        &codec.encode(&Command::GetStatus).unwrap(),
        &status_response(&codec, 321),
    );
    controller.get_status().unwrap();

    let (state, stale) = controller.state();
    assert!(!stale);
    assert_eq!(state.position, 321);
}

#[test]
fn identify_returns_the_device_string() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    script_handshake(&interface, &codec);
    assert_eq!(controller.identify().unwrap(), "MN100 rev4");
}
