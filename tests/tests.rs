use motionet_driver::{
    Command, CommandError, Config, Controller, Direction, FrameCodec, Parameter, ProtocolProfile,
    Response, StatusReport, TransportError,
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

fn status_response(codec: &FrameCodec, report: StatusReport) -> Vec<u8> {
    codec.encode_response(&Response::Status(report)).unwrap()
}

fn idle_at(position: i32) -> StatusReport {
    StatusReport {
        position,
        velocity: 0,
        fault_flags: 0,
        busy: false,
    }
}

#[test]
fn stop_is_acknowledged() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    interface.add_exchange(
        &codec.encode(&Command::Stop).unwrap(),
        &codec.encode_response(&Response::Ack).unwrap(),
    );

    controller.stop().unwrap();
    assert!(interface.is_empty());
}

#[test]
fn rejected_home_leaves_the_state_untouched() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    interface.add_exchange(
        &codec.encode(&Command::Home { axis: 1 }).unwrap(),
        &codec.encode_response(&Response::Nack(2)).unwrap(),
    );

    let r = controller.home(1);
    assert!(matches!(r, Err(CommandError::Rejected(2))));

    let (state, stale) = controller.state();
    assert!(stale);
    assert!(state.last_update.is_none());
    assert_eq!(state.position, 0);
}

#[test]
fn get_status_resynchronizes_through_line_noise() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    interface.add_write(&codec.encode(&Command::GetStatus).unwrap());
    let mut noisy = vec![0xF0, 0x0F, 0x55];
    noisy.extend_from_slice(&status_response(
        &codec,
        StatusReport {
            position: 8_192,
            velocity: 120,
            fault_flags: 0,
            busy: true,
        },
    ));
    interface.add_read(&noisy);

    let report = controller.get_status().unwrap();
    assert_eq!(report.position, 8_192);
    assert!(report.busy);

    let (state, stale) = controller.state();
    assert!(!stale);
    assert_eq!(state.position, 8_192);
}

#[test]
fn ambiguous_move_is_surfaced_not_retried() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    // the deadline estimate queries status first, then the move itself gets
    // no answer at all
    interface.add_exchange(
        &codec.encode(&Command::GetStatus).unwrap(),
        &status_response(&codec, idle_at(0)),
    );
    interface.add_write(
        &codec
            .encode(&Command::Move {
                target: 600,
                speed: 3_000,
            })
            .unwrap(),
    );

    let r = controller.move_to(600, 3_000);
    assert!(matches!(r, Err(CommandError::Ambiguous)));
    // handshake, status query, one move write, nothing else: a re-send
    // would have tripped the mock
    assert_eq!(interface.writes_done(), 3);
    assert!(interface.is_empty());
}

#[test]
fn repeated_status_queries_only_track_reported_values() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    let report = StatusReport {
        position: 1_000,
        velocity: 0,
        fault_flags: 0,
        busy: false,
    };
    interface.add_exchange(
        &codec.encode(&Command::GetStatus).unwrap(),
        &status_response(&codec, report),
    );
    interface.add_exchange(
        &codec.encode(&Command::GetStatus).unwrap(),
        &status_response(&codec, report),
    );

    let first = controller.get_status().unwrap();
    let second = controller.get_status().unwrap();
    assert_eq!(first, second);
    let (state, _) = controller.state();
    assert_eq!(state.position, 1_000);
    assert_eq!(state.velocity, 0);
}

#[test]
fn jog_and_parameter_writes_are_acknowledged() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    interface.add_exchange(
        &codec
            .encode(&Command::SetParameter {
                key: Parameter::Velocity,
                value: 2_000,
            })
            .unwrap(),
        &codec.encode_response(&Response::Ack).unwrap(),
    );
    controller.set_parameter(Parameter::Velocity, 2_000).unwrap();

    interface.add_exchange(
        &codec
            .encode(&Command::Jog {
                direction: Direction::Forward,
                speed: 800,
            })
            .unwrap(),
        &codec.encode_response(&Response::Ack).unwrap(),
    );
    controller.jog(Direction::Forward, 800).unwrap();

    interface.add_exchange(
        &codec.encode(&Command::Stop).unwrap(),
        &codec.encode_response(&Response::Ack).unwrap(),
    );
    controller.stop().unwrap();

    assert!(interface.is_empty());
}

#[test]
fn controller_fault_is_typed() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    interface.add_exchange(
        &codec.encode(&Command::Stop).unwrap(),
        &codec.encode_response(&Response::Error(0x21)).unwrap(),
    );

    let r = controller.stop();
    assert!(matches!(r, Err(CommandError::Fault(0x21))));
}

#[test]
fn close_twice_then_commands_report_link_lost() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    controller.close();
    controller.close();

    let r = controller.get_status();
    assert!(matches!(
        r,
        Err(CommandError::Transport(TransportError::LinkLost(_)))
    ));
}

#[test]
fn background_poller_updates_the_tracked_state() {
    let interface = Interface::new();
    let codec = codec();
    script_handshake(&interface, &codec);
    let controller = connect(&interface);

    interface.add_exchange(
        &codec.encode(&Command::GetStatus).unwrap(),
        &status_response(&codec, idle_at(2_048)),
    );

    // a long interval: the poller polls once right away, then sleeps until
    // stopped
    let poller = controller.start_poller(Duration::from_secs(3600));
    for _ in 0..200 {
        if interface.is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    poller.stop();

    assert!(interface.is_empty());
    let (state, stale) = controller.state();
    assert!(!stale);
    assert_eq!(state.position, 2_048);
}
