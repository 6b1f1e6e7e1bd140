pub mod cmd;
pub mod dispatch;
pub mod frame;
mod map;
mod parse;
pub mod poller;
pub mod profile;
pub mod session;
pub mod state;

use self::{
    cmd::{Command, Direction, Parameter, Response, StatusReport},
    dispatch::{DispatchConfig, Dispatcher},
    frame::{EncodingError, FrameCodec},
    poller::StatusPoller,
    profile::ProtocolProfile,
    session::{Interface, Session, SessionConfig, TransportError},
    state::{ControllerState, StateTracker},
};
pub use self::dispatch::CommandError;
use crate::util::ensure;
use chrono::Local;
use log::debug;
use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// Errors while opening a controller
#[derive(Error, Debug)]
pub enum OpenError {
    /// The OS reports the device absent or held by another process. Serial
    /// devices are opened exclusively, so a second handle on the same path
    /// lands here.
    #[error("device not available, possibly held by another process")]
    DeviceBusy,
    /// No usable identity reply within the handshake attempts
    #[error("no identity response from the device")]
    HandshakeTimeout,
    /// A device answered, but it is not the expected controller family
    #[error("unexpected device identity {0:?}")]
    UnexpectedIdentity(String),
    /// Wrapper around [`io::Error`]
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<serialport::Error> for OpenError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => OpenError::DeviceBusy,
            serialport::ErrorKind::Io(kind) => OpenError::Io(kind.into()),
            _ => OpenError::Io(io::Error::new(io::ErrorKind::Other, e.description)),
        }
    }
}

//

/// Driver configuration
///
/// The defaults match the MN-series documentation: controllers answer plain
/// commands well within 500 ms, connects are attempted three times, and a
/// move's deadline is derived from its estimated travel time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline of a plain command exchange
    pub command_timeout: Duration,
    /// Deadline of a homing cycle, which can take many seconds on long axes
    pub home_timeout: Duration,
    /// Safety factor on the estimated travel time of a move
    pub move_timeout_margin: f64,
    /// Retries of idempotent commands on timeout or desync
    pub max_retries: u32,
    /// Identify attempts while opening
    pub handshake_retries: u32,
    /// Snapshot age beyond which [`Controller::state`] reports stale
    pub stale_after: Duration,
    /// Read-loop tuning, see [`SessionConfig`]
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            command_timeout: Duration::from_millis(500),
            home_timeout: Duration::from_secs(30),
            move_timeout_margin: 1.2,
            max_retries: 2,
            handshake_retries: 3,
            stale_after: Duration::from_secs(1),
            session: SessionConfig::default(),
        }
    }
}

//

// what the Controller and the background poller share. the session mutex is
// the half-duplex discipline: whoever holds it owns the wire for exactly one
// exchange. the tracker mutex is only ever held for the copy, never across
// I/O, so state() cannot block behind a slow exchange.
#[derive(Debug)]
pub(crate) struct Inner {
    session: Mutex<Session>,
    dispatcher: Dispatcher,
    tracker: Mutex<StateTracker>,
    config: Config,
}

impl Inner {
    // every command funnels through here; one lock, one in-flight exchange
    fn transact(&self, cmd: &Command, timeout: Duration) -> Result<Response, CommandError> {
        let response = {
            let mut session = self.session.lock().unwrap();
            self.dispatcher.send(&mut session, cmd, timeout)?
        };
        if let Response::Status(report) = &response {
            self.tracker.lock().unwrap().update(report, Local::now());
        }
        Ok(response)
    }

    pub(crate) fn poll_status(&self) -> Result<StatusReport, CommandError> {
        match self.transact(&Command::GetStatus, self.config.command_timeout)? {
            Response::Status(report) => Ok(report),
            // send() only returns the expected kind; anything else is a bug
            // upstream and gets the transport treatment
            _ => Err(TransportError::Desync.into()),
        }
    }

    fn expect_ack(&self, cmd: &Command, timeout: Duration) -> Result<(), CommandError> {
        match self.transact(cmd, timeout)? {
            Response::Ack => Ok(()),
            _ => Err(TransportError::Desync.into()),
        }
    }
}

//

/// Handle on one physical motion controller
///
/// Owns the serial session, the dispatcher and the tracked state. All
/// methods block until the controller answered, the deadline expired or the
/// link was lost, and always return an explicit typed result. Concurrent
/// calls on the same handle are serialized on the session; there is never
/// more than one exchange on the wire.
///
/// Idempotency per method: [`stop`][Self::stop], [`get_status`][Self::get_status],
/// [`set_parameter`][Self::set_parameter] and [`identify`][Self::identify]
/// are idempotent and get retried on transport hiccups;
/// [`move_to`][Self::move_to], [`home`][Self::home] and [`jog`][Self::jog]
/// start motion and are never re-sent on an unknown outcome (see
/// [`CommandError::Ambiguous`]).
///
/// # Examples
/// ```no_run
/// # use motionet_driver::{Controller, ProtocolProfile};
/// use std::time::Duration;
///
/// let ctl = Controller::open(
///     "/dev/ttyUSB0",
///     ProtocolProfile::mn_series(),
///     19200,
///     Duration::from_secs(1),
/// )
/// .unwrap();
/// ctl.home(1).unwrap();
/// ctl.move_to(10_000, 2_000).unwrap();
/// ctl.close();
/// ```
#[derive(Debug)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// Opens the serial device at `path` and performs the identify handshake
    ///
    /// # Errors
    /// [`OpenError::DeviceBusy`] when the OS refuses the device (absent or
    /// exclusively held elsewhere), [`OpenError::HandshakeTimeout`] when
    /// nothing that speaks the protocol answers, and
    /// [`OpenError::UnexpectedIdentity`] when something answers but does not
    /// match the profile's expected identity.
    pub fn open(
        path: &str,
        profile: ProtocolProfile,
        baud: u32,
        handshake_timeout: Duration,
    ) -> Result<Controller, OpenError> {
        let port = serialport::new(path, baud)
            .timeout(handshake_timeout)
            .open()?;
        debug!("opened {} at {} baud", path, baud);
        Self::connect(Box::new(port), profile, Config::default(), handshake_timeout)
    }

    /// Like [`open`][Self::open], but over an already-established transport
    ///
    /// This is the constructor for non-serial transports and simulated
    /// devices; `open` delegates here after opening the port.
    pub fn connect(
        interface: Box<dyn Interface>,
        profile: ProtocolProfile,
        config: Config,
        handshake_timeout: Duration,
    ) -> Result<Controller, OpenError> {
        let dispatcher = Dispatcher::with_config(
            FrameCodec::new(profile),
            DispatchConfig {
                max_retries: config.max_retries,
            },
        );
        let inner = Arc::new(Inner {
            session: Mutex::new(Session::with_config(interface, config.session.clone())),
            dispatcher,
            tracker: Mutex::new(StateTracker::new(config.stale_after)),
            config,
        });
        let controller = Controller { inner };
        controller.handshake(handshake_timeout)?;
        Ok(controller)
    }

    fn handshake(&self, timeout: Duration) -> Result<(), OpenError> {
        let expected = self.inner.dispatcher.codec().profile().identity;
        let mut attempts = self.inner.config.handshake_retries.max(1);
        loop {
            attempts -= 1;
            match self.inner.transact(&Command::Identify, timeout) {
                Ok(Response::Identity(id)) => {
                    let id = String::from_utf8_lossy(&id).into_owned();
                    if let Some(prefix) = expected {
                        ensure!(id.starts_with(prefix), OpenError::UnexpectedIdentity(id));
                    }
                    debug!("connected to {}", id);
                    return Ok(());
                }
                Err(CommandError::Transport(TransportError::LinkLost(e))) => {
                    return Err(OpenError::Io(e))
                }
                Ok(_) | Err(_) if attempts == 0 => return Err(OpenError::HandshakeTimeout),
                Ok(_) | Err(_) => {}
            }
        }
    }

    /// Moves to an absolute `position` at `speed`, blocking until the
    /// controller acknowledges completion
    ///
    /// The deadline is the estimated travel time from the last known
    /// position times the configured margin (at least the plain command
    /// timeout); if the tracked position is stale, one status query refreshes
    /// it first. Not idempotent: an unknown outcome surfaces as
    /// [`CommandError::Ambiguous`] instead of a re-send.
    pub fn move_to(&self, position: i32, speed: u32) -> Result<(), CommandError> {
        let timeout = self.move_deadline(position, speed)?;
        self.inner
            .expect_ack(&Command::Move { target: position, speed }, timeout)
    }

    /// Runs the homing cycle of `axis` (numbered from 1). Not idempotent.
    pub fn home(&self, axis: u8) -> Result<(), CommandError> {
        self.inner
            .expect_ack(&Command::Home { axis }, self.inner.config.home_timeout)
    }

    /// Starts a continuous motion in `direction` at `speed`; runs until
    /// [`stop`][Self::stop]. Not idempotent.
    pub fn jog(&self, direction: Direction, speed: u32) -> Result<(), CommandError> {
        self.inner.expect_ack(
            &Command::Jog { direction, speed },
            self.inner.config.command_timeout,
        )
    }

    /// Decelerated stop of any motion in progress. Idempotent: stopping an
    /// already-stopped controller is a no-op, so transport hiccups are
    /// retried.
    pub fn stop(&self) -> Result<(), CommandError> {
        self.inner
            .expect_ack(&Command::Stop, self.inner.config.command_timeout)
    }

    /// Queries position, velocity, fault flags and the busy flag, updating
    /// the tracked state. Idempotent.
    pub fn get_status(&self) -> Result<StatusReport, CommandError> {
        self.inner.poll_status()
    }

    /// Writes one controller parameter. Idempotent: the write is absolute,
    /// so repeating it is indistinguishable from doing it once.
    pub fn set_parameter(&self, key: Parameter, value: i32) -> Result<(), CommandError> {
        self.inner.expect_ack(
            &Command::SetParameter { key, value },
            self.inner.config.command_timeout,
        )
    }

    /// Queries the device identity string, e.g. the firmware revision.
    /// Idempotent.
    pub fn identify(&self) -> Result<String, CommandError> {
        match self
            .inner
            .transact(&Command::Identify, self.inner.config.command_timeout)?
        {
            Response::Identity(id) => Ok(String::from_utf8_lossy(&id).into_owned()),
            _ => Err(TransportError::Desync.into()),
        }
    }

    /// The tracked state snapshot and whether it is stale
    ///
    /// Never touches the wire and never waits for an in-flight exchange.
    pub fn state(&self) -> (ControllerState, bool) {
        self.inner.tracker.lock().unwrap().current(Local::now())
    }

    /// Spawns a background thread polling [`get_status`][Self::get_status]
    /// every `interval`, through the same session mutex as foreground
    /// commands
    pub fn start_poller(&self, interval: Duration) -> StatusPoller {
        StatusPoller::spawn(Arc::clone(&self.inner), interval)
    }

    /// Releases the serial transport. Idempotent; safe to call twice.
    ///
    /// Commands issued after closing (including by a still-running poller)
    /// fail with [`TransportError::LinkLost`].
    pub fn close(&self) {
        if self.inner.session.lock().unwrap().close().is_some() {
            debug!("link released");
        }
    }

    // a move's deadline scales with how far it has to travel. the estimate
    // needs a trustworthy current position, which may cost one status query.
    fn move_deadline(&self, target: i32, speed: u32) -> Result<Duration, CommandError> {
        ensure!(
            speed >= 1,
            CommandError::Encoding(EncodingError::SpeedOutOfRange(speed))
        );
        let (state, stale) = self.state();
        let position = if stale {
            self.get_status()?.position
        } else {
            state.position
        };
        let distance = (target as i64 - position as i64).unsigned_abs();
        let travel = distance as f64 / speed as f64;
        let scaled = Duration::from_secs_f64(travel * self.inner.config.move_timeout_margin);
        Ok(self.inner.config.command_timeout.max(scaled))
    }
}
