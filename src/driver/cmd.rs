//! Typed bindings for the commands and responses of the protocol.
//!
//! Everything here is declarative: which wire code a command uses, whether it
//! is safe to re-send, and which response it expects. The byte layout lives
//! in [`frame`][super::frame].


use super::map;
use num_derive::FromPrimitive;
use std::fmt::Display;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// Direction of a jog motion
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, FromPrimitive)]
pub enum Direction {
    Backward,
    Forward,
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

//

/// Controller parameters writable with [`Command::SetParameter`]
///
/// The numeric values are the key bytes on the wire.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, FromPrimitive)]
pub enum Parameter {
    Velocity = 1,
    Acceleration = 2,
    Deceleration = 3,
    HomingSpeed = 4,
    CurrentLimit = 5,
}

impl Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

//

/// Reason codes the MN controller family reports in Nack responses
///
/// The raw byte is preserved everywhere in the driver since other families
/// assign these differently; this enum is a decoding convenience for callers
/// on MN-series hardware ([`num_traits::FromPrimitive::from_u8`]).
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, FromPrimitive)]
pub enum ReasonCode {
    /// Command received, execution started
    Start = 3,
    MoveAborted = 4,
    CommandFinished = 5,
    /// The request arrived with a bad checksum and was discarded
    SlaveChecksumError = 7,
    SlaveAddressError = 8,
    InvalidCommand = 12,
    InvalidParameter = 14,
    /// The packet carried no command and was discarded
    NoCommand = 15,
    NoMovePending = 16,
    MoveAlreadyPending = 17,
    /// A move is in progress and no commands can be received
    Busy = 20,
    Present = 22,
    PortUnavailable = 29,
    /// Move stopped by a stop command (decelerated)
    MoveStopped = 32,
}

impl Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

//

/// A command the driver can issue to the controller
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Command {
    /// Move to an absolute position at the given speed. Acknowledged on
    /// completion.
    Move { target: i32, speed: u32 },
    /// Run the homing cycle of one axis. Axes are numbered from 1.
    Home { axis: u8 },
    /// Start a continuous motion in `direction` until stopped
    Jog { direction: Direction, speed: u32 },
    /// Decelerated stop of any motion in progress
    Stop,
    /// Query position, velocity, fault flags and the busy flag
    GetStatus,
    /// Write one controller parameter
    SetParameter { key: Parameter, value: i32 },
    /// Query the device/firmware identity string
    Identify,
}

impl Command {
    /// Wire code of the command
    pub fn code(&self) -> u8 {
        match self {
            Self::Move { .. } => map::MOVE,
            Self::Home { .. } => map::HOME,
            Self::Jog { .. } => map::JOG,
            Self::Stop => map::STOP,
            Self::GetStatus => map::GET_STATUS,
            Self::SetParameter { .. } => map::SET_PARAMETER,
            Self::Identify => map::IDENTIFY,
        }
    }

    /// Whether re-sending the command cannot have effects beyond its first
    /// successful execution
    ///
    /// Motion commands are not idempotent: a duplicate `Move` or `Home` can
    /// re-start a completed motion, a duplicate `Jog` can extend one. `Stop`,
    /// reads and absolute parameter writes are safe to repeat.
    pub fn is_idempotent(&self) -> bool {
        match self {
            Self::Move { .. } | Self::Home { .. } | Self::Jog { .. } => false,
            Self::Stop | Self::GetStatus | Self::SetParameter { .. } | Self::Identify => true,
        }
    }

    pub(crate) fn expects(&self) -> ResponseKind {
        match self {
            Self::GetStatus => ResponseKind::Status,
            Self::Identify => ResponseKind::Identity,
            _ => ResponseKind::Ack,
        }
    }
}

//

/// One status telemetry sample as reported by the controller
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub struct StatusReport {
    /// Position, controller units
    pub position: i32,
    /// Velocity, controller units per second
    pub velocity: i32,
    /// Fault bitmask; bit meanings are family-specific and left to the caller
    pub fault_flags: u16,
    /// A motion is in progress
    pub busy: bool,
}

impl StatusReport {
    /// Any fault bit set
    pub fn has_fault(&self) -> bool {
        self.fault_flags != 0
    }
}

//

/// A response parsed out of a well-formed frame
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Response {
    /// Command accepted and, for motion commands, completed
    Ack,
    /// Command refused; the byte is the controller's reason code
    Nack(u8),
    /// Reply to [`Command::GetStatus`]
    Status(StatusReport),
    /// The controller raised a fault while executing
    Error(u8),
    /// Reply to [`Command::Identify`]; usually an ASCII name and firmware
    /// revision
    Identity(Vec<u8>),
}

impl Response {
    pub(crate) fn matches(&self, kind: ResponseKind) -> bool {
        matches!(
            (self, kind),
            (Self::Ack, ResponseKind::Ack)
                | (Self::Status(_), ResponseKind::Status)
                | (Self::Identity(_), ResponseKind::Identity)
        )
    }
}

//

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) enum ResponseKind {
    Ack,
    Status,
    Identity,
}
