//! Rust driver for MicroKinetics MotioNet motion controllers (MN100 series
//! and protocol-compatible families).
//!
//! The controllers speak a small framed request/response protocol over a
//! half-duplex serial link. This crate handles the framing, checksums,
//! timeouts, retries and resynchronization so calling code only deals with
//! typed commands and typed results. Vendor families differ in checksum
//! algorithm, byte order and field widths; all of that is described by a
//! [`ProtocolProfile`] supplied when the controller is opened, with
//! [`ProtocolProfile::mn_series`] covering the MN100 family.
//!
//! # Usage
//! One physical controller gets one [`Controller`]. Opening it performs an
//! identify handshake against the expected profile. All commands block until
//! the controller answers, the deadline expires or the link is lost, and
//! every command returns an explicit typed result. Commands that start motion
//! ([`move_to`][Controller::move_to], [`home`][Controller::home],
//! [`jog`][Controller::jog]) are never silently re-sent; see
//! [`CommandError::Ambiguous`] for the one case the caller has to resolve.
//!
//! # Examples
//! ```no_run
//! # use motionet_driver::{Controller, ProtocolProfile};
//! use std::time::Duration;
//!
//! let ctl = Controller::open(
//!     "/dev/ttyUSB0",
//!     ProtocolProfile::mn_series(),
//!     19200,
//!     Duration::from_secs(1),
//! )
//! .unwrap();
//!
//! ctl.move_to(10_000, 2_000).unwrap();
//! let status = ctl.get_status().unwrap();
//! println!("at {} steps, busy: {}", status.position, status.busy);
//! ctl.close();
//! ```

mod driver;
pub(crate) mod util;

pub use driver::{
    cmd::{Command, Direction, Parameter, ReasonCode, Response, StatusReport},
    dispatch::{CommandError, DispatchConfig, Dispatcher},
    frame::{EncodingError, FrameCodec, FrameError},
    poller::StatusPoller,
    profile::{ByteOrder, ChecksumKind, LengthWidth, ProtocolProfile},
    session::{Interface, Session, SessionConfig, TransportError},
    state::{ControllerState, StateTracker},
    Config, Controller, OpenError,
};
