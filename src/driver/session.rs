//! Blocking request/response exchanges over the serial link.
//!
//! The link is half-duplex and single-in-flight: one frame goes out, one
//! response comes back, and nothing else may touch the wire in between. The
//! [`Session`] owns the byte transport and the receive buffer and performs
//! exactly that dance, including resynchronization when garbage shows up in
//! the middle of it.

use super::{
    cmd::Response,
    frame::{FrameCodec, FrameError},
};
use log::{debug, trace, warn};
use serialport::SerialPort;
use std::{
    io::{self, Read, Write},
    time::{Duration, Instant},
};
use thiserror::Error;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// The byte transport a [`Session`] drives
///
/// Any duplex byte stream works; `Box<dyn SerialPort>` implements it out of
/// the box. A read must return [`io::ErrorKind::TimedOut`] (or `WouldBlock`)
/// once the configured read timeout elapses without data, and `Ok(0)` only
/// when the device is gone.
pub trait Interface: Read + Write + Send {
    /// Sets the timeout after which a blocking read gives up
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl Interface for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.as_mut().set_timeout(timeout).map_err(io::Error::from)
    }
}

//

/// Failure of one exchange
#[derive(Error, Debug)]
pub enum TransportError {
    /// The line stayed silent until the deadline
    #[error("no response within the deadline")]
    Timeout,
    /// Bytes arrived but no valid frame could be recovered from them before
    /// the deadline
    #[error("lost frame alignment on the serial link")]
    Desync,
    /// The device is gone or the session is closed. Fatal; the caller has to
    /// re-establish the connection.
    #[error("serial link lost: {0}")]
    LinkLost(io::Error),
}

//

/// Tuning knobs of the read loop
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reads attempted within one exchange before giving up. The deadline is
    /// a single overall budget, never per attempt.
    pub max_read_attempts: u32,
    /// How long to wait for late bytes when discarding a response that
    /// missed its deadline
    pub drain_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_read_attempts: 32,
            drain_timeout: Duration::from_millis(50),
        }
    }
}

// never read more than this when flushing a late response off the line
const DRAIN_LIMIT: usize = 4096;

//

/// Owns the serial channel and performs one blocking exchange at a time
///
/// Exactly one session exists per physical controller, behind the handle's
/// mutex. Closing it releases the transport; every exchange afterwards fails
/// with [`TransportError::LinkLost`].
pub struct Session {
    interface: Option<Box<dyn Interface>>,
    rx: Vec<u8>,
    config: SessionConfig,
}

impl Session {
    pub fn new(interface: Box<dyn Interface>) -> Self {
        Self::with_config(interface, SessionConfig::default())
    }

    pub fn with_config(interface: Box<dyn Interface>, config: SessionConfig) -> Self {
        Session {
            interface: Some(interface),
            rx: Vec::with_capacity(256),
            config,
        }
    }

    pub fn is_open(&self) -> bool {
        self.interface.is_some()
    }

    /// Releases the transport. Idempotent.
    pub fn close(&mut self) -> Option<Box<dyn Interface>> {
        self.rx.clear();
        self.interface.take()
    }

    /// Writes `frame` and reads until a complete response decodes or the
    /// deadline elapses
    ///
    /// Garbage on the line is skipped up to the next plausible frame
    /// boundary within the same deadline, so a valid frame behind line noise
    /// still gets through. If the deadline (or the read-attempt budget)
    /// expires the failure is [`Desync`][TransportError::Desync] when
    /// garbage was seen and [`Timeout`][TransportError::Timeout] when the
    /// line stayed silent; either way any late bytes are drained first so
    /// they cannot be attributed to the next exchange.
    ///
    /// # Errors
    /// [`TransportError::LinkLost`] on write failure, end-of-stream or a
    /// closed session; this one is fatal and never retried here or above.
    pub fn exchange(
        &mut self,
        frame: &[u8],
        codec: &FrameCodec,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        // anything still buffered belongs to a previous exchange
        self.rx.clear();
        {
            let interface = self.interface.as_mut().ok_or_else(closed)?;
            trace!("tx {:02x?}", frame);
            interface.write_all(frame).map_err(TransportError::LinkLost)?;
            interface.flush().map_err(TransportError::LinkLost)?;
        }
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;
        let mut desynced = false;
        loop {
            match codec.decode(&self.rx) {
                Ok((response, consumed)) => {
                    self.rx.drain(..consumed);
                    trace!("rx {:?}", response);
                    return Ok(response);
                }
                Err(FrameError::NeedMoreBytes) => {}
                Err(e) => {
                    // Checksum or Desync: drop input up to the next possible
                    // frame start and look again before reading more
                    warn!("skipping corrupt input: {}", e);
                    desynced = true;
                    self.discard_to_boundary(codec.profile().start_marker);
                    if !self.rx.is_empty() {
                        continue;
                    }
                }
            }
            let now = Instant::now();
            if now >= deadline || attempts >= self.config.max_read_attempts {
                self.drain_late_bytes();
                return Err(if desynced {
                    TransportError::Desync
                } else {
                    TransportError::Timeout
                });
            }
            attempts += 1;
            let interface = self.interface.as_mut().ok_or_else(closed)?;
            interface
                .set_read_timeout(deadline - now)
                .map_err(TransportError::LinkLost)?;
            let mut chunk = [0u8; 256];
            match interface.read(&mut chunk) {
                Ok(0) => {
                    return Err(TransportError::LinkLost(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "device closed the link",
                    )))
                }
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(e) if retryable(e.kind()) => {}
                Err(e) => return Err(TransportError::LinkLost(e)),
            }
        }
    }

    // drops the leading corrupt byte(s); afterwards the buffer either starts
    // with a marker byte or is empty
    fn discard_to_boundary(&mut self, marker: u8) {
        match self.rx.iter().skip(1).position(|b| *b == marker) {
            Some(i) => {
                self.rx.drain(..i + 1);
            }
            None => self.rx.clear(),
        }
    }

    // a response that missed its deadline must not bleed into the next
    // exchange's framing, so give it a short grace window and discard it
    fn drain_late_bytes(&mut self) {
        self.rx.clear();
        let interface = match self.interface.as_mut() {
            Some(i) => i,
            None => return,
        };
        if interface.set_read_timeout(self.config.drain_timeout).is_err() {
            return;
        }
        let mut chunk = [0u8; 256];
        let mut drained = 0usize;
        while drained < DRAIN_LIMIT {
            match interface.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }
        if drained > 0 {
            debug!("drained {} late byte(s)", drained);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Session {{ open: {}, buffered: {} }}",
            self.is_open(),
            self.rx.len()
        )
    }
}

//

fn closed() -> TransportError {
    TransportError::LinkLost(io::Error::new(
        io::ErrorKind::NotConnected,
        "session is closed",
    ))
}

fn retryable(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
