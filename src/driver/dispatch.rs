//! Maps typed commands onto exchanges and exchange outcomes back onto typed
//! results, including the retry policy.
//!
//! The policy is deliberately asymmetric. Idempotent commands are cheap to
//! repeat, so timeouts and desyncs get a bounded number of retries.
//! Commands that start motion are a different matter: once the request is on
//! the wire, a missing or garbled response says nothing about whether the
//! controller is already moving, and re-sending could double the motion. In
//! that situation the dispatcher reports [`CommandError::Ambiguous`] and
//! leaves the decision to the caller. The single exception is a Nack whose
//! reason code the profile lists as a resend reason: that is the controller
//! itself stating it discarded the request unexecuted, so one re-send is
//! safe for any command.

use super::{
    cmd::{Command, Response},
    frame::{EncodingError, FrameCodec},
    session::{Session, TransportError},
};
use log::{debug, warn};
use std::time::Duration;
use thiserror::Error;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// Failure of one command
///
/// [`Rejected`][Self::Rejected] and [`Fault`][Self::Fault] are expected
/// controller responses, not driver failures; only the transport variants
/// mean something went wrong on the link.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The controller refused the command; the byte is its reason code
    /// (see [`ReasonCode`][super::cmd::ReasonCode] for the MN table)
    #[error("controller rejected the command, reason {0}")]
    Rejected(u8),
    /// The controller raised a fault while executing
    #[error("controller fault, code {0}")]
    Fault(u8),
    /// A motion command was written but its outcome is unknown. It has NOT
    /// been re-sent; query the status to find out what the controller did.
    #[error("motion command outcome unknown, not re-sent")]
    Ambiguous,
    /// The command was out of range for the profile; nothing was sent
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// The exchange failed after the configured retries
    #[error(transparent)]
    Transport(#[from] TransportError),
}

//

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Retries of an idempotent command on timeout or desync
    pub max_retries: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig { max_retries: 2 }
    }
}

//

/// Encodes, sends and interprets commands over a [`Session`]
#[derive(Debug)]
pub struct Dispatcher {
    codec: FrameCodec,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(codec: FrameCodec) -> Self {
        Self::with_config(codec, DispatchConfig::default())
    }

    pub fn with_config(codec: FrameCodec, config: DispatchConfig) -> Self {
        Dispatcher { codec, config }
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Runs one command to a typed conclusion
    ///
    /// On success the returned response is guaranteed to be of the kind the
    /// command expects (`Ack` for writes, `Status` for a status query,
    /// `Identity` for an identify).
    ///
    /// # Errors
    /// See [`CommandError`]; per the policy above, non-idempotent commands
    /// surface [`CommandError::Ambiguous`] instead of being re-sent.
    pub fn send(
        &self,
        session: &mut Session,
        cmd: &Command,
        timeout: Duration,
    ) -> Result<Response, CommandError> {
        let frame = self.codec.encode(cmd)?;
        let idempotent = cmd.is_idempotent();
        let retry_budget = if idempotent { self.config.max_retries } else { 0 };
        let mut resends = if idempotent { self.config.max_retries } else { 1 };
        let mut attempt = 0u32;
        loop {
            debug!("sending {:?}, attempt {}", cmd, attempt + 1);
            match session.exchange(&frame, &self.codec, timeout) {
                Ok(Response::Nack(reason)) => {
                    if self.codec.profile().resend_reasons.contains(&reason) && resends > 0 {
                        // the controller discarded the request unexecuted,
                        // one re-send is safe even for motion commands
                        warn!("request discarded by controller, reason {}, re-sending", reason);
                        resends -= 1;
                        continue;
                    }
                    return Err(CommandError::Rejected(reason));
                }
                Ok(Response::Error(code)) => return Err(CommandError::Fault(code)),
                Ok(response) if response.matches(cmd.expects()) => return Ok(response),
                Ok(response) => {
                    // a well-formed frame of the wrong kind means correlation
                    // was lost, same treatment as a desync
                    warn!("response {:?} does not answer {:?}", response, cmd);
                    if idempotent && attempt < retry_budget {
                        attempt += 1;
                        continue;
                    }
                    return Err(if idempotent {
                        TransportError::Desync.into()
                    } else {
                        CommandError::Ambiguous
                    });
                }
                Err(e @ TransportError::LinkLost(_)) => return Err(e.into()),
                Err(e) => {
                    // timeout or desync after a successful write: unknown
                    // outcome, so only idempotent commands are re-issued
                    if idempotent && attempt < retry_budget {
                        warn!("{}, retrying {:?}", e, cmd);
                        attempt += 1;
                        continue;
                    }
                    return Err(if idempotent {
                        e.into()
                    } else {
                        CommandError::Ambiguous
                    });
                }
            }
        }
    }
}
