//! Last-known controller state with staleness tracking.
//!
//! The tracker is pure bookkeeping: it never blocks and never touches the
//! wire. Polling is the caller's (or the background poller's) job; the
//! tracker only records what the controller last reported and how trustworthy
//! that still is.


use super::cmd::StatusReport;
use chrono::{DateTime, Local};
use std::time::Duration;

/// Snapshot of everything the controller last reported about itself
///
/// Mutated only when a status response actually parsed; a failed or rejected
/// command never touches it.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    /// Position, controller units
    pub position: i32,
    /// Velocity, controller units per second
    pub velocity: i32,
    /// Fault bitmask as reported; bit meanings are family-specific
    pub fault_flags: u16,
    /// A motion is in progress
    pub busy: bool,
    /// When the controller last reported, `None` before the first report
    pub last_update: Option<DateTime<Local>>,
}

impl ControllerState {
    fn unknown() -> Self {
        ControllerState {
            position: 0,
            velocity: 0,
            fault_flags: 0,
            busy: false,
            last_update: None,
        }
    }

    /// Any fault bit set
    pub fn has_fault(&self) -> bool {
        self.fault_flags != 0
    }
}

/// Keeps the [`ControllerState`] of one controller
#[derive(Debug)]
pub struct StateTracker {
    state: ControllerState,
    max_age: Duration,
}

impl StateTracker {
    /// A fresh tracker starts stale/unknown; `max_age` is how old a snapshot
    /// may get before [`is_stale`][Self::is_stale] flips
    pub fn new(max_age: Duration) -> Self {
        StateTracker {
            state: ControllerState::unknown(),
            max_age,
        }
    }

    /// Overwrites the snapshot with a fresh status report
    pub fn update(&mut self, report: &StatusReport, now: DateTime<Local>) {
        self.state.position = report.position;
        self.state.velocity = report.velocity;
        self.state.fault_flags = report.fault_flags;
        self.state.busy = report.busy;
        self.state.last_update = Some(now);
    }

    /// The snapshot and whether it is stale relative to `now`
    pub fn current(&self, now: DateTime<Local>) -> (ControllerState, bool) {
        (self.state.clone(), self.is_stale(now))
    }

    /// Stale means older than the configured max-age, or never updated.
    /// A stale snapshot must not be trusted for safety-relevant decisions.
    pub fn is_stale(&self, now: DateTime<Local>) -> bool {
        match self.state.last_update {
            Some(at) => match (now - at).to_std() {
                Ok(age) => age > self.max_age,
                // the clock moved backwards past the stamp; the report is
                // newer than now, not old
                Err(_) => false,
            },
            None => true,
        }
    }

    /// Any fault bit set in the last report
    pub fn has_fault(&self) -> bool {
        self.state.has_fault()
    }
}
