//! Wire-format description of one controller family.
//!
//! Vendors sharing the MotioNet framing still disagree on checksum algorithm,
//! byte order and field widths, so none of that is compiled in. A
//! [`ProtocolProfile`] value carries the whole layout and is handed to the
//! codec at construction; [`ProtocolProfile::mn_series`] is the profile the
//! MN100 family speaks.

#[cfg(test)]
mod tests;

use std::fmt::Display;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// Width of the frame's length field
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum LengthWidth {
    U8,
    U16,
}

impl LengthWidth {
    /// Number of bytes the length field occupies on the wire
    pub fn bytes(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
        }
    }

    /// Largest body length the field can express
    pub fn max_value(&self) -> usize {
        match self {
            Self::U8 => u8::MAX as usize,
            Self::U16 => u16::MAX as usize,
        }
    }
}

//

/// Byte order of every multi-byte integer in a frame body
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum ByteOrder {
    Big,
    Little,
}

//

/// Checksum algorithm of the frame trailer
///
/// The checksum is computed over the length field and the body (code plus
/// payload), never over the marker or terminator.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum ChecksumKind {
    /// Additive checksum with the high bit cleared (`sum & 0x7F`). The
    /// MN-series algorithm; the mask keeps the trailer out of the range
    /// reserved for address bytes on multi-drop buses.
    Sum7F,
    /// Plain wrapping additive checksum
    Sum8,
    /// XOR of all covered bytes
    Xor8,
}

impl ChecksumKind {
    /// Computes the checksum of `data` with this algorithm
    pub fn compute(&self, data: &[u8]) -> u8 {
        match self {
            Self::Sum7F => data.iter().fold(0u8, |s, b| s.wrapping_add(*b)) & 0x7F,
            Self::Sum8 => data.iter().fold(0u8, |s, b| s.wrapping_add(*b)),
            Self::Xor8 => data.iter().fold(0u8, |s, b| s ^ *b),
        }
    }
}

impl Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sum7F => write!(f, "sum7f"),
            Self::Sum8 => write!(f, "sum8"),
            Self::Xor8 => write!(f, "xor8"),
        }
    }
}

//

/// Describes the wire format and numeric limits of one controller family
///
/// Passed to [`FrameCodec`][super::frame::FrameCodec] (and through it to
/// everything else) at construction. The limits are enforced on encode, so an
/// out-of-range command is rejected before any byte reaches the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolProfile {
    /// First byte of every frame
    pub start_marker: u8,
    /// Last byte of every frame
    pub terminator: u8,
    /// Width of the length field
    pub length_width: LengthWidth,
    /// Byte order of multi-byte integers in frame bodies
    pub byte_order: ByteOrder,
    /// Trailer checksum algorithm
    pub checksum: ChecksumKind,
    /// Upper bound on the payload (body minus code byte) the family accepts
    pub max_payload: usize,
    /// Smallest commandable position, controller units
    pub position_min: i32,
    /// Largest commandable position, controller units
    pub position_max: i32,
    /// Largest commandable speed, controller units per second
    pub max_speed: u32,
    /// Highest axis number; axes are numbered from 1
    pub max_axes: u8,
    /// Fixed-point scale between engineering units and controller counts
    pub counts_per_unit: f64,
    /// Expected prefix of the identity string reported during the handshake.
    /// `None` accepts any identity.
    pub identity: Option<&'static str>,
    /// Nack reason codes that prove the controller discarded the request
    /// without executing it, making one re-send safe for any command
    pub resend_reasons: &'static [u8],
}

impl ProtocolProfile {
    /// Profile of the MN100 controller family
    ///
    /// STX/ETX framing, one-byte length, big-endian fields, additive checksum
    /// masked with 0x7F. Positions are 24-bit signed step counts. A slave
    /// that saw a corrupted request answers with reason 7 (slave checksum
    /// error) or 15 (no command in packet); both leave the request
    /// unexecuted.
    pub fn mn_series() -> Self {
        ProtocolProfile {
            start_marker: 0x02,
            terminator: 0x03,
            length_width: LengthWidth::U8,
            byte_order: ByteOrder::Big,
            checksum: ChecksumKind::Sum7F,
            max_payload: 64,
            position_min: -(1 << 23),
            position_max: (1 << 23) - 1,
            max_speed: 250_000,
            max_axes: 4,
            counts_per_unit: 1.0,
            identity: Some("MN1"),
            resend_reasons: &[
                super::cmd::ReasonCode::SlaveChecksumError as u8,
                super::cmd::ReasonCode::NoCommand as u8,
            ],
        }
    }

    /// Converts a position in engineering units to controller counts
    pub fn units_to_counts(&self, units: f64) -> i32 {
        (units * self.counts_per_unit).round() as i32
    }

    /// Converts controller counts to engineering units
    pub fn counts_to_units(&self, counts: i32) -> f64 {
        counts as f64 / self.counts_per_unit
    }
}

impl Default for ProtocolProfile {
    fn default() -> Self {
        Self::mn_series()
    }
}
