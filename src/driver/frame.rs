//! Framing and unframing of controller messages.
//!
//! A frame on the wire is
//!
//! ```text
//! [marker] [length] [code] [payload ...] [checksum] [terminator]
//! ```
//!
//! where the length counts code plus payload and the checksum covers the
//! length field, code and payload. Marker, terminator, length width, byte
//! order and checksum algorithm all come from the
//! [`ProtocolProfile`][super::profile::ProtocolProfile] the codec is built
//! with.
//!
//! Decoding is incremental: the caller feeds whatever bytes it has and gets
//! either a response plus the number of bytes consumed, or
//! [`FrameError::NeedMoreBytes`] while a frame is still arriving. Any byte
//! sequence is a valid input; garbage surfaces as [`FrameError::Desync`] or
//! [`FrameError::Checksum`], never as a panic.


use super::{
    cmd::{Command, Response, StatusReport},
    map,
    parse::{int_i32, int_u16, parse_enum_value, ParseError},
    profile::{ByteOrder, LengthWidth, ProtocolProfile},
};
use crate::util::ensure;
use nom::{
    bytes::streaming::{tag, take},
    combinator::all_consuming,
    number::streaming::{be_u16 as stream_be_u16, le_u16 as stream_le_u16, u8 as stream_u8},
    sequence::tuple,
    Finish, IResult,
};
use thiserror::Error;

// unfortunately, due to rustfmt not having the blank_lines_upper_bound feature
// stable yet, we gotta put comments in between the different sections. otherwise
// its just too much

//

/// A command value does not fit the profile's wire format. Raised before any
/// I/O happens.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodingError {
    /// Target position outside the profile's commandable range
    #[error("position {0} outside the commandable range")]
    PositionOutOfRange(i32),
    /// Speed zero or above the profile's maximum
    #[error("speed {0} outside the commandable range")]
    SpeedOutOfRange(u32),
    /// Axis number zero or above the profile's axis count
    #[error("axis {0} does not exist on this controller")]
    AxisOutOfRange(u8),
    /// Body too long for the length field or the profile's payload bound
    #[error("payload of {0} bytes exceeds the frame format")]
    PayloadTooLong(usize),
}

//

/// Decoding failure of a (possibly still incomplete) frame
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// The input ends in the middle of a structurally valid frame. Not a
    /// fault; feed more bytes and decode again.
    #[error("frame incomplete, need more bytes")]
    NeedMoreBytes,
    /// The frame was structurally complete but its checksum does not match
    /// its contents
    #[error("checksum mismatch, expected {expected:#04x}, received {received:#04x}")]
    Checksum { expected: u8, received: u8 },
    /// The input does not start with a frame boundary, or the body is not a
    /// recognizable response
    #[error("frame boundary lost")]
    Desync,
}

//

/// Serializes commands into frames and parses frames back into responses
///
/// Pure and deterministic; all layout decisions come from the profile.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    profile: ProtocolProfile,
}

impl FrameCodec {
    pub fn new(profile: ProtocolProfile) -> Self {
        FrameCodec { profile }
    }

    pub fn profile(&self) -> &ProtocolProfile {
        &self.profile
    }

    /// Encodes a command into a complete frame
    ///
    /// # Errors
    /// Returns an [`EncodingError`] when a numeric field exceeds what the
    /// profile can represent; nothing has been sent at that point.
    pub fn encode(&self, cmd: &Command) -> Result<Vec<u8>, EncodingError> {
        let p = &self.profile;
        let mut body = Vec::with_capacity(16);
        body.push(cmd.code());
        match cmd {
            Command::Move { target, speed } => {
                ensure!(
                    (p.position_min..=p.position_max).contains(target),
                    EncodingError::PositionOutOfRange(*target)
                );
                ensure!(
                    *speed >= 1 && *speed <= p.max_speed,
                    EncodingError::SpeedOutOfRange(*speed)
                );
                self.put_i32(&mut body, *target);
                self.put_u32(&mut body, *speed);
            }
            Command::Home { axis } => {
                ensure!(
                    *axis >= 1 && *axis <= p.max_axes,
                    EncodingError::AxisOutOfRange(*axis)
                );
                body.push(*axis);
            }
            Command::Jog { direction, speed } => {
                ensure!(
                    *speed >= 1 && *speed <= p.max_speed,
                    EncodingError::SpeedOutOfRange(*speed)
                );
                body.push(*direction as u8);
                self.put_u32(&mut body, *speed);
            }
            Command::SetParameter { key, value } => {
                body.push(*key as u8);
                self.put_i32(&mut body, *value);
            }
            Command::Stop | Command::GetStatus | Command::Identify => {}
        }
        self.finish_frame(body)
    }

    /// Encodes a response into a complete frame
    ///
    /// The controller-to-host direction of [`encode`][Self::encode]; it
    /// closes the round-trip law `decode(encode_response(r)) == r` and is
    /// what device simulators and tests script traffic with.
    pub fn encode_response(&self, resp: &Response) -> Result<Vec<u8>, EncodingError> {
        let mut body = Vec::with_capacity(16);
        match resp {
            Response::Ack => body.push(map::ACK),
            Response::Nack(reason) => {
                body.push(map::NACK);
                body.push(*reason);
            }
            Response::Status(report) => {
                body.push(map::STATUS_REPORT);
                self.put_i32(&mut body, report.position);
                self.put_i32(&mut body, report.velocity);
                self.put_u16(&mut body, report.fault_flags);
                body.push(report.busy as u8);
            }
            Response::Error(code) => {
                body.push(map::FAULT);
                body.push(*code);
            }
            Response::Identity(id) => {
                body.push(map::IDENTITY);
                body.extend_from_slice(id);
            }
        }
        self.finish_frame(body)
    }

    /// Parses the next response out of `input`
    ///
    /// On success returns the response and how many bytes of `input` it
    /// occupied, so the caller can drain its buffer. All byte sequences are
    /// valid inputs:
    ///
    /// # Errors
    /// - [`FrameError::NeedMoreBytes`] — `input` is a prefix of a valid
    ///   frame; not a failure.
    /// - [`FrameError::Checksum`] — structurally complete frame, corrupt
    ///   contents.
    /// - [`FrameError::Desync`] — `input` does not begin with a frame, or
    ///   the body is not a recognizable response.
    pub fn decode(&self, input: &[u8]) -> Result<(Response, usize), FrameError> {
        let (remainder, (body, received)) = self.envelope(input).map_err(|e| match e {
            nom::Err::Incomplete(_) => FrameError::NeedMoreBytes,
            _ => FrameError::Desync,
        })?;
        let consumed = input.len() - remainder.len();
        // covered by the checksum: everything between marker and trailer
        let expected = self.profile.checksum.compute(&input[1..consumed - 2]);
        ensure!(
            expected == received,
            FrameError::Checksum { expected, received }
        );
        Ok((self.parse_body(body)?, consumed))
    }

    // recognizes the frame structure: marker, length, body, checksum,
    // terminator. streaming parsers so a truncated frame comes back as
    // Incomplete instead of an error.
    fn envelope<'a>(
        &self,
        input: &'a [u8],
    ) -> IResult<&'a [u8], (&'a [u8], u8), nom::error::Error<&'a [u8]>> {
        let p = &self.profile;
        let marker = [p.start_marker];
        let terminator = [p.terminator];
        let (s, _) = tag(&marker[..])(input)?;
        let (s, len) = match (p.length_width, p.byte_order) {
            (LengthWidth::U8, _) => {
                let (s, l) = stream_u8(s)?;
                (s, l as usize)
            }
            (LengthWidth::U16, ByteOrder::Big) => {
                let (s, l) = stream_be_u16(s)?;
                (s, l as usize)
            }
            (LengthWidth::U16, ByteOrder::Little) => {
                let (s, l) = stream_le_u16(s)?;
                (s, l as usize)
            }
        };
        // an implausible length means we are not looking at a real frame
        if len == 0 || len > p.max_payload + 1 {
            return Err(nom::Err::Error(nom::error::Error::new(
                s,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (s, body) = take(len)(s)?;
        let (s, received) = stream_u8(s)?;
        let (s, _) = tag(&terminator[..])(s)?;
        Ok((s, (body, received)))
    }

    // interprets a checksum-verified body as a response. complete parsers
    // from here on, the envelope already proved the bytes are all there.
    fn parse_body(&self, body: &[u8]) -> Result<Response, FrameError> {
        use nom::number::complete::u8 as parse_u8;
        let order = self.profile.byte_order;
        let (payload, code) = parse_u8::<_, ParseError<&[u8]>>(body)
            .finish()
            .map_err(|_| FrameError::Desync)?;
        let resp = match code {
            map::ACK => {
                ensure!(payload.is_empty(), FrameError::Desync);
                Response::Ack
            }
            map::NACK => {
                let (_, reason) = all_consuming(parse_u8::<_, ParseError<&[u8]>>)(payload)
                    .finish()
                    .map_err(|_| FrameError::Desync)?;
                Response::Nack(reason)
            }
            map::STATUS_REPORT => {
                let (_, (position, velocity, fault_flags, busy)) = all_consuming(tuple((
                    int_i32(order),
                    int_i32(order),
                    int_u16(order),
                    busy_flag,
                )))(payload)
                .finish()
                .map_err(|_| FrameError::Desync)?;
                Response::Status(StatusReport {
                    position,
                    velocity,
                    fault_flags,
                    busy,
                })
            }
            map::FAULT => {
                let (_, code) = all_consuming(parse_u8::<_, ParseError<&[u8]>>)(payload)
                    .finish()
                    .map_err(|_| FrameError::Desync)?;
                Response::Error(code)
            }
            map::IDENTITY => Response::Identity(payload.to_vec()),
            _ => return Err(FrameError::Desync),
        };
        Ok(resp)
    }

    // length, checksum and delimiters around a finished body
    fn finish_frame(&self, body: Vec<u8>) -> Result<Vec<u8>, EncodingError> {
        let p = &self.profile;
        ensure!(
            body.len() - 1 <= p.max_payload && body.len() <= p.length_width.max_value(),
            EncodingError::PayloadTooLong(body.len() - 1)
        );
        let mut out = Vec::with_capacity(body.len() + 2 + p.length_width.bytes());
        out.push(p.start_marker);
        match p.length_width {
            LengthWidth::U8 => out.push(body.len() as u8),
            LengthWidth::U16 => self.put_u16(&mut out, body.len() as u16),
        }
        out.extend_from_slice(&body);
        let checksum = p.checksum.compute(&out[1..]);
        out.push(checksum);
        out.push(p.terminator);
        Ok(out)
    }

    fn put_u16(&self, out: &mut Vec<u8>, v: u16) {
        match self.profile.byte_order {
            ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    fn put_u32(&self, out: &mut Vec<u8>, v: u32) {
        match self.profile.byte_order {
            ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    fn put_i32(&self, out: &mut Vec<u8>, v: i32) {
        match self.profile.byte_order {
            ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

//

fn busy_flag(s: &[u8]) -> IResult<&[u8], bool, ParseError<&[u8]>> {
    parse_enum_value(s, nom::number::complete::u8, |b| match b {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    })
}
