use super::profile::ByteOrder;
use nom::{
    number::complete::{be_i32, be_u16, le_i32, le_u16},
    IResult,
};
use std::fmt::Debug;
use thiserror::Error;

/// Gets thrown when there is an error while parsing the typed values inside
/// a frame body
#[derive(Error, Debug)]
pub enum ParseError<I: Debug> {
    /// A wire value has no matching enum variant, which usually means the
    /// controller speaks a newer revision of the protocol
    #[error("invalid value while parsing, no matching variant")]
    InvalidValue,
    /// Wrapper around [`nom::error::Error`]
    #[error("nom error: {0:?}")]
    NomError(nom::error::Error<I>),
}

impl<I: Debug> nom::error::ParseError<I> for ParseError<I> {
    fn from_error_kind(input: I, kind: nom::error::ErrorKind) -> Self {
        Self::NomError(nom::error::Error::from_error_kind(input, kind))
    }

    fn append(_: I, _: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I: Debug> From<nom::error::Error<I>> for ParseError<I> {
    fn from(e: nom::error::Error<I>) -> Self {
        Self::NomError(e)
    }
}

// the profile decides the byte order at runtime, so the nom number parsers
// get dispatched through these instead of being named at the call sites

pub(super) fn int_u16<'a, E>(order: ByteOrder) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], u16, E>
where
    E: nom::error::ParseError<&'a [u8]>,
{
    move |s| match order {
        ByteOrder::Big => be_u16(s),
        ByteOrder::Little => le_u16(s),
    }
}

pub(super) fn int_i32<'a, E>(order: ByteOrder) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], i32, E>
where
    E: nom::error::ParseError<&'a [u8]>,
{
    move |s| match order {
        ByteOrder::Big => be_i32(s),
        ByteOrder::Little => le_i32(s),
    }
}

#[inline]
pub(super) fn parse_enum_value<'a, P, C, O, O2>(
    s: &'a [u8],
    parser: P,
    constructor: C,
) -> IResult<&'a [u8], O2, ParseError<&'a [u8]>>
where
    P: Fn(&'a [u8]) -> IResult<&'a [u8], O, nom::error::Error<&'a [u8]>>,
    C: Fn(O) -> Option<O2>,
{
    let (rem, res) = parser(s).map_err(nom::Err::convert)?;
    Ok((
        rem,
        constructor(res).ok_or(nom::Err::Error(ParseError::InvalidValue))?,
    ))
}
