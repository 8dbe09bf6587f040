//! Line protocol spoken with the network co-processor.
//!
//! The co-processor owns Wi-Fi association and the HTTP calls. The controller
//! sends one request line and reads back one response line:
//!
//! ```text
//! FETCH   -> STATE <int> | EMPTY | ERR <status>
//! NOTIFY  -> OK | ERR <status>
//! ```
//!
//! Responses are parsed with `winnow` combinators; anything that does not fit
//! the grammar, or does not fit the request it answers, is reported as
//! malformed so the calling task can drop the cycle.

use core::fmt;

use winnow::ascii::{dec_int, dec_uint, space1};
use winnow::combinator::{alt, preceded};
use winnow::prelude::*;

use crate::io::{FetchError, NotifyError};

/// Longest response line accepted from the co-processor (excluding terminator).
pub const MAX_RESPONSE_LEN: usize = 64;

/// UART baud rate of the co-processor link.
pub const LINK_BAUD: u32 = 115_200;

/// Request sent to the co-processor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkRequest {
    /// Read the latest remote armed-state value.
    FetchState,
    /// Post a motion-detected event.
    NotifyMotion,
}

impl LinkRequest {
    /// Wire form of the request, including the line terminator.
    #[must_use]
    pub const fn as_line(self) -> &'static [u8] {
        match self {
            Self::FetchState => b"FETCH\n",
            Self::NotifyMotion => b"NOTIFY\n",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchState => "fetch",
            Self::NotifyMotion => "notify",
        }
    }
}

/// Response line received from the co-processor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkResponse {
    /// Latest field value.
    State(i32),
    /// The feed has no entries.
    Empty,
    /// Notification accepted.
    Ack,
    /// Endpoint returned a non-success HTTP status.
    Status(u16),
}

/// Response line could not be parsed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkError {
    Malformed,
    TooLong,
    InvalidUtf8,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Malformed => f.write_str("malformed response"),
            LinkError::TooLong => write!(f, "response exceeds {MAX_RESPONSE_LEN} bytes"),
            LinkError::InvalidUtf8 => f.write_str("response is not UTF-8"),
        }
    }
}

fn state(input: &mut &str) -> ModalResult<LinkResponse> {
    preceded(("STATE", space1), dec_int)
        .map(LinkResponse::State)
        .parse_next(input)
}

fn status(input: &mut &str) -> ModalResult<LinkResponse> {
    preceded(("ERR", space1), dec_uint)
        .map(LinkResponse::Status)
        .parse_next(input)
}

fn response(input: &mut &str) -> ModalResult<LinkResponse> {
    alt((
        state,
        status,
        "EMPTY".value(LinkResponse::Empty),
        "OK".value(LinkResponse::Ack),
    ))
    .parse_next(input)
}

/// Parses one response line. Trailing `\r`/`\n` and surrounding spaces are ignored.
pub fn parse_response(line: &str) -> Result<LinkResponse, LinkError> {
    let trimmed = line.trim();
    if trimmed.len() > MAX_RESPONSE_LEN {
        return Err(LinkError::TooLong);
    }
    response.parse(trimmed).map_err(|_| LinkError::Malformed)
}

/// Parses raw bytes received from the UART.
pub fn parse_response_bytes(line: &[u8]) -> Result<LinkResponse, LinkError> {
    let text = core::str::from_utf8(line).map_err(|_| LinkError::InvalidUtf8)?;
    parse_response(text)
}

/// Interprets the answer to a [`LinkRequest::FetchState`].
pub fn fetch_result(response: Result<LinkResponse, LinkError>) -> Result<i32, FetchError> {
    match response {
        Ok(LinkResponse::State(value)) => Ok(value),
        Ok(LinkResponse::Empty) => Err(FetchError::NoData),
        Ok(LinkResponse::Status(code)) => Err(FetchError::Status(code)),
        Ok(LinkResponse::Ack) | Err(_) => Err(FetchError::Malformed),
    }
}

/// Interprets the answer to a [`LinkRequest::NotifyMotion`].
///
/// The co-processor only ever answers `OK` or `ERR`; anything else means the
/// link lost sync and is reported as a link failure.
pub fn notify_result(response: Result<LinkResponse, LinkError>) -> Result<(), NotifyError> {
    match response {
        Ok(LinkResponse::Ack) => Ok(()),
        Ok(LinkResponse::Status(code)) => Err(NotifyError::Status(code)),
        Ok(LinkResponse::State(_) | LinkResponse::Empty) | Err(_) => Err(NotifyError::Link),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_lines_are_newline_terminated() {
        assert_eq!(LinkRequest::FetchState.as_line(), b"FETCH\n");
        assert_eq!(LinkRequest::NotifyMotion.as_line(), b"NOTIFY\n");
    }

    #[test]
    fn rejects_oversized_lines() {
        let line = "STATE 00000000000000000000000000000000000000000000000000000000000001";
        assert_eq!(parse_response(line), Err(LinkError::TooLong));
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(
            parse_response_bytes(&[0x53, 0xFF, 0x0A]),
            Err(LinkError::InvalidUtf8)
        );
    }
}
