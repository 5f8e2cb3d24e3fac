//! Crate-wide error type.
//!
//! One nested variant per layer of the stack (wire codec, UDP transport,
//! serial line, Wi-SUN session, property decoding). Match on the outer
//! `Error` when only the failing layer matters, or drill into the inner
//! enum for the specific case.

pub type Result<T> = std::result::Result<T, Error>;

/// Top level error for the whole crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("frame codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("serial line error: {0}")]
    Serial(#[from] SerialError),

    #[error("wi-sun protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("property decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors raised while parsing or serializing an ECHONET Lite frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("frame is too short ({0} bytes)")]
    TooShort(usize),
    #[error("bad frame header")]
    BadHeader,
    #[error("property length runs past the end of the buffer")]
    BadLength,
}

/// Errors raised by the UDP multicast/unicast transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind socket: {0}")]
    SocketBind(std::io::Error),
    #[error("socket operation timed out")]
    SocketTimeout,
    #[error("fatal socket error: {0}")]
    SocketFatal(std::io::Error),
}

/// Errors raised by the serial line driver.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("failed to open serial port: {0}")]
    Open(#[from] serialport::Error),
    #[error("serial read timed out")]
    Timeout,
    #[error("serial i/o error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for SerialError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            SerialError::Timeout
        } else {
            SerialError::Io(e)
        }
    }
}

/// Errors surfaced by the BP35C2 session state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected line from the module: {0}")]
    UnexpectedEvent(String),
    #[error("PANA join failed (EVENT 24)")]
    JoinFailed,
    #[error("active scan produced no PAN descriptor")]
    NoDescriptor,
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
    #[error("B-route id or password must not be empty")]
    EmptyCredentials,
    #[error("session is not in the Joined state")]
    NotJoined,
}

/// Per-property soft errors raised while decoding a known property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("property {epc:#04x} has invalid length {len}")]
    BadLength { epc: u8, len: u8 },
    #[error("property {epc:#04x} has an invalid value")]
    BadValue { epc: u8 },
}
