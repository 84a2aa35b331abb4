use core::fmt;

/// Reasons an operation on this stack can fail
///
/// Parsing and dispatch recover locally (the dispatcher drops the offending
/// datagram and keeps looping); registration and send errors propagate to the
/// caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// Malformed message: short header, reserved bit patterns, truncated
    /// option extensions or a stray payload marker
    BadFormat,
    /// Valid CoAP, but outside the non-confirmable subset
    NotSupported,
    /// Request path is not absolute
    InvalidPath,
    /// The message does not fit the provided buffer
    NoSpace,
    /// The listener's port already has a registration
    AlreadyRegistered,
    /// Every port in the ephemeral range is taken
    NoPortAvailable,
    /// The downstream transport refused the datagram
    TransportFailed,
    /// Response token does not match the sender's request
    TokenMismatch,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Error::BadFormat => "malformed message",
            Error::NotSupported => "message type not supported",
            Error::InvalidPath => "path is not absolute",
            Error::NoSpace => "buffer too small",
            Error::AlreadyRegistered => "port already registered",
            Error::NoPortAvailable => "no ephemeral port available",
            Error::TransportFailed => "transport dispatch failed",
            Error::TokenMismatch => "response token mismatch",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
