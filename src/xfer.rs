//! Resource transfers
//!
//! A [`Transfer`] describes one resource representation moving between hosts: the path it lives
//! at, the payload bytes and their media format. [`Meta`] carries the message bookkeeping (type,
//! code, message ID, token) that a sender needs to match a response to its request.
//!
//! On the way out the path is a literal string supplied by the caller; on the way in it is a
//! cursor into the parsed option stream of the received buffer, so nothing is copied.

use core::cmp::Ordering;
use core::option::Option as CoreOption;

use as_slice::{AsMutSlice, AsSlice};
use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::{u16, usize};

use crate::coap::{self, ContentFormat, OptionNumber, Options, OFFSET16, OFFSET8};
use crate::traits::Resize;
use crate::Error;

/// Opaque correlator between a request and its response
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Token {
    bytes: [u8; coap::MAX_TOKEN_LENGTH as usize],
    len: u8,
}

impl Token {
    /// The zero-length token
    pub const EMPTY: Token = Token {
        bytes: [0; coap::MAX_TOKEN_LENGTH as usize],
        len: 0,
    };

    /// Creates a token from its byte representation
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than 8 bytes
    pub fn new(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= usize(coap::MAX_TOKEN_LENGTH));

        let mut token = Token::EMPTY;
        token.bytes[..bytes.len()].copy_from_slice(bytes);
        token.len = bytes.len() as u8;
        token
    }

    /// The token bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize(self.len)]
    }

    /// Length of the token, `0..=8`
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Is this the zero-length token?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Message metadata a sender tracks to match the response
#[derive(Clone, Debug)]
pub struct Meta {
    /// Message type; only `NonConfirmable` is ever sent
    pub msg_type: coap::Type,
    /// Method for a request, response code for a response
    pub code: coap::Code,
    /// Message ID
    pub message_id: u16,
    /// Conversation token
    pub token: Token,
}

/// Where a transfer's path comes from
#[derive(Clone)]
pub enum Path<'a> {
    /// A full `/`-prefixed path provided by the caller
    Literal(&'a str),
    /// The Uri-Path options of a parsed message
    Options(Options<'a>),
}

/// A resource transfer to or from some host
#[derive(Clone)]
pub struct Transfer<'a> {
    /// Path to the resource
    pub path: Path<'a>,
    /// The resource representation
    pub payload: &'a [u8],
    /// Format of the payload; `None` when there is no payload to describe
    pub format: CoreOption<ContentFormat>,
}

impl<'a> Transfer<'a> {
    /// A transfer of the resource at `path` with no payload
    pub fn new(path: &'a str) -> Self {
        Transfer {
            path: Path::Literal(path),
            payload: &[],
            format: None,
        }
    }

    /// Attaches a payload and its media format
    pub fn with_payload(self, payload: &'a [u8], format: ContentFormat) -> Self {
        Transfer {
            payload,
            format: Some(format),
            ..self
        }
    }

    /// Builds the transfer view of a parsed message
    ///
    /// The path points into the message's option stream; the payload is borrowed in place.
    pub fn from_message<B>(msg: &'a coap::Message<B>) -> Result<Self, Error>
    where
        B: AsSlice<Element = u8>,
    {
        Ok(Transfer {
            path: Path::Options(msg.options()),
            payload: msg.payload(),
            format: msg.content_format()?,
        })
    }

    /// Number of bytes the options of this transfer occupy on the wire
    ///
    /// This is the sizing pass of the emitter; it fails with [`Error::InvalidPath`] exactly when
    /// [`emit`] would.
    pub fn options_len(&self) -> Result<u16, Error> {
        let p = match &self.path {
            Path::Literal(p) => *p,
            // only caller-provided paths can be emitted
            Path::Options(_) => return Err(Error::InvalidPath),
        };
        if !p.starts_with('/') {
            return Err(Error::InvalidPath);
        }

        let mut len = 0;
        let mut last_number = 0;
        for seg in segments(p) {
            let delta = u16::from(OptionNumber::UriPath) - last_number;
            let seglen = u16(seg.len()).map_err(|_| Error::InvalidPath)?;
            len += 1 + nbytes(delta) + nbytes(seglen) + seglen;
            last_number = OptionNumber::UriPath.into();
        }

        if !self.payload.is_empty() {
            if let Some(format) = self.format {
                let value = u16::from(format);
                len += 1; // option header; the delta always fits the nibble
                if value > 0 {
                    len += if value <= 0xff { 1 } else { 2 };
                }
            }
        }

        Ok(len)
    }
}

/// Number of extension bytes required to encode `x` in an option header
fn nbytes(x: u16) -> u16 {
    if x < OFFSET8 {
        0 // this fits in a nibble
    } else if x < OFFSET16 {
        1
    } else {
        2
    }
}

/// The non-empty `/`-separated segments of a path
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Emits a message carrying `xfer` into `buffer`
///
/// The emitter first sizes the options ([`Transfer::options_len`]), then writes header, token,
/// one Uri-Path option per path segment, the Content-Format option (only when a payload is
/// present; zero-length value for text), the payload marker and the payload. The message shrinks
/// the buffer to its final length.
///
/// Fails with [`Error::InvalidPath`] when the path is not absolute and with [`Error::NoSpace`]
/// when the message does not fit `buffer`.
pub fn emit<B>(buffer: B, meta: &Meta, xfer: &Transfer<'_>) -> Result<coap::Message<B>, Error>
where
    B: AsSlice<Element = u8> + AsMutSlice<Element = u8> + Resize,
{
    let optslen = xfer.options_len()?;

    // the marker byte is needed during construction even when the final message won't carry one
    let required = usize(coap::HEADER_SIZE)
        + usize(meta.token.len())
        + usize(optslen)
        + 1
        + xfer.payload.len();
    if buffer.as_slice().len() < required {
        return Err(Error::NoSpace);
    }

    let mut m = coap::Message::new(buffer, meta.token.len());
    m.set_type(meta.msg_type);
    m.set_code(meta.code);
    m.set_message_id(meta.message_id);
    m.token_mut().copy_from_slice(meta.token.as_slice());

    if let Path::Literal(p) = &xfer.path {
        for seg in segments(p) {
            m.add_option(OptionNumber::UriPath, seg.as_bytes());
        }
    }

    if !xfer.payload.is_empty() {
        if let Some(format) = xfer.format {
            let value = u16::from(format);
            if value == 0 {
                m.add_option(OptionNumber::ContentFormat, &[]);
            } else if value <= 0xff {
                m.add_option(OptionNumber::ContentFormat, &[value as u8]);
            } else {
                let mut bytes = [0; 2];
                NE::write_u16(&mut bytes, value);
                m.add_option(OptionNumber::ContentFormat, &bytes);
            }
        }
    }

    m.set_payload(xfer.payload);

    Ok(m)
}

/// Compares a transfer's path against an endpoint path
///
/// Returns the ordering of the request path relative to `endpoint`: `Equal` iff all bytes match
/// and both paths end together. For an option-sourced path the comparison walks the Uri-Path
/// options, synthesizing a `/` before each segment; a message without Uri-Path options compares
/// as `"/"`.
pub fn path_cmp(path: &Path<'_>, endpoint: &str) -> Ordering {
    let e = endpoint.as_bytes();

    let opts = match path {
        Path::Literal(p) => return p.as_bytes().cmp(e),
        Path::Options(opts) => opts.clone(),
    };

    let mut pos = 0;
    for opt in opts {
        match opt.number() {
            OptionNumber::UriPath => {
                if pos >= e.len() {
                    // request continues past the endpoint path
                    return Ordering::Greater;
                }
                match b'/'.cmp(&e[pos]) {
                    Ordering::Equal => pos += 1,
                    other => return other,
                }
                for &byte in opt.value() {
                    if pos >= e.len() {
                        return Ordering::Greater;
                    }
                    match byte.cmp(&e[pos]) {
                        Ordering::Equal => pos += 1,
                        other => return other,
                    }
                }
            }
            n if u16::from(n) > u16::from(OptionNumber::UriPath) => break,
            _ => continue,
        }
    }

    if pos == 0 {
        // no Uri-Path options: the request names the root
        return (&b"/"[..]).cmp(e);
    }

    if pos == e.len() {
        Ordering::Equal
    } else {
        Ordering::Less
    }
}
