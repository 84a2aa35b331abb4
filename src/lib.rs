//! µCoAP: a minimal CoAP (RFC 7252) stack for constrained devices
//!
//! Only non-confirmable (NON) request/response exchanges over UDP/IPv6 are
//! supported: no retransmission, no observe, no block-wise transfer and no
//! proxying. What *is* here is split in two layers:
//!
//! - An allocation-free wire codec ([`coap::Message`]) plus an ordered
//!   endpoint table ([`endpoint`]) and a two-stage response builder
//!   ([`reply`]). These work on plain byte buffers and run fine without
//!   `std`.
//!
//! - A message-loop stack ([`stack`], behind the default `std` feature): a
//!   dispatcher thread that demultiplexes inbound datagrams to listeners by
//!   UDP destination port, so a client's responses are matched by its
//!   ephemeral source port rather than by token alone.
//!
//! The general principle to building messages is to start with a (slightly)
//! oversized buffer and then shrink it to the right length:
//!
//! ```
//! use ucoap::{coap, ipv6, xfer};
//!
//! const DST: ipv6::Addr = ipv6::Addr::LOOPBACK;
//!
//! let mut bytes = [0; 128];
//!
//! // clean slate IPv6 packet spanning the whole buffer
//! let mut ip = ipv6::Packet::new(&mut bytes[..]);
//! ip.set_destination(DST);
//!
//! let meta = xfer::Meta {
//!     msg_type: coap::Type::NonConfirmable,
//!     code: coap::Method::Put.into(),
//!     message_id: 1,
//!     token: xfer::Token::EMPTY,
//! };
//! let xfer = xfer::Transfer::new("/led").with_payload(b"on", coap::ContentFormat::TextPlain);
//!
//! ip.udp(|udp| {
//!     udp.set_destination(coap::PORT);
//!     udp.coap(&meta, &xfer).unwrap();
//! });
//!
//! // at this point the packet has shrunk to the size of its contents;
//! // the excess memory is inaccessible
//! assert_eq!(ip.len(), 40 + 8 + 4 + 4 + 1 + 1 + 2);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

#[macro_use]
mod macros;

mod buf;
mod error;
mod fmt;
mod traits;

pub use crate::buf::Buffer;
pub use crate::error::Error;
pub use crate::traits::Resize;

// Network layer
pub mod ipv6;

// Transport layer
pub mod udp;

// Application layer
pub mod coap;
pub mod endpoint;
pub mod reply;
pub mod xfer;

// Secure transport adapter
pub mod dtls;

// Message-loop stack
#[cfg(feature = "std")]
pub mod nethead;
#[cfg(feature = "std")]
pub mod stack;
