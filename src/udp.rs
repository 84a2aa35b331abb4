//! UDP: User Datagram Protocol

use core::ops::{Range, RangeFrom};
use core::{fmt, u16};

use as_slice::{AsMutSlice, AsSlice};
use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::{u16, usize};

use crate::traits::Resize;
use crate::xfer::{self, Meta, Transfer};
use crate::Error;

/* Packet structure */
const SOURCE: Range<usize> = 0..2;
const DESTINATION: Range<usize> = 2..4;
const LENGTH: Range<usize> = 4..6;
const CHECKSUM: Range<usize> = 6..8;
const PAYLOAD: RangeFrom<usize> = 8..;

/// Size of the UDP header
pub const HEADER_SIZE: u16 = PAYLOAD.start as u16;

/// UDP packet
pub struct Packet<BUFFER>
where
    BUFFER: AsSlice<Element = u8>,
{
    buffer: BUFFER,
}

impl<B> Packet<B>
where
    B: AsSlice<Element = u8>,
{
    /* Constructors */
    /// Parses the bytes as an UDP packet
    pub fn parse(bytes: B) -> Result<Self, Error> {
        let nbytes = bytes.as_slice().len();
        if nbytes < usize(HEADER_SIZE) {
            return Err(Error::BadFormat);
        }

        let packet = Packet { buffer: bytes };
        let len = packet.get_length();

        if len < HEADER_SIZE || usize(len) > nbytes {
            Err(Error::BadFormat)
        } else {
            Ok(packet)
        }
    }

    /* Getters */
    /// Returns the Source (port) field of the header
    pub fn get_source(&self) -> u16 {
        NE::read_u16(&self.as_slice()[SOURCE])
    }

    /// Returns the Destination (port) field of the header
    pub fn get_destination(&self) -> u16 {
        NE::read_u16(&self.as_slice()[DESTINATION])
    }

    /// Returns the Length field of the header
    pub fn get_length(&self) -> u16 {
        NE::read_u16(&self.as_slice()[LENGTH])
    }

    fn get_checksum(&self) -> u16 {
        NE::read_u16(&self.as_slice()[CHECKSUM])
    }

    /// Returns the length (header + data) of this packet
    pub fn len(&self) -> u16 {
        self.get_length()
    }

    /* Miscellaneous */
    /// View into the payload
    pub fn payload(&self) -> &[u8] {
        &self.as_slice()[PAYLOAD]
    }

    /// Returns the byte representation of this UDP packet
    pub fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }

    /* Private */
    fn as_slice(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    fn payload_len(&self) -> u16 {
        self.get_length() - HEADER_SIZE
    }
}

impl<B> Packet<B>
where
    B: AsSlice<Element = u8> + AsMutSlice<Element = u8>,
{
    /* Setters */
    /// Sets the Source (port) field of the header
    pub fn set_source(&mut self, port: u16) {
        NE::write_u16(&mut self.as_mut_slice()[SOURCE], port)
    }

    /// Sets the Destination (port) field of the header
    pub fn set_destination(&mut self, port: u16) {
        NE::write_u16(&mut self.as_mut_slice()[DESTINATION], port)
    }

    unsafe fn set_length(&mut self, len: u16) {
        NE::write_u16(&mut self.as_mut_slice()[LENGTH], len)
    }

    /// Zeroes the Checksum field of the header
    pub fn zero_checksum(&mut self) {
        self.set_checksum(0);
    }

    fn set_checksum(&mut self, checksum: u16) {
        NE::write_u16(&mut self.as_mut_slice()[CHECKSUM], checksum)
    }

    /* Miscellaneous */
    /// Mutable view into the payload
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.as_mut_slice()[PAYLOAD]
    }

    /* Private */
    fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }
}

impl<B> Packet<B>
where
    B: AsSlice<Element = u8> + AsMutSlice<Element = u8> + Resize,
{
    /* Constructors */
    /// Transforms the given buffer into an UDP packet
    ///
    /// NOTE The UDP packet will span the whole buffer and the Checksum field will be zeroed.
    ///
    /// # Panics
    ///
    /// This constructor panics if the given `buffer` is not large enough to contain the UDP header.
    pub fn new(mut buffer: B) -> Self {
        assert!(buffer.as_slice().len() >= usize(HEADER_SIZE));

        let len = u16(buffer.as_slice().len()).unwrap_or(u16::MAX);
        buffer.truncate(len);
        let mut packet = Packet { buffer };

        packet.set_checksum(0);
        unsafe { packet.set_length(len) }

        packet
    }

    /* Setters */
    /// Fills the payload with the given data and adjusts the length of the UDP packet
    pub fn set_payload(&mut self, data: &[u8]) {
        let len = u16(data.len()).unwrap();
        assert!(self.payload_len() >= len);

        self.truncate(len);
        self.payload_mut().copy_from_slice(data);
    }

    /* Miscellaneous */
    /// Fills the payload with a CoAP message carrying `xfer`
    pub fn coap(&mut self, meta: &Meta, xfer: &Transfer<'_>) -> Result<(), Error> {
        let len = {
            let m = xfer::emit(self.payload_mut(), meta, xfer)?;
            m.len()
        };
        self.truncate(len);
        Ok(())
    }

    /// Truncates the *payload* to the specified length
    pub fn truncate(&mut self, len: u16) {
        if len < self.payload_len() {
            let total_len = len + HEADER_SIZE;
            self.buffer.truncate(total_len);
            unsafe { self.set_length(total_len) }
        }
    }
}

/// NOTE excludes the payload
impl<B> fmt::Debug for Packet<B>
where
    B: AsSlice<Element = u8>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("udp::Packet")
            .field("source", &self.get_source())
            .field("destination", &self.get_destination())
            .field("length", &self.get_length())
            .field("checksum", &self.get_checksum())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::RngCore;

    use crate::{coap, udp, xfer, Buffer};

    const MESSAGE: &[u8] = b"Hello, world!\n";

    #[test]
    fn construct() {
        // NOTE start with randomized array to make sure we set *everything* correctly
        let mut array = [0; 22];
        rand::thread_rng().fill_bytes(&mut array);

        let mut udp = udp::Packet::new(Buffer::new(&mut array));
        udp.set_source(coap::PORT);
        udp.set_destination(1337);
        udp.set_payload(MESSAGE);

        assert_eq!(udp.get_length(), 22);

        let parsed = udp::Packet::parse(udp.as_bytes()).unwrap();
        assert_eq!(parsed.get_source(), coap::PORT);
        assert_eq!(parsed.get_destination(), 1337);
        assert_eq!(parsed.payload(), MESSAGE);
    }

    #[test]
    fn new() {
        const SZ: u16 = 128;

        let mut chunk = [0; SZ as usize];
        let buf = Buffer::new(&mut chunk);

        let udp = udp::Packet::new(buf);
        assert_eq!(udp.len(), SZ);
        assert_eq!(udp.get_length(), SZ);
    }

    #[test]
    fn coap_payload() {
        let mut buf = [0; 128];

        let mut udp = udp::Packet::new(&mut buf[..]);
        udp.set_source(20000);
        udp.set_destination(coap::PORT);

        let meta = xfer::Meta {
            msg_type: coap::Type::NonConfirmable,
            code: coap::Method::Get.into(),
            message_id: 7,
            token: xfer::Token::EMPTY,
        };
        udp.coap(&meta, &xfer::Transfer::new("/cli/stats")).unwrap();

        // header + "cli" + "stats" options
        assert_eq!(udp.len(), 8 + 4 + 4 + 6);

        let coap = coap::Message::parse(udp.payload()).unwrap();
        assert_eq!(coap.get_message_id(), 7);
        assert_eq!(coap.options().count(), 2);
    }
}
