//! IPv6: Internet Protocol v6
//!
//! # References
//!
//! - [RFC 8200: Internet Protocol, Version 6 (IPv6) Specification][rfc8200]
//! - [RFC 4291: IP Version 6 Addressing Architecture][rfc4291]
//!
//! [rfc8200]: https://tools.ietf.org/html/rfc8200
//! [rfc4291]: https://tools.ietf.org/html/rfc4291

use core::ops::{Range, RangeFrom};
use core::{fmt, u16};

use as_slice::{AsMutSlice, AsSlice};
use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::{u16, usize};
use hash32_derive::Hash32;

use crate::traits::{Resize, UxxExt};
use crate::udp;
use crate::Error;

/// IPv6 address
#[derive(Clone, Copy, Debug, Eq, Hash32, PartialEq)]
pub struct Addr(pub [u8; 16]);

impl Addr {
    // Section 2.5.2
    /// Unspecified address
    pub const UNSPECIFIED: Self = Addr([0; 16]);

    // Section 2.5.3
    /// Loopback address
    pub const LOOPBACK: Self = Addr([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    // Section 2.5.6
    /// Is this a link local address?
    pub fn is_link_local(&self) -> bool {
        self.0[..8] == [0xfe, 0x80, 0, 0, 0, 0, 0, 0]
    }

    /// Is this the loopback address?
    pub fn is_loopback(&self) -> bool {
        *self == Self::LOOPBACK
    }

    // Section 2.7
    /// Is this a multicast address?
    pub fn is_multicast(&self) -> bool {
        self.0[0] == 0xff
    }

    /// Is this the unspecified address?
    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    /// The interface identifier: the low 64 bits of the address
    pub fn interface_id(&self) -> [u8; 8] {
        let mut iid = [0; 8];
        iid.copy_from_slice(&self.0[8..]);
        iid
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut is_first = true;

        for chunk in self.0.chunks(2) {
            if is_first {
                is_first = false;
            } else {
                f.write_str(":")?;
            }

            write!(f, "{:x}", NE::read_u16(chunk))?;
        }

        Ok(())
    }
}

#[cfg(feature = "std")]
impl From<std::net::Ipv6Addr> for Addr {
    fn from(ip: std::net::Ipv6Addr) -> Addr {
        Addr(ip.octets())
    }
}

#[cfg(feature = "std")]
impl From<Addr> for std::net::Ipv6Addr {
    fn from(addr: Addr) -> std::net::Ipv6Addr {
        std::net::Ipv6Addr::from(addr.0)
    }
}

/* Packet structure */
const VERSION_TC_FLOW: Range<usize> = 0..4;
mod version {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: usize = 4;
    pub const SIZE: usize = 4;
}

const PAYLOAD_LENGTH: Range<usize> = 4..6;
const NEXT_HEADER: usize = 6;
const HOP_LIMIT: usize = 7;
const SOURCE: Range<usize> = 8..24;
const DESTINATION: Range<usize> = 24..40;
const PAYLOAD: RangeFrom<usize> = 40..;

/// Size of the IPv6 header
pub const HEADER_SIZE: u16 = PAYLOAD.start as u16;

full_range!(
    u8,
    /// Next Header protocol numbers
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub enum NextHeader {
        /// TCP
        Tcp = 6,
        /// UDP
        Udp = 17,
        /// ICMPv6
        Icmpv6 = 58,
    }
);

/// IPv6 packet
pub struct Packet<BUFFER>
where
    BUFFER: AsSlice<Element = u8>,
{
    buffer: BUFFER,
}

impl<B> Packet<B>
where
    B: AsSlice<Element = u8> + Resize,
{
    /* Constructors */
    /// Parses bytes into an IPv6 packet
    pub fn parse(bytes: B) -> Result<Self, Error> {
        let nbytes = bytes.as_slice().len();
        if nbytes < usize(HEADER_SIZE) {
            return Err(Error::BadFormat);
        }

        let mut packet = Packet { buffer: bytes };

        if packet.get_version() != 6 {
            return Err(Error::BadFormat);
        }

        let total = usize(HEADER_SIZE) + usize(packet.get_payload_length());
        if total > nbytes {
            // the payload length field runs past the end of the input
            return Err(Error::BadFormat);
        }
        packet.buffer.truncate(u16(total).map_err(|_| Error::BadFormat)?);

        Ok(packet)
    }
}

impl<B> Packet<B>
where
    B: AsSlice<Element = u8>,
{
    /* Getters */
    /// Returns the version field of the header
    pub fn get_version(&self) -> u8 {
        get!(self.as_slice()[VERSION_TC_FLOW.start], version)
    }

    /// Returns the Traffic Class field of the header
    pub fn get_traffic_class(&self) -> u8 {
        let s = self.as_slice();
        (s[0] << 4) | (s[1] >> 4)
    }

    /// Returns the Flow Label field of the header
    pub fn get_flow_label(&self) -> u32 {
        let s = self.as_slice();
        (u32::from(s[1] & 0x0f) << 16) | u32::from(NE::read_u16(&s[2..4]))
    }

    /// Returns the Payload Length field of the header
    pub fn get_payload_length(&self) -> u16 {
        NE::read_u16(&self.as_slice()[PAYLOAD_LENGTH])
    }

    /// Returns the Next Header field of the header
    pub fn get_next_header(&self) -> NextHeader {
        self.as_slice()[NEXT_HEADER].into()
    }

    /// Returns the Hop Limit field of the header
    pub fn get_hop_limit(&self) -> u8 {
        self.as_slice()[HOP_LIMIT]
    }

    /// Returns the Source (IP address) field of the header
    pub fn get_source(&self) -> Addr {
        let mut addr = [0; 16];
        addr.copy_from_slice(&self.as_slice()[SOURCE]);
        Addr(addr)
    }

    /// Returns the Destination (IP address) field of the header
    pub fn get_destination(&self) -> Addr {
        let mut addr = [0; 16];
        addr.copy_from_slice(&self.as_slice()[DESTINATION]);
        Addr(addr)
    }

    /// Returns the length (header + data) of this packet
    pub fn len(&self) -> u16 {
        HEADER_SIZE + self.get_payload_length()
    }

    /* Miscellaneous */
    /// View into the payload
    pub fn payload(&self) -> &[u8] {
        &self.as_slice()[PAYLOAD]
    }

    /// Returns the byte representation of this packet
    pub fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }

    /* Private */
    fn as_slice(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}

impl<B> Packet<B>
where
    B: AsSlice<Element = u8> + AsMutSlice<Element = u8>,
{
    /* Setters */
    /// Sets the Next Header field of the header
    pub fn set_next_header(&mut self, nh: NextHeader) {
        self.as_mut_slice()[NEXT_HEADER] = nh.into();
    }

    /// Sets the Hop Limit field of the header
    pub fn set_hop_limit(&mut self, limit: u8) {
        self.as_mut_slice()[HOP_LIMIT] = limit;
    }

    /// Sets the Source (IP address) field of the header
    pub fn set_source(&mut self, addr: Addr) {
        self.as_mut_slice()[SOURCE].copy_from_slice(&addr.0)
    }

    /// Sets the Destination (IP address) field of the header
    pub fn set_destination(&mut self, addr: Addr) {
        self.as_mut_slice()[DESTINATION].copy_from_slice(&addr.0)
    }

    /* Miscellaneous */
    /// Mutable view into the payload
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.as_mut_slice()[PAYLOAD]
    }

    /* Private */
    fn set_version(&mut self, ver: u8) {
        set!(self.as_mut_slice()[VERSION_TC_FLOW.start], version, ver);
    }

    fn set_traffic_class(&mut self, tc: u8) {
        let s = self.as_mut_slice();
        s[0] = (s[0] & 0xf0) | (tc >> 4);
        s[1] = (s[1] & 0x0f) | (tc << 4);
    }

    fn set_flow_label(&mut self, flow: u32) {
        let s = self.as_mut_slice();
        s[1] = (s[1] & 0xf0) | (flow.high() as u8 & 0x0f);
        NE::write_u16(&mut s[2..4], flow.low());
    }

    unsafe fn set_payload_length(&mut self, len: u16) {
        NE::write_u16(&mut self.as_mut_slice()[PAYLOAD_LENGTH], len)
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }
}

impl<B> Packet<B>
where
    B: AsSlice<Element = u8> + AsMutSlice<Element = u8> + Resize,
{
    /* Constructors */
    /// Transforms the given buffer into an IPv6 packet
    ///
    /// Most of the header will be filled with sensible defaults:
    ///
    /// - Version = 6
    /// - Traffic Class = 0
    /// - Flow Label = 0
    /// - Payload Length = `buffer.len() - 40`
    /// - Hop Limit = 64
    ///
    /// The fields that are left unpopulated are:
    ///
    /// - Next Header
    /// - Source (the unspecified address, for the network stack to fill in)
    /// - Destination
    ///
    /// # Panics
    ///
    /// This constructor panics if the given `buffer` is smaller than `HEADER_SIZE`
    pub fn new(mut buffer: B) -> Self {
        assert!(buffer.as_slice().len() >= usize(HEADER_SIZE));

        let len = u16(buffer.as_slice().len()).unwrap_or(u16::MAX);
        buffer.truncate(len);
        let mut packet = Packet { buffer };

        packet.set_version(6);
        packet.set_traffic_class(0);
        packet.set_flow_label(0);
        unsafe { packet.set_payload_length(len - HEADER_SIZE) }
        packet.set_hop_limit(64); // the common default

        packet.set_source(Addr::UNSPECIFIED);

        // next header: unpopulated

        // destination: unpopulated

        packet
    }

    /// Fills the payload with an UDP packet
    pub fn udp<F>(&mut self, f: F)
    where
        F: FnOnce(&mut udp::Packet<&mut [u8]>),
    {
        self.set_next_header(NextHeader::Udp);
        let len = {
            let mut udp = udp::Packet::new(self.payload_mut());
            f(&mut udp);
            udp.len()
        };
        self.truncate(len);
    }

    /// Truncates the *payload* to the specified length
    pub fn truncate(&mut self, len: u16) {
        if self.get_payload_length() > len {
            unsafe { self.set_payload_length(len) }
            self.buffer.truncate(HEADER_SIZE + len);
        }
    }

    /* Miscellaneous */
    /// Returns the payload of this packet
    pub fn into_payload(self) -> B {
        let mut buffer = self.buffer;
        buffer.slice_from(HEADER_SIZE);
        buffer
    }
}

impl<B> fmt::Debug for Packet<B>
where
    B: AsSlice<Element = u8>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ipv6::Packet")
            .field("version", &self.get_version())
            .field("payload_length", &self.get_payload_length())
            .field("next_header", &self.get_next_header())
            .field("hop_limit", &self.get_hop_limit())
            .field("source", &crate::fmt::Display(self.get_source()))
            .field("destination", &crate::fmt::Display(self.get_destination()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::RngCore;

    use crate::{ipv6, udp};

    #[test]
    fn construct() {
        // NOTE start with randomized array to make sure we set *everything* correctly
        let mut array = [0; 62];
        rand::thread_rng().fill_bytes(&mut array);

        let mut ip = ipv6::Packet::new(&mut array[..]);
        ip.set_source(ipv6::Addr::UNSPECIFIED);
        ip.set_destination(ipv6::Addr::LOOPBACK);

        ip.udp(|udp| {
            udp.set_source(20000);
            udp.set_destination(5683);
            udp.set_payload(b"Hello, world!\n");
        });

        assert_eq!(ip.len(), 62);
        assert_eq!(ip.get_version(), 6);
        assert_eq!(ip.get_traffic_class(), 0);
        assert_eq!(ip.get_flow_label(), 0);
        assert_eq!(ip.get_next_header(), ipv6::NextHeader::Udp);

        let parsed = ipv6::Packet::parse(ip.as_bytes()).unwrap();
        assert_eq!(parsed.get_source(), ipv6::Addr::UNSPECIFIED);
        assert_eq!(parsed.get_destination(), ipv6::Addr::LOOPBACK);

        let udp = udp::Packet::parse(parsed.payload()).unwrap();
        assert_eq!(udp.get_source(), 20000);
        assert_eq!(udp.get_destination(), 5683);
        assert_eq!(udp.payload(), b"Hello, world!\n");
    }

    #[test]
    fn display() {
        assert_eq!(ipv6::Addr::LOOPBACK.to_string(), "0:0:0:0:0:0:0:1");
    }

    #[test]
    fn interface_id() {
        let addr = ipv6::Addr([
            0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0xec, 0x0b, 0xfb, 0x0f, 0x76, 0xb9, 0xf3, 0x93,
        ]);

        assert!(addr.is_link_local());
        assert_eq!(
            addr.interface_id(),
            [0xec, 0x0b, 0xfb, 0x0f, 0x76, 0xb9, 0xf3, 0x93]
        );
    }
}
