//! CoAP: Constrained Application Protocol
//!
//! # References
//!
//! - [RFC 7252: The Constrained Application Protocol (CoAP)][rfc]
//!
//! [rfc]: https://tools.ietf.org/html/rfc7252

use core::convert::TryFrom;
use core::ops::Range;
use core::option::Option as CoreOption;
use core::{fmt, str, u16};

use as_slice::{AsMutSlice, AsSlice};
use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::{u16, u8, usize};

use crate::traits::Resize;
use crate::Error;

/// CoAP default UDP port
pub const PORT: u16 = 5683;

/// Maximum length of a message token
pub const MAX_TOKEN_LENGTH: u8 = 8;

/* Message format */
const VER_T_TKL: usize = 0;
mod tkl {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = 0;
    pub const SIZE: u8 = 4;
}

mod t {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = super::tkl::OFFSET + super::tkl::SIZE;
    pub const SIZE: u8 = 2;
}

mod ver {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = super::t::OFFSET + super::t::SIZE;
    pub const SIZE: u8 = 2;
}

const CODE: usize = 1;
const MESSAGE_ID: Range<usize> = 2..4;
const TOKEN_START: usize = MESSAGE_ID.end;

// Option header
mod length {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = 0;
    pub const SIZE: u8 = 4;
}

mod delta {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = super::length::OFFSET + super::length::SIZE;
    pub const SIZE: u8 = 4;
}

/// Size of a CoAP header
pub const HEADER_SIZE: u16 = MESSAGE_ID.end as u16;

/* Option parsing */
// This marks the end of the options
pub(crate) const PAYLOAD_MARKER: u8 = 0xff;

// The option delta and option length nibbles can never be this value
const RESERVED: u8 = 0b1111;

// Offset to add to the option delta / length when they are larger than a nibble
pub(crate) const OFFSET8: u16 = 13;
pub(crate) const OFFSET16: u16 = 269;

// Option delta is an 8-bit unsigned integer
const DELTA8: u8 = 13;

// Option delta is a 16-bit unsigned integer
const DELTA16: u8 = 14;

// Option length is an 8-bit unsigned integer
const LENGTH8: u8 = 13;

// Option length is a 16-bit unsigned integer
const LENGTH16: u8 = 14;

/// CoAP (version 1) message
// NOTE Invariants
// - Options are always valid. For example, this means that the reserved bit pattern (0b1111)
//   doesn't appear in the Option Length nibble. It also means that options are not truncated.
// - `payload_marker` indexes the `PAYLOAD_MARKER` byte; an index outside the buffer indicates
//   that the message has no payload and carries no marker.
pub struct Message<BUFFER>
where
    BUFFER: AsSlice<Element = u8>,
{
    buffer: BUFFER,
    // Position of the `PAYLOAD_MARKER`. Cached to avoid traversing the options (O(N) runtime)
    // when the payload is requested.
    payload_marker: u16,
    /// Highest option number stored in the Options field
    number: u16,
}

impl<B> Message<B>
where
    B: AsSlice<Element = u8>,
{
    /// Parses bytes into a CoAP message
    ///
    /// Only the non-confirmable subset is accepted: CON, ACK and RST messages fail with
    /// [`Error::NotSupported`]. Structural problems fail with [`Error::BadFormat`]: an input
    /// shorter than the fixed header, a version other than 1, a token length over 8, truncated
    /// option extensions, a reserved nibble outside the full `0xFF` payload marker, or a marker
    /// with nothing after it.
    pub fn parse(bytes: B) -> Result<Self, Error> {
        let len = bytes.as_slice().len();

        if len < usize(HEADER_SIZE) || len > usize(u16::MAX) {
            return Err(Error::BadFormat);
        }

        let m = unsafe { Message::unchecked(bytes) };

        if m.get_version() != 1 {
            return Err(Error::BadFormat);
        }
        if m.get_type() != Type::NonConfirmable {
            return Err(Error::NotSupported);
        }

        let tkl = m.get_token_length();
        if tkl > MAX_TOKEN_LENGTH {
            return Err(Error::BadFormat);
        }

        let opts_start = HEADER_SIZE + u16(tkl);
        if len < usize(opts_start) {
            return Err(Error::BadFormat);
        }

        let (number, cursor) = scan(&m.as_slice()[usize(opts_start)..])?;

        Ok(Message {
            number,
            payload_marker: opts_start + cursor,
            ..m
        })
    }

    /* Getters */
    /// Returns the Version field of the header
    ///
    /// As per RFC 7252 a parsed message always returns 1
    pub fn get_version(&self) -> u8 {
        get!(self.as_slice()[VER_T_TKL], ver)
    }

    /// Returns the Type field of the header
    pub fn get_type(&self) -> Type {
        Type::from(get!(self.as_slice()[VER_T_TKL], t))
    }

    /// Returns the Token Length (TKL) field of the header
    pub fn get_token_length(&self) -> u8 {
        get!(self.as_slice()[VER_T_TKL], tkl)
    }

    /// Returns the Code field of the header
    pub fn get_code(&self) -> Code {
        Code(self.as_slice()[CODE])
    }

    /// Returns the Message ID field of the header
    pub fn get_message_id(&self) -> u16 {
        NE::read_u16(&self.as_slice()[MESSAGE_ID])
    }

    /// View into the Token field of the header
    pub fn token(&self) -> &[u8] {
        let start = TOKEN_START;
        let end = start + self.get_token_length() as usize;
        &self.as_slice()[start..end]
    }

    /// Returns an iterator over the options of this message
    pub fn options(&self) -> Options<'_> {
        let end = core::cmp::min(usize(self.payload_marker), self.as_slice().len());
        Options {
            number: 0,
            ptr: &self.as_slice()[usize(self.options_start())..end],
        }
    }

    /// Returns the Content-Format option of this message, if any
    ///
    /// Fails with [`Error::BadFormat`] when the option value is longer than two bytes.
    pub fn content_format(&self) -> Result<CoreOption<ContentFormat>, Error> {
        for opt in self.options() {
            if let OptionNumber::ContentFormat = opt.number() {
                let value = opt.value();
                return match value.len() {
                    0 => Ok(Some(ContentFormat::TextPlain)),
                    1 => Ok(Some(ContentFormat::from(u16(value[0])))),
                    2 => Ok(Some(ContentFormat::from(NE::read_u16(value)))),
                    _ => Err(Error::BadFormat),
                };
            }
        }
        Ok(None)
    }

    /// Writes the Uri-Path of this message into `scratch` and returns it as a string
    ///
    /// Each Uri-Path option becomes one `/`-prefixed segment; a message without Uri-Path options
    /// reads as `"/"`. Fails with [`Error::NoSpace`] when the path doesn't fit `scratch` and with
    /// [`Error::BadFormat`] when a segment is not UTF-8.
    pub fn read_path<'s>(&self, scratch: &'s mut [u8]) -> Result<&'s str, Error> {
        let mut pos = 0;
        for opt in self.options() {
            if let OptionNumber::UriPath = opt.number() {
                let value = opt.value();
                if pos + 1 + value.len() > scratch.len() {
                    return Err(Error::NoSpace);
                }
                scratch[pos] = b'/';
                pos += 1;
                scratch[pos..pos + value.len()].copy_from_slice(value);
                pos += value.len();
            }
        }
        if pos == 0 {
            if scratch.is_empty() {
                return Err(Error::NoSpace);
            }
            scratch[0] = b'/';
            pos = 1;
        }
        str::from_utf8(&scratch[..pos]).map_err(|_| Error::BadFormat)
    }

    /// View into the payload
    pub fn payload(&self) -> &[u8] {
        if usize(self.payload_marker) >= self.as_slice().len() {
            &[]
        } else {
            &self.as_slice()[usize(self.payload_marker + 1)..]
        }
    }

    /// Returns the length (header + data) of the CoAP message
    pub fn len(&self) -> u16 {
        u16(self.as_bytes().len()).unwrap()
    }

    /// Returns the byte representation of this message
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /* Private */
    fn as_slice(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Returns the index at which the options start
    fn options_start(&self) -> u16 {
        HEADER_SIZE + u16(self.get_token_length())
    }

    fn payload_len(&self) -> u16 {
        let payload_marker = usize(self.payload_marker);

        if self.as_slice().len() <= payload_marker {
            return 0;
        }

        // sanity check
        debug_assert_eq!(self.as_slice()[payload_marker], PAYLOAD_MARKER);

        u16(self.as_slice().len() - payload_marker - 1).unwrap()
    }

    unsafe fn unchecked(buffer: B) -> Self {
        Message {
            buffer,
            payload_marker: 0,
            number: 0,
        }
    }
}

// Scans the slice for options
//
// Returns the highest option number and the index of the `PAYLOAD_MARKER` (the input length when
// there is none)
fn scan(bytes: &[u8]) -> Result<(u16, u16), Error> {
    let len = bytes.len();
    let mut cursor = 0;
    let mut number: u16 = 0;

    loop {
        let head = match bytes.get(cursor) {
            Some(b) => *b,
            None => break,
        };

        if head == PAYLOAD_MARKER {
            if cursor + 1 >= len {
                // a marker must be followed by a non-empty payload
                return Err(Error::BadFormat);
            }
            break;
        }
        cursor += 1;

        let delta4 = get!(head, delta);
        let len4 = get!(head, length);

        let delta = if delta4 == DELTA8 {
            let byte = *bytes.get(cursor).ok_or(Error::BadFormat)?;
            cursor += 1;

            u16(byte) + OFFSET8
        } else if delta4 == DELTA16 {
            if cursor + 2 > len {
                return Err(Error::BadFormat);
            }
            let halfword = NE::read_u16(&bytes[cursor..cursor + 2]);
            cursor += 2;

            halfword.checked_add(OFFSET16).ok_or(Error::BadFormat)?
        } else if delta4 == RESERVED {
            return Err(Error::BadFormat);
        } else {
            u16(delta4)
        };
        number = number.checked_add(delta).ok_or(Error::BadFormat)?;

        let value_len = if len4 == LENGTH8 {
            let byte = *bytes.get(cursor).ok_or(Error::BadFormat)?;
            cursor += 1;

            usize(byte) + usize(OFFSET8)
        } else if len4 == LENGTH16 {
            if cursor + 2 > len {
                return Err(Error::BadFormat);
            }
            let halfword = NE::read_u16(&bytes[cursor..cursor + 2]);
            cursor += 2;

            usize(halfword) + usize(OFFSET16)
        } else if len4 == RESERVED {
            return Err(Error::BadFormat);
        } else {
            usize(len4)
        };

        cursor += value_len;
        if cursor > len {
            return Err(Error::BadFormat);
        }
    }

    Ok((number, u16(cursor).map_err(|_| Error::BadFormat)?))
}

impl<B> Message<B>
where
    B: AsSlice<Element = u8> + AsMutSlice<Element = u8>,
{
    /* Constructors */
    /// Transforms the given buffer into a CoAP message
    ///
    /// This constructor sets the following header fields
    ///
    /// - Version = 1
    /// - Token Length = token_length
    ///
    /// NOTE The CoAP message will span the whole buffer.
    ///
    /// # Panics
    ///
    /// This constructor panics if
    ///
    /// - `token_length` is NOT in the range `0..=8`.
    /// - The buffer is not large enough to contain the CoAP header, token and payload marker
    pub fn new(buffer: B, token_length: u8) -> Self {
        assert!(token_length <= MAX_TOKEN_LENGTH);
        let len = buffer.as_slice().len();
        let payload_marker = HEADER_SIZE + u16(token_length);
        assert!(len >= usize(payload_marker) + 1 /* PAYLOAD_MARKER */);

        unsafe {
            let mut m = Message::unchecked(buffer);
            m.set_version(1);
            m.set_token_length(token_length);
            m.as_mut_slice()[usize(payload_marker)] = PAYLOAD_MARKER;
            m.payload_marker = payload_marker;
            m
        }
    }

    /* Setters */
    /// Adds an option to this message
    ///
    /// *HEADS UP* This method will cause the first bytes of the payload to be lost
    ///
    /// # Panics
    ///
    /// This method panics
    ///
    /// - if `number` is smaller than the highest option number already contained in the message
    /// - if there's no space in the message to add the option
    pub fn add_option(&mut self, number: OptionNumber, value: &[u8]) {
        /// Number of bytes required to encode `x`
        fn nbytes(x: u16) -> u16 {
            if x < OFFSET8 {
                0 // this fits in a nibble
            } else if x < OFFSET16 {
                1
            } else {
                2
            }
        }

        // we can only add options that have an equal or a higher option number
        let nr: u16 = number.into();
        let delta = nr.checked_sub(self.number).unwrap();

        // encoding this option uses up bytes from the payload; this assert ensures we don't go
        // beyond the boundary of the payload
        let len = u16(value.len()).unwrap();
        let sz = 1 + nbytes(delta) + nbytes(len) + len;
        assert!(self.payload().len() >= usize(sz));

        let start = usize(self.payload_marker);
        let mut cursor = start + 1;

        // update the cached highest number
        self.number = nr;

        // move the payload marker
        self.payload_marker += sz;
        let end = usize(self.payload_marker);
        self.as_mut_slice()[end] = PAYLOAD_MARKER;

        // fill in the delta
        if delta < OFFSET8 {
            set!(self.as_mut_slice()[start], delta, u8(delta).unwrap());
        } else if delta < OFFSET16 {
            set!(self.as_mut_slice()[start], delta, DELTA8);
            self.as_mut_slice()[cursor] = u8(delta - OFFSET8).unwrap();
            cursor += 1;
        } else {
            set!(self.as_mut_slice()[start], delta, DELTA16);
            NE::write_u16(
                &mut self.as_mut_slice()[cursor..cursor + 2],
                delta - OFFSET16,
            );
            cursor += 2;
        }

        // fill in the length
        if len < OFFSET8 {
            set!(self.as_mut_slice()[start], length, u8(len).unwrap());
        } else if len < OFFSET16 {
            set!(self.as_mut_slice()[start], length, LENGTH8);
            self.as_mut_slice()[cursor] = u8(len - OFFSET8).unwrap();
            cursor += 1;
        } else {
            set!(self.as_mut_slice()[start], length, LENGTH16);
            NE::write_u16(&mut self.as_mut_slice()[cursor..cursor + 2], len - OFFSET16);
            cursor += 2;
        }

        // fill in the value
        self.as_mut_slice()[cursor..end].copy_from_slice(value);
    }

    /// Removes all the options this message has
    pub fn clear_options(&mut self) {
        let start = self.options_start();
        self.number = 0;
        self.payload_marker = start;
        self.as_mut_slice()[usize(start)] = PAYLOAD_MARKER;
    }

    /// Mutable view into the Token field
    pub fn token_mut(&mut self) -> &mut [u8] {
        let start = TOKEN_START;
        let end = start + self.get_token_length() as usize;
        &mut self.as_mut_slice()[start..end]
    }

    /// Mutable view into the payload
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.payload_marker + 1;

        &mut self.as_mut_slice()[usize(start)..]
    }

    /// Sets the Code field of the header
    pub fn set_code<C>(&mut self, code: C)
    where
        C: Into<Code>,
    {
        self.as_mut_slice()[CODE] = code.into().0;
    }

    /// Sets the Message ID field of the header
    pub fn set_message_id(&mut self, id: u16) {
        NE::write_u16(&mut self.as_mut_slice()[MESSAGE_ID], id)
    }

    /// Sets the Type field of the header
    pub fn set_type(&mut self, ty: Type) {
        let ty: u8 = ty.into();
        set!(self.as_mut_slice()[VER_T_TKL], t, ty);
    }

    /* Private */
    fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }

    unsafe fn set_token_length(&mut self, tkl: u8) {
        debug_assert!(tkl <= MAX_TOKEN_LENGTH);

        set!(self.as_mut_slice()[VER_T_TKL], tkl, tkl);
    }

    unsafe fn set_version(&mut self, ver: u8) {
        set!(self.as_mut_slice()[VER_T_TKL], ver, ver);
    }
}

impl<B> Message<B>
where
    B: AsSlice<Element = u8> + Resize,
{
    /// Truncates the *payload* to the specified length
    ///
    /// Truncating to zero also drops the payload marker: a message without payload carries no
    /// marker on the wire.
    pub fn truncate(&mut self, len: u16) {
        let old_len = self.payload_len();
        let start = self.payload_marker;

        if len < old_len {
            if len == 0 {
                self.buffer.truncate(start)
            } else {
                self.buffer.truncate(start + len + 1)
            }
        }
    }
}

impl<B> Message<B>
where
    B: AsSlice<Element = u8> + AsMutSlice<Element = u8> + Resize,
{
    /// Fills the payload with the given data and adjusts the length of the CoAP message
    pub fn set_payload(&mut self, data: &[u8]) {
        let len = u16(data.len()).unwrap();
        assert!(self.payload_len() >= len);

        self.truncate(len);
        if len > 0 {
            self.payload_mut().copy_from_slice(data);
        }
    }
}

impl<B> fmt::Debug for Message<B>
where
    B: AsSlice<Element = u8>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Adapter to format the `Options` iterator as a map
        struct Options<'a, B>(&'a Message<B>)
        where
            B: AsSlice<Element = u8> + 'a;
        impl<'a, B> fmt::Debug for Options<'a, B>
        where
            B: AsSlice<Element = u8>,
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut m = f.debug_map();
                for opt in self.0.options() {
                    if let Ok(s) = str::from_utf8(opt.value()) {
                        m.entry(&opt.number(), &s);
                    } else {
                        m.entry(&opt.number(), &opt.value());
                    }
                }
                m.finish()
            }
        }

        struct Prefix<'a, T>(&'a str, T)
        where
            T: fmt::Debug;

        impl<'a, T> fmt::Debug for Prefix<'a, T>
        where
            T: fmt::Debug,
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{:?}", self.0, self.1)
            }
        }

        let mut s = f.debug_struct("coap::Message");
        s.field("version", &self.get_version())
            .field("type", &self.get_type());

        let code = self.get_code();
        if let Ok(method) = Method::try_from(code) {
            s.field("code", &Prefix("Method::", method));
        } else if let Ok(resp) = Response::try_from(code) {
            s.field("code", &Prefix("Response::", resp));
        } else {
            s.field("code", &code);
        }

        s.field("message_id", &self.get_message_id());

        if !self.token().is_empty() {
            s.field("token", &self.token());
        }

        if self.options().count() != 0 {
            s.field("options", &Options(self));
        }

        let payload = self.payload();
        if !payload.is_empty() {
            if let Ok(p) = str::from_utf8(payload) {
                s.field("payload", &p);
            } else {
                s.field("payload", &payload);
            }
        }

        s.finish()
    }
}

/// A CoAP option
pub struct Opt<'a> {
    number: u16,
    value: &'a [u8],
}

impl<'a> Opt<'a> {
    /// Returns the number of this option
    pub fn number(&self) -> OptionNumber {
        self.number.into()
    }

    /// Returns the value of this option
    pub fn value(&self) -> &'a [u8] {
        self.value
    }
}

/// Iterator over the options of a CoAP message
#[derive(Clone)]
pub struct Options<'a> {
    /// Number of the previous option
    number: u16,
    ptr: &'a [u8],
}

// Helper
struct PtrReader<'a>(&'a [u8]);

impl<'a> PtrReader<'a> {
    fn try_read_u8(&mut self) -> CoreOption<u8> {
        if !self.0.is_empty() {
            Some(self.read_u8())
        } else {
            None
        }
    }

    fn read_u8(&mut self) -> u8 {
        let byte = self.0[0];
        self.0 = &self.0[1..];
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let halfword = NE::read_u16(&self.0[..2]);
        self.0 = &self.0[2..];
        halfword
    }
}

impl<'a> Iterator for Options<'a> {
    type Item = Opt<'a>;

    fn next(&mut self) -> CoreOption<Opt<'a>> {
        let mut ptr = PtrReader(self.ptr);

        let head = ptr.try_read_u8()?;
        if head == PAYLOAD_MARKER {
            None
        } else {
            let delta4 = get!(head, delta);
            let len4 = get!(head, length);

            // Sanity check `Message` invariants
            debug_assert!(delta4 != RESERVED);
            debug_assert!(len4 != RESERVED);

            self.number += if delta4 == DELTA8 {
                u16(ptr.read_u8()) + OFFSET8
            } else if delta4 == DELTA16 {
                ptr.read_u16() + OFFSET16
            } else {
                u16(delta4)
            };

            let len = if len4 == LENGTH8 {
                u16(ptr.read_u8()) + OFFSET8
            } else if len4 == LENGTH16 {
                ptr.read_u16() + OFFSET16
            } else {
                u16(len4)
            };

            // move pointer by `len` for the next iteration
            let value = &ptr.0[..usize(len)];
            self.ptr = &ptr.0[usize(len)..];

            Some(Opt {
                number: self.number,
                value,
            })
        }
    }
}

/// CoAP Type
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Type {
    /// Confirmable message
    Confirmable,
    /// Non-confirmable message
    NonConfirmable,
    /// Acknowledgement message
    Acknowledgement,
    /// Reset message
    Reset,
}

impl Type {
    fn from(nibble: u8) -> Self {
        match nibble & 0b11 {
            0b00 => Type::Confirmable,
            0b01 => Type::NonConfirmable,
            0b10 => Type::Acknowledgement,
            0b11 => Type::Reset,
            _ => unreachable!(),
        }
    }
}

impl From<Type> for u8 {
    fn from(ty: Type) -> u8 {
        match ty {
            Type::Confirmable => 0,
            Type::NonConfirmable => 1,
            Type::Acknowledgement => 2,
            Type::Reset => 3,
        }
    }
}

/// CoAP Code
#[derive(Clone, Copy, PartialEq)]
pub struct Code(u8);

mod detail {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = 0;
    pub const SIZE: u8 = 5;
}

mod class {
    pub const MASK: u8 = (1 << SIZE) - 1;
    pub const OFFSET: u8 = 5;
    pub const SIZE: u8 = 3;
}

impl Code {
    /// Empty message
    pub const EMPTY: Self = Code(0b000_00000);

    /// Returns the class of this code
    pub fn class(&self) -> u8 {
        get!(self.0, class)
    }

    /// Returns the detail of this code
    pub fn detail(&self) -> u8 {
        get!(self.0, detail)
    }

    /// Checks if this is a request code
    pub fn is_request(&self) -> bool {
        self.class() == 0 && self.detail() != 0
    }

    /// Checks if this is a response code
    pub fn is_response(&self) -> bool {
        match self.class() {
            2..=5 => true,
            _ => false,
        }
    }

    /* Private */
    fn from_parts(class: u8, detail: u8) -> Self {
        let mut code = 0;
        set!(code, class, class);
        set!(code, detail, detail);

        Code(code)
    }
}

impl From<Code> for u8 {
    fn from(code: Code) -> u8 {
        code.0
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code(0b{:03b}_{:05b})", self.class(), self.detail())
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

code!(
    /// CoAP Method Codes
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub enum Method {
        /// GET
        Get = (0, 1),
        /// POST
        Post = (0, 2),
        /// PUT
        Put = (0, 3),
        /// DELETE
        Delete = (0, 4),
    }
);

code!(
    /// CoAP Response Codes
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub enum Response {
        // Success
        /// Created
        Created = (2, 1),
        /// Deleted
        Deleted = (2, 2),
        /// Valid
        Valid = (2, 3),
        /// Changed
        Changed = (2, 4),
        /// Content
        Content = (2, 5),

        // Client error
        /// Bad Request
        BadRequest = (4, 0),
        /// Unauthorized
        Unauthorized = (4, 1),
        /// Bad Option
        BadOption = (4, 2),
        /// Forbidden
        Forbidden = (4, 3),
        /// Not Found
        NotFound = (4, 4),
        /// Method Not Allowed
        MethodNotAllowed = (4, 5),
        /// Not Acceptable
        NotAcceptable = (4, 6),
        /// Precondition Failed
        PreconditionFailed = (4, 12),
        /// Request Entity Too Large
        RequestEntityTooLarge = (4, 13),
        /// Unsupported Content-Format
        UnsupportedContentFormat = (4, 15),

        // Server error
        /// Internal Server Error
        InternalServerError = (5, 0),
        /// Not Implemented
        NotImplemented = (5, 1),
        /// Bad Gateway
        BadGateway = (5, 2),
        /// Service Unavailable
        ServiceUnavailable = (5, 3),
        /// Gateway Timeout
        GatewayTimeout = (5, 4),
        /// Proxying Not Supported
        ProxyingNotSupported = (5, 5),
    }
);

full_range!(
    u16,
    /// CoAP Option Numbers
    #[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
    pub enum OptionNumber {
        /// Reserved
        Reserved0 = 0,
        /// If-Match
        IfMatch = 1,
        /// Uri-Host
        UriHost = 3,
        /// ETag
        ETag = 4,
        /// If-None-Match
        IfNoneMatch = 5,
        /// Uri-Port
        UriPort = 7,
        /// Location-Path
        LocationPath = 8,
        /// Uri-Path
        UriPath = 11,
        /// Content-Format
        ContentFormat = 12,
        /// Max-Age
        MaxAge = 14,
        /// Uri-Query
        UriQuery = 15,
        /// Accept
        Accept = 17,
        /// Location-Query
        LocationQuery = 20,
    }
);

full_range!(
    u16,
    /// CoAP Content-Formats
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub enum ContentFormat {
        /// text/plain; charset=utf-8
        TextPlain = 0,
        /// application/link-format
        ApplicationLinkFormat = 40,
        /// application/xml
        ApplicationXml = 41,
        /// application/octet-stream
        ApplicationOctetStream = 42,
        /// application/exi
        ApplicationExi = 47,
        /// application/json
        ApplicationJson = 50,
        /// application/cbor
        ApplicationCbor = 60,
    }
);

#[cfg(test)]
mod tests {
    use cast::usize;
    use rand::{Rng, RngCore};

    use crate::{coap, Error};

    const URI_HOST: &[u8] = b"www.example.org";
    const URI_PORT: &[u8] = &[22, 51]; // 5683

    #[test]
    fn new() {
        const SZ: u16 = 128;

        let mut chunk = [0; SZ as usize];
        let buf = &mut chunk[..];

        let coap = coap::Message::new(buf, 0);
        assert_eq!(coap.len(), SZ);
    }

    #[test]
    fn options() {
        // NOTE start with randomized array to make sure we set *everything* correctly
        let mut buf = [0; 128];
        rand::thread_rng().fill_bytes(&mut buf);

        let mut coap = coap::Message::new(&mut buf[..], rand::thread_rng().gen::<u8>() % 9);

        coap.add_option(coap::OptionNumber::UriHost, URI_HOST);

        {
            let host = coap.options().next().unwrap();

            assert_eq!(host.number(), coap::OptionNumber::UriHost);
            assert_eq!(host.value(), URI_HOST);
        }

        coap.add_option(coap::OptionNumber::UriPort, URI_PORT);

        {
            let host = coap.options().nth(0).unwrap();
            let port = coap.options().nth(1).unwrap();

            assert_eq!(host.number(), coap::OptionNumber::UriHost);
            assert_eq!(host.value(), URI_HOST);

            assert_eq!(port.number(), coap::OptionNumber::UriPort);
            assert_eq!(port.value(), URI_PORT);
        }

        coap.clear_options();

        assert!(coap.options().next().is_none());
    }

    #[test]
    fn parse() {
        const TYPE: coap::Type = coap::Type::NonConfirmable;
        const MID: u16 = 0xabcd;

        let mut rng = rand::thread_rng();
        let tkl = rng.gen::<u8>() % 9;
        let mut buf = [0; 8];
        rng.fill_bytes(&mut buf[..usize(tkl)]);
        let token_bytes = buf;
        let token = &token_bytes[..usize(tkl)];

        // NOTE start with randomized array to make sure we set *everything* correctly
        let mut buf = [0; 128];
        rng.fill_bytes(&mut buf);

        let mut coap = coap::Message::new(&mut buf[..], tkl);

        coap.set_type(TYPE);
        coap.set_code(coap::Method::Get);
        coap.set_message_id(MID);
        coap.token_mut().copy_from_slice(token);
        coap.clear_options();
        coap.add_option(coap::OptionNumber::UriHost, URI_HOST);
        coap.add_option(coap::OptionNumber::UriPort, URI_PORT);
        coap.set_payload(b"on");

        let m = coap::Message::parse(coap.as_bytes()).unwrap();

        assert_eq!(m.get_version(), 1);
        assert_eq!(m.get_type(), TYPE);
        assert_eq!(m.get_token_length(), tkl);
        assert_eq!(m.get_code(), coap::Method::Get.into());
        assert_eq!(m.get_message_id(), MID);
        assert_eq!(m.token(), token);

        let host = m.options().nth(0).unwrap();
        let port = m.options().nth(1).unwrap();

        assert_eq!(host.number(), coap::OptionNumber::UriHost);
        assert_eq!(host.value(), URI_HOST);

        assert_eq!(port.number(), coap::OptionNumber::UriPort);
        assert_eq!(port.value(), URI_PORT);

        assert_eq!(m.payload(), b"on");
    }

    #[test]
    fn no_payload_no_marker() {
        let mut buf = [0; 64];
        let mut coap = coap::Message::new(&mut buf[..], 0);
        coap.set_type(coap::Type::NonConfirmable);
        coap.set_code(coap::Method::Get);
        coap.add_option(coap::OptionNumber::UriPath, b"led");
        coap.set_payload(&[]);

        // 4-byte header + one option, no 0xFF byte
        assert_eq!(coap.len(), 4 + 1 + 3);
        assert!(!coap.as_bytes().contains(&0xff));

        let m = coap::Message::parse(coap.as_bytes()).unwrap();
        assert_eq!(m.payload(), &[]);
        assert_eq!(m.options().count(), 1);
    }

    #[test]
    fn reject_short() {
        assert_eq!(
            coap::Message::parse(&[0x51, 0x01, 0x00][..]).unwrap_err(),
            Error::BadFormat
        );
    }

    #[test]
    fn reject_version() {
        // version 2
        assert_eq!(
            coap::Message::parse(&[0x91, 0x01, 0x00, 0x01][..]).unwrap_err(),
            Error::BadFormat
        );
    }

    #[test]
    fn reject_confirmable() {
        // type bits 00
        assert_eq!(
            coap::Message::parse(&[0x40, 0x01, 0x00, 0x01][..]).unwrap_err(),
            Error::NotSupported
        );
    }

    #[test]
    fn reject_token_length() {
        // TKL = 9
        assert_eq!(
            coap::Message::parse(
                &[0x59, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0][..]
            )
            .unwrap_err(),
            Error::BadFormat
        );
    }

    #[test]
    fn reject_reserved_nibble() {
        // delta nibble 15 without the full 0xFF marker
        assert_eq!(
            coap::Message::parse(&[0x51, 0x01, 0x00, 0x01, 0xaa, 0xf4][..]).unwrap_err(),
            Error::BadFormat
        );
    }

    #[test]
    fn reject_dangling_marker() {
        assert_eq!(
            coap::Message::parse(&[0x51, 0x01, 0x00, 0x01, 0xaa, 0xff][..]).unwrap_err(),
            Error::BadFormat
        );
    }

    #[test]
    fn reject_truncated_option() {
        // length nibble 4 but only 2 value bytes present
        assert_eq!(
            coap::Message::parse(&[0x51, 0x01, 0x00, 0x01, 0xaa, 0xb4, 1, 2][..]).unwrap_err(),
            Error::BadFormat
        );
    }

    #[test]
    fn content_format() {
        let mut buf = [0; 64];
        let mut coap = coap::Message::new(&mut buf[..], 0);
        coap.set_type(coap::Type::NonConfirmable);
        coap.set_code(coap::Response::Content);
        coap.add_option(coap::OptionNumber::ContentFormat, &[42]);
        coap.set_payload(&[0xde, 0xad]);

        let m = coap::Message::parse(coap.as_bytes()).unwrap();
        assert_eq!(
            m.content_format().unwrap(),
            Some(coap::ContentFormat::ApplicationOctetStream)
        );
    }

    #[test]
    fn read_path() {
        let mut buf = [0; 64];
        let mut coap = coap::Message::new(&mut buf[..], 0);
        coap.set_type(coap::Type::NonConfirmable);
        coap.set_code(coap::Method::Get);
        coap.add_option(coap::OptionNumber::UriPath, b".well-known");
        coap.add_option(coap::OptionNumber::UriPath, b"core");
        coap.set_payload(&[]);

        let m = coap::Message::parse(coap.as_bytes()).unwrap();

        let mut scratch = [0; 64];
        assert_eq!(m.read_path(&mut scratch).unwrap(), "/.well-known/core");

        let mut tiny = [0; 4];
        assert_eq!(m.read_path(&mut tiny).unwrap_err(), Error::NoSpace);
    }
}
