//! Response construction
//!
//! A [`Reply`] builds the response in two stages over its own buffer. Creating it echoes the
//! request header and token and leaves a reserved gap between them and the payload cursor; the
//! handler then writes payload bytes linearly and records the content format. [`Reply::finish`]
//! emits the Content-Format option into the gap, places the payload marker and closes the gap,
//! so the handler never has to know the option's size up front.

use as_slice::AsSlice;
use byteorder::{ByteOrder, NetworkEndian as NE};
use cast::usize;

use crate::coap::{self, Code, ContentFormat, Type};
use crate::Error;

/// Bytes reserved between header+token and the payload for the options and the payload marker
pub const OPT_RESERVE: usize = 10;

/// A response under construction
///
/// The response reuses the request's version, message ID and token; its type is always
/// non-confirmable.
#[derive(Debug)]
pub struct Reply<'a> {
    buf: &'a mut [u8],
    // length of the echoed fixed header + token
    hdr_len: usize,
    // next payload write position
    cursor: usize,
    format: Option<ContentFormat>,
}

impl<'a> Reply<'a> {
    /// Starts a response to `req` in `buf`
    ///
    /// Fails with [`Error::NoSpace`] when `buf` cannot hold the echoed header plus the reserved
    /// option gap.
    pub fn new<B, C>(req: &coap::Message<B>, code: C, buf: &'a mut [u8]) -> Result<Self, Error>
    where
        B: AsSlice<Element = u8>,
        C: Into<Code>,
    {
        let hdr_len = usize(coap::HEADER_SIZE) + req.token().len();
        if buf.len() < hdr_len + OPT_RESERVE {
            return Err(Error::NoSpace);
        }

        buf[..hdr_len].copy_from_slice(&req.as_bytes()[..hdr_len]);

        let ty: u8 = Type::NonConfirmable.into();
        buf[0] = (buf[0] & !0x30) | (ty << 4);

        let mut reply = Reply {
            buf,
            hdr_len,
            cursor: 0,
            format: None,
        };
        reply.header(code);
        Ok(reply)
    }

    /// (Re)writes the response code and resets payload and content format
    pub fn header<C>(&mut self, code: C)
    where
        C: Into<Code>,
    {
        self.buf[1] = code.into().into();
        self.format = None;
        self.cursor = self.hdr_len + OPT_RESERVE;
    }

    /// Appends payload bytes
    ///
    /// Fails with [`Error::NoSpace`] when the response buffer is full; the handler surfaces that
    /// to the dispatcher, which turns the response into a 5.00.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.cursor + data.len() > self.buf.len() {
            return Err(Error::NoSpace);
        }
        self.buf[self.cursor..self.cursor + data.len()].copy_from_slice(data);
        self.cursor += data.len();
        Ok(())
    }

    /// Records the media format of the payload written so far
    pub fn content(&mut self, format: ContentFormat) {
        self.format = Some(format);
    }

    /// Length of the payload written so far
    pub fn payload_len(&self) -> usize {
        self.cursor - self.hdr_len - OPT_RESERVE
    }

    /// Finalizes the response and returns its total length
    ///
    /// Writes the Content-Format option (only when a payload is present) and the payload marker
    /// into the reserved gap, then moves the payload down to close it.
    pub fn finish(mut self) -> usize {
        let plen = self.payload_len();
        let mut end = self.hdr_len;

        if plen > 0 {
            if let Some(format) = self.format {
                let value = u16::from(format);
                // a lone Content-Format option: the delta is the option number itself and
                // always fits the nibble
                let delta = u16::from(coap::OptionNumber::ContentFormat) as u8;
                if value == 0 {
                    self.buf[end] = delta << 4;
                    end += 1;
                } else if value <= 0xff {
                    self.buf[end] = (delta << 4) | 1;
                    self.buf[end + 1] = value as u8;
                    end += 2;
                } else {
                    self.buf[end] = (delta << 4) | 2;
                    NE::write_u16(&mut self.buf[end + 1..end + 3], value);
                    end += 3;
                }
            }

            self.buf[end] = coap::PAYLOAD_MARKER;
            end += 1;

            let payload_start = self.hdr_len + OPT_RESERVE;
            self.buf.copy_within(payload_start..payload_start + plen, end);
        }

        end + plen
    }
}

#[cfg(test)]
mod tests {
    use crate::coap::{self, ContentFormat, Response};
    use crate::reply::Reply;
    use crate::Error;

    fn request(buf: &mut [u8]) -> coap::Message<&[u8]> {
        let mut m = coap::Message::new(&mut buf[..], 2);
        m.set_type(coap::Type::NonConfirmable);
        m.set_code(coap::Method::Get);
        m.set_message_id(0xabcd);
        m.token_mut().copy_from_slice(&[0xaa, 0xbb]);
        m.set_payload(&[]);
        let len = m.len();
        coap::Message::parse(&buf[..len as usize]).unwrap()
    }

    #[test]
    fn echoes_header() {
        let mut buf = [0; 64];
        let req = request(&mut buf);

        let mut out = [0; 64];
        let mut reply = Reply::new(&req, Response::Content, &mut out[..]).unwrap();
        reply.write(&[42]).unwrap();
        reply.content(ContentFormat::ApplicationOctetStream);
        let total = reply.finish();

        let resp = coap::Message::parse(&out[..total]).unwrap();
        assert_eq!(resp.get_type(), coap::Type::NonConfirmable);
        assert_eq!(resp.get_code(), Response::Content.into());
        assert_eq!(resp.get_message_id(), 0xabcd);
        assert_eq!(resp.token(), &[0xaa, 0xbb]);
        assert_eq!(
            resp.content_format().unwrap(),
            Some(ContentFormat::ApplicationOctetStream)
        );
        assert_eq!(resp.payload(), &[42]);
    }

    #[test]
    fn empty_response_has_no_marker() {
        let mut buf = [0; 64];
        let req = request(&mut buf);

        let mut out = [0; 64];
        let reply = Reply::new(&req, Response::NotFound, &mut out[..]).unwrap();
        let total = reply.finish();

        // header + token only
        assert_eq!(total, 4 + 2);
        let resp = coap::Message::parse(&out[..total]).unwrap();
        assert_eq!(resp.get_code(), Response::NotFound.into());
        assert_eq!(resp.payload(), &[]);
        assert_eq!(resp.options().count(), 0);
    }

    #[test]
    fn rewrite_discards_payload() {
        let mut buf = [0; 64];
        let req = request(&mut buf);

        let mut out = [0; 64];
        let mut reply = Reply::new(&req, Response::Content, &mut out[..]).unwrap();
        reply.write(b"partial").unwrap();
        reply.content(ContentFormat::TextPlain);

        // the handler failed; start over as a 5.00
        reply.header(Response::InternalServerError);
        let total = reply.finish();

        let resp = coap::Message::parse(&out[..total]).unwrap();
        assert_eq!(resp.get_code(), Response::InternalServerError.into());
        assert_eq!(resp.payload(), &[]);
    }

    #[test]
    fn no_space() {
        let mut buf = [0; 64];
        let req = request(&mut buf);

        let mut out = [0; 64];
        let mut reply = Reply::new(&req, Response::Content, &mut out[..]).unwrap();
        assert_eq!(reply.write(&[0; 64]).unwrap_err(), Error::NoSpace);

        let mut tiny = [0; 8];
        assert_eq!(
            Reply::new(&req, Response::Content, &mut tiny[..]).unwrap_err(),
            Error::NoSpace
        );
    }
}
