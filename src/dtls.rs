//! DTLS shim over a pluggable secure transport
//!
//! Only the adapter contract lives here: the [`Shim`] owns a DTLS [`Engine`] and a plain
//! datagram channel. Outgoing application data is protected by the engine and forwarded as
//! records to the channel; incoming records either advance a handshake inside the engine or
//! surface as decrypted application data through the registered receive handler, together with
//! the peer [`Session`]. Record processing itself — and everything else about DTLS session
//! management — belongs to the engine implementation.

use crate::{ipv6, Error};

/// TLS_PSK_WITH_AES_128_CCM_8 (RFC 6655)
pub const CIPHER_PSK_IDS: u16 = 0xC0A8;

/// TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8 (RFC 7251)
pub const CIPHER_RPK_IDS: u16 = 0xC0AE;

/// The cipher suites a conforming engine offers
pub const CIPHER_LIST: [u16; 2] = [CIPHER_PSK_IDS, CIPHER_RPK_IDS];

/// Peer endpoint of a secured session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Session {
    /// Peer IPv6 address
    pub addr: ipv6::Addr,
    /// Peer UDP port
    pub port: u16,
    /// Index of the network interface the session runs on
    pub ifindex: u32,
}

/// Credential requested from the pre-shared-key lookup
pub enum Credential<'a> {
    /// The identity to present for a session (client side)
    PskIdentity,
    /// The key for the given peer identity (server side)
    PskKey(&'a [u8]),
    /// The identity hint; unused
    PskHint,
}

/// Pre-shared-key lookup driven by the engine during a handshake
///
/// Fills `result` with the requested credential and returns its length, or
/// [`Error::NoSpace`] when the result buffer is too small.
pub type PskLookup = fn(&Session, Credential<'_>, result: &mut [u8]) -> Result<usize, Error>;

/// What the engine did with an incoming record
pub enum Incoming<'a> {
    /// The record was consumed by the handshake
    Handshake,
    /// Decrypted application data
    Data(&'a [u8]),
}

/// The DTLS implementation behind the shim
pub trait Engine {
    /// Processes one incoming record
    ///
    /// Handshake records are consumed, with any records the handshake produces written through
    /// `out`; application records decrypt to [`Incoming::Data`].
    fn read<'a>(
        &'a mut self,
        session: &Session,
        record: &[u8],
        out: &mut dyn FnMut(&Session, &[u8]),
    ) -> Result<Incoming<'a>, Error>;

    /// Protects outgoing application data
    ///
    /// The resulting records are written through `out`; returns the number of payload bytes
    /// consumed.
    fn send(
        &mut self,
        session: &Session,
        data: &[u8],
        out: &mut dyn FnMut(&Session, &[u8]),
    ) -> Result<usize, Error>;
}

/// Handler receiving decrypted application data and the peer it came from
pub type RecvHandler = fn(&Session, &[u8]);

/// Secure transport shim
///
/// Translates raw socket reads and writes into secured exchanges: `read` feeds received
/// datagrams to the engine, `send` wraps outgoing data. The `out` argument of both is the
/// socket writer the records go through.
pub struct Shim<E> {
    engine: E,
    recv_handler: RecvHandler,
}

impl<E> Shim<E>
where
    E: Engine,
{
    /// Creates the shim over `engine`, delivering application data to `recv_handler`
    pub fn create(engine: E, recv_handler: RecvHandler) -> Self {
        Shim {
            engine,
            recv_handler,
        }
    }

    /// Feeds one datagram received from the socket into the session
    pub fn read(
        &mut self,
        session: &Session,
        record: &[u8],
        out: &mut dyn FnMut(&Session, &[u8]),
    ) -> Result<(), Error> {
        let recv_handler = self.recv_handler;
        match self.engine.read(session, record, out)? {
            Incoming::Handshake => Ok(()),
            Incoming::Data(data) => {
                recv_handler(session, data);
                Ok(())
            }
        }
    }

    /// Sends application data over the secured session
    pub fn send(
        &mut self,
        session: &Session,
        data: &[u8],
        out: &mut dyn FnMut(&Session, &[u8]),
    ) -> Result<usize, Error> {
        self.engine.send(session, data, out)
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use crate::dtls::{Credential, Engine, Incoming, PskLookup, Session, Shim};
    use crate::{ipv6, Error};

    // An "engine" that treats every record as plaintext application data
    struct Null;

    impl Engine for Null {
        fn read<'a>(
            &'a mut self,
            _: &Session,
            _: &[u8],
            _: &mut dyn FnMut(&Session, &[u8]),
        ) -> Result<Incoming<'a>, Error> {
            Ok(Incoming::Handshake)
        }

        fn send(
            &mut self,
            session: &Session,
            data: &[u8],
            out: &mut dyn FnMut(&Session, &[u8]),
        ) -> Result<usize, Error> {
            out(session, data);
            Ok(data.len())
        }
    }

    fn session() -> Session {
        Session {
            addr: ipv6::Addr::LOOPBACK,
            port: 5684,
            ifindex: 1,
        }
    }

    #[test]
    fn send_forwards_records() {
        let mut shim = Shim::create(Null, |_, _| {});

        let forwarded = Cell::new(0);
        let n = shim
            .send(&session(), b"hello", &mut |_, record| {
                forwarded.set(record.len())
            })
            .unwrap();

        assert_eq!(n, 5);
        assert_eq!(forwarded.get(), 5);
    }

    #[test]
    fn handshake_records_stay_internal() {
        let mut shim = Shim::create(Null, |_, _| panic!("no application data expected"));

        shim.read(&session(), b"\x16\xfe\xfd", &mut |_, _| {}).unwrap();
    }

    #[test]
    fn psk_lookup_contract() {
        fn lookup(_: &Session, cred: Credential<'_>, result: &mut [u8]) -> Result<usize, Error> {
            let key: &[u8] = match cred {
                Credential::PskIdentity => b"client",
                Credential::PskKey(id) if id == b"client" => b"secret",
                _ => return Err(Error::NoSpace),
            };
            if result.len() < key.len() {
                return Err(Error::NoSpace);
            }
            result[..key.len()].copy_from_slice(key);
            Ok(key.len())
        }

        let lookup: PskLookup = lookup;

        let mut buf = [0; 16];
        let n = lookup(&session(), Credential::PskKey(b"client"), &mut buf).unwrap();
        assert_eq!(&buf[..n], b"secret");

        let mut tiny = [0; 2];
        assert_eq!(
            lookup(&session(), Credential::PskIdentity, &mut tiny).unwrap_err(),
            Error::NoSpace
        );
    }
}
