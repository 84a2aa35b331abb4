//! The seam between the stack and the host network
//!
//! A [`Transport`] owns the actual sockets. Outbound, the stack hands it a fully layered IPv6
//! datagram; inbound, the transport delivers datagrams for its bound ports into the stack's
//! [`Mailbox`]. [`UdpTransport`] implements the seam over `std::net::UdpSocket`; tests use an
//! in-process loopback instead.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6, UdpSocket};
use std::sync::mpsc::SyncSender;
use std::sync::Mutex;
use std::thread;

use cast::usize;

use crate::{ipv6, udp, Error};

/// An event delivered to the dispatcher's message queue
pub enum Event {
    /// A datagram received from the network
    Rcv(Vec<u8>),
}

/// Handle for delivering events into the stack's message queue
#[derive(Clone)]
pub struct Mailbox {
    tx: SyncSender<Event>,
}

impl Mailbox {
    pub(crate) fn new(tx: SyncSender<Event>) -> Self {
        Mailbox { tx }
    }

    /// Delivers one received datagram
    ///
    /// Fails with [`Error::TransportFailed`] when the queue is full; the caller should drop the
    /// datagram.
    pub fn deliver(&self, datagram: Vec<u8>) -> Result<(), Error> {
        self.tx
            .try_send(Event::Rcv(datagram))
            .map_err(|_| Error::TransportFailed)
    }
}

/// Downstream network interface of the stack
pub trait Transport: Send + Sync {
    /// Does `port` already have a binding?
    fn bound(&self, port: u16) -> bool;

    /// Binds `port` and starts delivering its datagrams into `mailbox`
    fn bind(&self, port: u16, mailbox: Mailbox) -> Result<(), Error>;

    /// Hands an assembled IPv6 datagram to the network
    ///
    /// Returns the number of bytes accepted for transmission.
    fn dispatch(&self, datagram: &[u8]) -> Result<usize, Error>;
}

/// [`Transport`] over the operating system's UDP sockets
///
/// One socket is bound per registered port; a reader thread per socket reassembles received
/// datagrams into the layered view the dispatcher expects. The destination address of a
/// reassembled datagram is left unspecified since the socket API does not expose it.
pub struct UdpTransport {
    socks: Mutex<Vec<(u16, UdpSocket)>>,
}

impl UdpTransport {
    /// Creates a transport with no bindings
    pub fn new() -> Self {
        UdpTransport {
            socks: Mutex::new(Vec::new()),
        }
    }

    fn read_loop(sock: UdpSocket, port: u16, mailbox: Mailbox) {
        let mut buf = [0; 1280]; // IPv6 minimum MTU
        loop {
            let (n, peer) = match sock.recv_from(&mut buf) {
                Ok(x) => x,
                Err(_) => return,
            };
            let peer = match peer {
                SocketAddr::V6(a) => a,
                SocketAddr::V4(_) => continue,
            };

            let mut chunk = vec![0; usize(ipv6::HEADER_SIZE) + usize(udp::HEADER_SIZE) + n];
            {
                let mut ip = ipv6::Packet::new(&mut chunk[..]);
                ip.set_source(ipv6::Addr::from(*peer.ip()));
                ip.udp(|udp| {
                    udp.set_source(peer.port());
                    udp.set_destination(port);
                    udp.set_payload(&buf[..n]);
                });
            }

            if mailbox.deliver(chunk).is_err() {
                log::debug!("coap: message queue full, dropping datagram");
            }
        }
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        UdpTransport::new()
    }
}

impl Transport for UdpTransport {
    fn bound(&self, port: u16) -> bool {
        self.socks.lock().unwrap().iter().any(|(p, _)| *p == port)
    }

    fn bind(&self, port: u16, mailbox: Mailbox) -> Result<(), Error> {
        let sock = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, port))
            .map_err(|_| Error::TransportFailed)?;
        let reader = sock.try_clone().map_err(|_| Error::TransportFailed)?;

        self.socks.lock().unwrap().push((port, sock));

        thread::Builder::new()
            .name(format!("coap-udp-{}", port))
            .spawn(move || UdpTransport::read_loop(reader, port, mailbox))
            .map_err(|_| Error::TransportFailed)?;

        Ok(())
    }

    fn dispatch(&self, datagram: &[u8]) -> Result<usize, Error> {
        let ip = ipv6::Packet::parse(datagram).map_err(|_| Error::TransportFailed)?;
        if ip.get_next_header() != ipv6::NextHeader::Udp {
            return Err(Error::TransportFailed);
        }
        let udp = udp::Packet::parse(ip.payload()).map_err(|_| Error::TransportFailed)?;

        let dst = SocketAddrV6::new(ip.get_destination().into(), udp.get_destination(), 0, 0);

        let socks = self.socks.lock().unwrap();
        let sock = socks
            .iter()
            .find(|(port, _)| *port == udp.get_source())
            .map(|(_, sock)| sock)
            .ok_or(Error::TransportFailed)?;

        sock.send_to(udp.payload(), dst)
            .map_err(|_| Error::TransportFailed)?;

        Ok(datagram.len())
    }
}
