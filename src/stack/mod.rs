//! The message-loop stack
//!
//! A dedicated dispatcher thread owns the module's message queue and routes every inbound
//! datagram to a listener by UDP destination port. Servers register a well-known port and an
//! endpoint table; clients get an ephemeral source port, which is what matches a (token-less)
//! response back to them.
//!
//! ```no_run
//! use ucoap::coap::{Method, Response};
//! use ucoap::endpoint::Endpoint;
//! use ucoap::stack::{transport::UdpTransport, Coap, Config};
//! use ucoap::{coap, Error};
//!
//! fn led(_: &coap::Message<&[u8]>, reply: &mut ucoap::reply::Reply<'_>) -> Result<(), Error> {
//!     reply.header(Response::Content);
//!     reply.write(b"on")?;
//!     reply.content(coap::ContentFormat::TextPlain);
//!     Ok(())
//! }
//!
//! let coap = Coap::init(Config::default(), UdpTransport::new()).unwrap();
//! coap.start_server(coap::PORT, vec![Endpoint {
//!     path: "/led",
//!     method: Method::Get,
//!     handler: led,
//! }]).unwrap();
//! ```
//!
//! Handlers and response callbacks run synchronously on the dispatcher thread; they must not
//! block for long, though they may call `send`.

mod registry;
pub mod transport;

pub use self::registry::{Sender, XferState};

use core::cmp::Ordering;
use core::convert::TryFrom;

use std::sync::atomic::{AtomicU16, Ordering as Atomic};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

use cast::usize;
use rand::Rng;

use self::registry::{Kind, Listener, Registry, ResponseHandler};
use self::transport::{Event, Mailbox, Transport};
use crate::coap::{self, Method};
use crate::endpoint::{self, Endpoint};
use crate::reply::Reply;
use crate::xfer::{self, Meta, Path, Token, Transfer};
use crate::{ipv6, udp, Error};

/// Values the host supplies to the stack
#[derive(Clone, Debug)]
pub struct Config {
    /// Inclusive range client source ports are allocated from
    pub ephemeral_ports: (u16, u16),
    /// Size of the response buffer, which bounds both inbound messages and responses
    pub buffer_size: usize,
    /// Longest request path the dispatcher will synthesize for logging
    pub url_max: usize,
    /// Depth of the dispatcher's message queue
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ephemeral_ports: (20000, 21000),
            buffer_size: 128,
            url_max: 64,
            queue_depth: 4,
        }
    }
}

struct Inner {
    config: Config,
    registry: Mutex<Registry>,
    transport: Box<dyn Transport>,
    mailbox: Mailbox,
    // last-used message ID
    message_id: AtomicU16,
}

/// Handle to a running CoAP stack
///
/// Listeners registered through this handle persist until the process exits; removal is not
/// provided.
pub struct Coap {
    inner: Arc<Inner>,
}

impl Coap {
    /// Starts the dispatcher thread and returns the handle to it
    pub fn init<T>(config: Config, transport: T) -> Result<Coap, Error>
    where
        T: Transport + 'static,
    {
        let (tx, rx) = sync_channel(config.queue_depth);

        let inner = Arc::new(Inner {
            message_id: AtomicU16::new(rand::thread_rng().gen()),
            mailbox: Mailbox::new(tx),
            registry: Mutex::new(Registry::new()),
            transport: Box::new(transport),
            config,
        });

        let worker = inner.clone();
        thread::Builder::new()
            .name("coap".into())
            .spawn(move || event_loop(worker, rx))
            .map_err(|_| Error::TransportFailed)?;

        Ok(Coap { inner })
    }

    /// Registers a server listener with its endpoint table on `port`
    ///
    /// The table is sorted by path on registration; `/.well-known/core` is always served first,
    /// listing every registered endpoint. Fails with [`Error::AlreadyRegistered`] when the port
    /// is taken.
    pub fn start_server(&self, port: u16, mut endpoints: Vec<Endpoint>) -> Result<(), Error> {
        // dispatch relies on this ordering
        endpoints.sort_by(|a, b| a.path.cmp(b.path));

        let mut registry = self.inner.registry.lock().unwrap();
        if registry.find(port).is_some() || self.inner.transport.bound(port) {
            return Err(Error::AlreadyRegistered);
        }

        self.inner.transport.bind(port, self.inner.mailbox.clone())?;
        registry.insert(Listener {
            port,
            kind: Kind::Server {
                endpoints: Arc::new(endpoints),
            },
        })
    }

    /// Registers a client listener for responses on an ephemeral port
    ///
    /// `handler` runs on the dispatcher thread for every response matching the client's port and
    /// last request token, and once, synchronously, when a send fails outright.
    ///
    /// # Panics
    ///
    /// Panics if `token_len` is not in the range `0..=8`
    pub fn register_client<F>(&self, token_len: u8, handler: F) -> Result<Client, Error>
    where
        F: FnMut(XferState, &Meta, &Transfer<'_>) + Send + 'static,
    {
        assert!(token_len <= coap::MAX_TOKEN_LENGTH);

        let sender = Arc::new(Mutex::new(Sender::new(token_len)));
        let handler: Arc<Mutex<ResponseHandler>> = Arc::new(Mutex::new(Box::new(handler)));

        let mut registry = self.inner.registry.lock().unwrap();
        let port = registry.allocate(
            self.inner.config.ephemeral_ports,
            self.inner.transport.as_ref(),
        )?;

        self.inner.transport.bind(port, self.inner.mailbox.clone())?;
        registry.insert(Listener {
            port,
            kind: Kind::Client {
                sender: sender.clone(),
                handler: handler.clone(),
            },
        })?;
        log::trace!("coap: registered client on port {}", port);

        Ok(Client {
            inner: self.inner.clone(),
            port,
            sender,
            handler,
        })
    }
}

/// A client registration: an ephemeral source port plus a response callback
pub struct Client {
    inner: Arc<Inner>,
    port: u16,
    sender: Arc<Mutex<Sender>>,
    handler: Arc<Mutex<ResponseHandler>>,
}

impl Client {
    /// The ephemeral port this client listens on
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current state of the outstanding transfer
    pub fn state(&self) -> XferState {
        self.sender.lock().unwrap().state
    }

    /// Sends a request for a resource to a host
    ///
    /// A fresh message ID and token are drawn for the request and recorded for response
    /// matching. Returns the size of the datagram handed to the transport; on failure the
    /// sender moves to [`XferState::Fail`] and the response callback is invoked before the
    /// error is returned.
    pub fn send(
        &self,
        method: Method,
        addr: ipv6::Addr,
        port: u16,
        xfer: &Transfer<'_>,
    ) -> Result<usize, Error> {
        let meta = {
            let mut sender = self.sender.lock().unwrap();

            let mut token = [0; coap::MAX_TOKEN_LENGTH as usize];
            rand::thread_rng().fill(&mut token[..usize(sender.token_len)]);

            sender.meta = Meta {
                msg_type: coap::Type::NonConfirmable,
                code: method.into(),
                message_id: next_message_id(&self.inner),
                token: Token::new(&token[..usize(sender.token_len)]),
            };
            sender.state = XferState::Req;
            sender.meta.clone()
        };

        match send_request(&self.inner, self.port, addr, port, &meta, xfer) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.sender.lock().unwrap().state = XferState::Fail;
                let mut handler = self.handler.lock().unwrap();
                (&mut *handler)(XferState::Fail, &meta, xfer);
                Err(e)
            }
        }
    }
}

/// The message ID is monotonic modulo 2^16 within one process lifetime
fn next_message_id(inner: &Inner) -> u16 {
    inner.message_id.fetch_add(1, Atomic::Relaxed).wrapping_add(1)
}

fn send_request(
    inner: &Inner,
    src_port: u16,
    addr: ipv6::Addr,
    dst_port: u16,
    meta: &Meta,
    xfer: &Transfer<'_>,
) -> Result<usize, Error> {
    let mut scratch = vec![0; inner.config.buffer_size];
    let coap_len = {
        let m = xfer::emit(&mut scratch[..], meta, xfer)?;
        usize(m.len())
    };

    send_datagram(inner, src_port, addr, dst_port, &scratch[..coap_len])
}

/// Layers UDP and IPv6 around the CoAP bytes and hands the datagram to the transport
///
/// The IPv6 source address is left unspecified for the transport to fill in.
fn send_datagram(
    inner: &Inner,
    src_port: u16,
    addr: ipv6::Addr,
    dst_port: u16,
    coap_bytes: &[u8],
) -> Result<usize, Error> {
    let mut chunk =
        vec![0; usize(ipv6::HEADER_SIZE) + usize(udp::HEADER_SIZE) + coap_bytes.len()];
    {
        let mut ip = ipv6::Packet::new(&mut chunk[..]);
        ip.set_destination(addr);
        ip.udp(|udp| {
            udp.set_source(src_port);
            udp.set_destination(dst_port);
            udp.set_payload(coap_bytes);
        });
    }

    let sent = inner.transport.dispatch(&chunk)?;
    log::trace!("coap: msg sent, {} bytes", sent);
    Ok(sent)
}

/// Event/Message loop for the dispatcher thread
fn event_loop(inner: Arc<Inner>, rx: Receiver<Event>) {
    loop {
        let event = match rx.recv() {
            Ok(event) => event,
            Err(_) => return,
        };

        match event {
            Event::Rcv(datagram) => receive(&inner, &datagram),
        }
    }
}

// What the registry lookup resolved a destination port to. The listener data is cloned out so
// the registry lock is released before any handler runs; handlers may call `send`.
enum Route {
    Server(Arc<Vec<Endpoint>>),
    Client(Arc<Mutex<Sender>>, Arc<Mutex<ResponseHandler>>),
}

fn receive(inner: &Arc<Inner>, datagram: &[u8]) {
    let ip = match ipv6::Packet::parse(datagram) {
        Ok(ip) => ip,
        Err(_) => {
            log::debug!("coap: not an IPv6 datagram");
            return;
        }
    };
    if ip.get_next_header() != ipv6::NextHeader::Udp {
        log::debug!("coap: not UDP");
        return;
    }
    let udp = match udp::Packet::parse(ip.payload()) {
        Ok(udp) => udp,
        Err(_) => {
            log::debug!("coap: truncated UDP packet");
            return;
        }
    };

    let dst_port = udp.get_destination();
    let route = {
        let registry = inner.registry.lock().unwrap();
        match registry.find(dst_port) {
            Some(Listener {
                kind: Kind::Server { endpoints },
                ..
            }) => Route::Server(endpoints.clone()),
            Some(Listener {
                kind: Kind::Client { sender, handler },
                ..
            }) => Route::Client(sender.clone(), handler.clone()),
            None => {
                log::debug!("coap: listener not found for port {}", dst_port);
                return;
            }
        }
    };

    // copy into the response buffer before parsing
    let n = udp.payload().len();
    let mut buf = vec![0; inner.config.buffer_size];
    if n > buf.len() {
        log::debug!("coap: datagram exceeds response buffer");
        return;
    }
    buf[..n].copy_from_slice(udp.payload());

    let msg = match coap::Message::parse(&buf[..n]) {
        Ok(msg) => msg,
        Err(e) => {
            log::debug!("coap: parse failure: {:?}", e);
            return;
        }
    };

    match route {
        Route::Server(endpoints) => {
            serve(inner, &endpoints, &msg, ip.get_source(), udp.get_source(), dst_port)
        }
        Route::Client(sender, handler) => respond(&sender, &handler, &msg),
    }
}

/// Request handling for a server listener
fn serve(
    inner: &Arc<Inner>,
    endpoints: &[Endpoint],
    msg: &coap::Message<&[u8]>,
    src: ipv6::Addr,
    src_port: u16,
    own_port: u16,
) {
    if !msg.get_code().is_request() {
        log::debug!("coap: not a request, dropping");
        return;
    }
    let method = match Method::try_from(msg.get_code()) {
        Ok(method) => method,
        Err(()) => {
            log::debug!("coap: unknown method {}", msg.get_code());
            return;
        }
    };

    let mut scratch = vec![0; inner.config.url_max];
    match msg.read_path(&mut scratch) {
        Ok(path) => log::debug!("coap: request for {}", path),
        Err(_) => log::debug!("coap: request path unprintable"),
    }

    let mut out = vec![0; inner.config.buffer_size];
    let outcome: Result<usize, crate::error::Error> = (|| {
        let mut reply = Reply::new(msg, coap::Response::Content, &mut out[..])?;
        let path = Path::Options(msg.options());

        // the discovery resource is built in and served ahead of the table
        if method == Method::Get
            && xfer::path_cmp(&path, endpoint::WELL_KNOWN_CORE) == Ordering::Equal
        {
            endpoint::well_known_core(endpoints, &mut reply)?;
            return Ok(reply.finish());
        }

        match endpoint::find(endpoints, &path, method) {
            Some(ep) => {
                (ep.handler)(msg, &mut reply)?;
                Ok(reply.finish())
            }
            None => {
                reply.header(coap::Response::NotFound);
                Ok(reply.finish())
            }
        }
    })();

    let total = match outcome {
        Ok(total) => total,
        // a failed handler collapses to 5.00
        Err(_) => match Reply::new(msg, coap::Response::InternalServerError, &mut out[..]) {
            Ok(reply) => reply.finish(),
            Err(_) => return,
        },
    };

    if let Err(e) = send_datagram(inner, own_port, src, src_port, &out[..total]) {
        log::debug!("coap: msg send failed: {}", e);
    }
}

/// Response handling for a client listener
fn respond(
    sender: &Arc<Mutex<Sender>>,
    handler: &Arc<Mutex<ResponseHandler>>,
    msg: &coap::Message<&[u8]>,
) {
    if !msg.get_code().is_response() {
        log::debug!("coap: not a response, dropping");
        return;
    }

    let meta = Meta {
        msg_type: msg.get_type(),
        code: msg.get_code(),
        message_id: msg.get_message_id(),
        token: Token::new(msg.token()),
    };

    {
        let mut sender = sender.lock().unwrap();
        if sender.state != XferState::Req {
            // the sender already transitioned; a late or replayed response
            log::debug!("coap: no outstanding request, dropping response");
            return;
        }
        if sender.meta.token != meta.token {
            // replays and cross-talk are ignored
            log::debug!("coap: {}, dropping response", Error::TokenMismatch);
            return;
        }
        sender.state = XferState::Success;
    }

    let xfer = match Transfer::from_message(msg) {
        Ok(xfer) => xfer,
        Err(e) => {
            log::debug!("coap: parse failure: {:?}", e);
            return;
        }
    };

    let mut handler = handler.lock().unwrap();
    (&mut *handler)(XferState::Success, &meta, &xfer);
}
