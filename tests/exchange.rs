//! End-to-end request/response exchanges over an in-process transport
//!
//! One stack hosts both the server and the client listeners; the loopback transport feeds every
//! dispatched datagram straight back into the stack's message queue, which exercises the whole
//! path: emit -> UDP/IPv6 layering -> port demux -> parse -> endpoint dispatch -> reply ->
//! response demux -> token match -> callback.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{channel, Sender as ChannelSender};
use std::sync::Mutex;
use std::time::Duration;

use ucoap::coap::{self, ContentFormat, Method, Response};
use ucoap::endpoint::Endpoint;
use ucoap::nethead::{self, Nethead};
use ucoap::reply::Reply;
use ucoap::stack::transport::{Mailbox, Transport};
use ucoap::stack::{Coap, Config, XferState};
use ucoap::xfer::{Token, Transfer};
use ucoap::{ipv6, Error};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Feeds every dispatched datagram back into the stack's own message queue
struct Loopback {
    mailbox: Mutex<Option<Mailbox>>,
    ports: Mutex<Vec<u16>>,
}

impl Loopback {
    fn new() -> Self {
        Loopback {
            mailbox: Mutex::new(None),
            ports: Mutex::new(Vec::new()),
        }
    }
}

impl Transport for Loopback {
    fn bound(&self, port: u16) -> bool {
        self.ports.lock().unwrap().contains(&port)
    }

    fn bind(&self, port: u16, mailbox: Mailbox) -> Result<(), Error> {
        self.ports.lock().unwrap().push(port);
        *self.mailbox.lock().unwrap() = Some(mailbox);
        Ok(())
    }

    fn dispatch(&self, datagram: &[u8]) -> Result<usize, Error> {
        let mailbox = self
            .mailbox
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::TransportFailed)?;
        mailbox.deliver(datagram.to_vec())?;
        Ok(datagram.len())
    }
}

/// A response as seen by a client callback
#[derive(Debug)]
struct Rsp {
    state: XferState,
    code_class: u8,
    code_detail: u8,
    message_id: u16,
    token: Token,
    payload: Vec<u8>,
    format: Option<ContentFormat>,
}

fn recorder(tx: ChannelSender<Rsp>) -> impl FnMut(XferState, &ucoap::xfer::Meta, &Transfer<'_>) + Send {
    move |state, meta, xfer| {
        tx.send(Rsp {
            state,
            code_class: meta.code.class(),
            code_detail: meta.code.detail(),
            message_id: meta.message_id,
            token: meta.token,
            payload: xfer.payload.to_vec(),
            format: xfer.format,
        })
        .ok();
    }
}

#[test]
fn discovery_on_empty_server() {
    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();
    coap.start_server(coap::PORT, vec![]).unwrap();

    let (tx, rx) = channel();
    let client = coap.register_client(1, recorder(tx)).unwrap();

    client
        .send(
            Method::Get,
            ipv6::Addr::LOOPBACK,
            coap::PORT,
            &Transfer::new("/.well-known/core"),
        )
        .unwrap();

    let rsp = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(rsp.state, XferState::Success);
    assert_eq!((rsp.code_class, rsp.code_detail), (2, 5));
    assert_eq!(rsp.payload, b"");
    assert_eq!(client.state(), XferState::Success);
}

#[test]
fn discovery_lists_endpoints() {
    fn nop(_: &coap::Message<&[u8]>, reply: &mut Reply<'_>) -> Result<(), Error> {
        reply.header(Response::Content);
        Ok(())
    }

    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();
    coap.start_server(
        coap::PORT,
        vec![
            Endpoint {
                path: "/nh/lo",
                method: Method::Post,
                handler: nop,
            },
            Endpoint {
                path: "/cli/stats",
                method: Method::Get,
                handler: nop,
            },
        ],
    )
    .unwrap();

    let (tx, rx) = channel();
    let client = coap.register_client(1, recorder(tx)).unwrap();

    client
        .send(
            Method::Get,
            ipv6::Addr::LOOPBACK,
            coap::PORT,
            &Transfer::new("/.well-known/core"),
        )
        .unwrap();

    let rsp = rx.recv_timeout(TIMEOUT).unwrap();
    // the table was sorted on registration
    assert_eq!(rsp.payload, b"</cli/stats>,</nh/lo>");
    assert_eq!(rsp.format, Some(ContentFormat::ApplicationLinkFormat));
}

#[test]
fn unknown_path_is_not_found() {
    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();
    coap.start_server(coap::PORT, vec![]).unwrap();

    let (tx, rx) = channel();
    let client = coap.register_client(2, recorder(tx)).unwrap();

    client
        .send(
            Method::Get,
            ipv6::Addr::LOOPBACK,
            coap::PORT,
            &Transfer::new("/unknown"),
        )
        .unwrap();

    let rsp = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(rsp.state, XferState::Success);
    assert_eq!((rsp.code_class, rsp.code_detail), (4, 4));
    assert_eq!(rsp.payload, b"");
    // the request token is echoed
    assert_eq!(rsp.token.len(), 2);
}

#[test]
fn counter_endpoint() {
    static COUNT: AtomicU8 = AtomicU8::new(0);

    fn stats(_: &coap::Message<&[u8]>, reply: &mut Reply<'_>) -> Result<(), Error> {
        let count = COUNT.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        reply.header(Response::Content);
        reply.write(&[count])?;
        reply.content(ContentFormat::ApplicationOctetStream);
        Ok(())
    }

    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();
    coap.start_server(
        coap::PORT,
        vec![Endpoint {
            path: "/cli/stats",
            method: Method::Get,
            handler: stats,
        }],
    )
    .unwrap();

    let (tx, rx) = channel();
    let client = coap.register_client(1, recorder(tx)).unwrap();

    client
        .send(
            Method::Get,
            ipv6::Addr::LOOPBACK,
            coap::PORT,
            &Transfer::new("/cli/stats"),
        )
        .unwrap();

    let rsp = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!((rsp.code_class, rsp.code_detail), (2, 5));
    assert_eq!(rsp.payload, [1]);
    assert_eq!(rsp.format, Some(ContentFormat::ApplicationOctetStream));
}

#[test]
fn failing_handler_becomes_5_00() {
    fn broken(_: &coap::Message<&[u8]>, reply: &mut Reply<'_>) -> Result<(), Error> {
        reply.header(Response::Content);
        // way past the 128-byte response buffer
        reply.write(&[0; 256])?;
        Ok(())
    }

    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();
    coap.start_server(
        coap::PORT,
        vec![Endpoint {
            path: "/broken",
            method: Method::Get,
            handler: broken,
        }],
    )
    .unwrap();

    let (tx, rx) = channel();
    let client = coap.register_client(1, recorder(tx)).unwrap();

    client
        .send(
            Method::Get,
            ipv6::Addr::LOOPBACK,
            coap::PORT,
            &Transfer::new("/broken"),
        )
        .unwrap();

    let rsp = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!((rsp.code_class, rsp.code_detail), (5, 0));
    assert_eq!(rsp.payload, b"");
}

#[test]
fn message_id_is_monotonic() {
    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();
    coap.start_server(coap::PORT, vec![]).unwrap();

    let (tx, rx) = channel();
    let client = coap.register_client(1, recorder(tx)).unwrap();

    client
        .send(
            Method::Get,
            ipv6::Addr::LOOPBACK,
            coap::PORT,
            &Transfer::new("/unknown"),
        )
        .unwrap();
    let first = rx.recv_timeout(TIMEOUT).unwrap();

    client
        .send(
            Method::Get,
            ipv6::Addr::LOOPBACK,
            coap::PORT,
            &Transfer::new("/unknown"),
        )
        .unwrap();
    let second = rx.recv_timeout(TIMEOUT).unwrap();

    // the response echoes the request's message ID
    assert_eq!(second.message_id, first.message_id.wrapping_add(1));
}

#[test]
fn nethead_hello() {
    fn hello(msg: &coap::Message<&[u8]>, reply: &mut Reply<'_>) -> Result<(), Error> {
        assert_eq!(msg.payload().len(), 8);
        assert_eq!(
            msg.content_format()?,
            Some(ContentFormat::ApplicationOctetStream)
        );
        reply.header(Response::Changed);
        Ok(())
    }

    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();
    coap.start_server(
        coap::PORT,
        vec![Endpoint {
            path: nethead::PATH_HELLO,
            method: Method::Post,
            handler: hello,
        }],
    )
    .unwrap();

    let (tx, rx) = channel();
    let agent = Nethead::init(
        &coap,
        ipv6::Addr::LOOPBACK,
        coap::PORT,
        [0xec, 0x0b, 0xfb, 0x0f, 0x76, 0xb9, 0xf3, 0x93],
        move |state| {
            tx.send(state).ok();
        },
    )
    .unwrap();

    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        nethead::State::HelloAck
    );
    assert_eq!(agent.op_state(), nethead::State::HelloAck);
}

#[test]
fn ephemeral_ports_are_sequential() {
    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();

    let a = coap.register_client(0, |_, _, _| {}).unwrap();
    let b = coap.register_client(0, |_, _, _| {}).unwrap();
    let c = coap.register_client(0, |_, _, _| {}).unwrap();

    assert_eq!(a.port(), 20000);
    assert_eq!(b.port(), 20001);
    assert_eq!(c.port(), 20002);
}

#[test]
fn exhausted_ephemeral_range() {
    let config = Config {
        ephemeral_ports: (20000, 20001),
        ..Config::default()
    };
    let coap = Coap::init(config, Loopback::new()).unwrap();

    coap.register_client(0, |_, _, _| {}).unwrap();
    coap.register_client(0, |_, _, _| {}).unwrap();
    assert_eq!(
        coap.register_client(0, |_, _, _| {}).err().unwrap(),
        Error::NoPortAvailable
    );
}

#[test]
fn server_port_conflict() {
    let coap = Coap::init(Config::default(), Loopback::new()).unwrap();

    coap.start_server(coap::PORT, vec![]).unwrap();
    assert_eq!(
        coap.start_server(coap::PORT, vec![]).unwrap_err(),
        Error::AlreadyRegistered
    );
}

#[test]
fn send_failure_reports_fail_state() {
    /// Refuses every datagram
    struct Down;

    impl Transport for Down {
        fn bound(&self, _: u16) -> bool {
            false
        }
        fn bind(&self, _: u16, _: Mailbox) -> Result<(), Error> {
            Ok(())
        }
        fn dispatch(&self, _: &[u8]) -> Result<usize, Error> {
            Err(Error::TransportFailed)
        }
    }

    let coap = Coap::init(Config::default(), Down).unwrap();

    let (tx, rx) = channel();
    let client = coap.register_client(1, recorder(tx)).unwrap();

    assert_eq!(
        client
            .send(
                Method::Get,
                ipv6::Addr::LOOPBACK,
                coap::PORT,
                &Transfer::new("/unknown"),
            )
            .unwrap_err(),
        Error::TransportFailed
    );

    let rsp = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(rsp.state, XferState::Fail);
    assert_eq!(client.state(), XferState::Fail);
}
