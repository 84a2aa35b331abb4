//! Very simple CoAP client and server

#![deny(rust_2018_compatibility)]
#![deny(rust_2018_idioms)]

use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::channel;
use std::thread;
use std::time::Duration;

use clap::{App, AppSettings, Arg, SubCommand};
use exitfailure::ExitFailure;
use failure::{bail, format_err, Error, ResultExt};
use ucoap::coap::{self, ContentFormat, Method, Response};
use ucoap::endpoint::Endpoint;
use ucoap::reply::Reply;
use ucoap::stack::transport::UdpTransport;
use ucoap::stack::{Coap, Config, XferState};
use ucoap::xfer::Transfer;

/// How long the client waits for a response before giving up
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<(), ExitFailure> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
        .ok();

    let request_args = |cmd: App<'static, 'static>| {
        cmd.arg(
            Arg::with_name("addr")
                .help("IPv6 address of the server")
                .required(true)
                .value_name("ADDR"),
        )
        .arg(
            Arg::with_name("port")
                .help("UDP port of the server")
                .required(true)
                .value_name("PORT"),
        )
        .arg(
            Arg::with_name("path")
                .help("absolute path of the resource")
                .required(true)
                .value_name("PATH"),
        )
        .arg(
            Arg::with_name("data")
                .help("text payload of the request")
                .value_name("DATA"),
        )
        .arg(
            Arg::with_name("token-length")
                .help("token length to use for the request, 0 to 8")
                .short("t")
                .long("token-length")
                .takes_value(true)
                .value_name("LEN"),
        )
    };

    let matches = App::new("coap")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(request_args(
            SubCommand::with_name("get").about("GET a resource"),
        ))
        .subcommand(request_args(
            SubCommand::with_name("post").about("POST a resource"),
        ))
        .subcommand(request_args(
            SubCommand::with_name("put").about("PUT a resource"),
        ))
        .subcommand(
            SubCommand::with_name("server")
                .about("serve CoAP requests")
                .arg(
                    Arg::with_name("port")
                        .help("UDP port to listen on")
                        .required(true)
                        .value_name("PORT"),
                ),
        )
        .subcommand(
            SubCommand::with_name("token")
                .about("validate a token length")
                .arg(
                    Arg::with_name("length")
                        .help("length in bytes, 0 to 8")
                        .required(true)
                        .value_name("LEN"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        ("get", Some(sub)) => request(Method::Get, sub),
        ("post", Some(sub)) => request(Method::Post, sub),
        ("put", Some(sub)) => request(Method::Put, sub),
        ("server", Some(sub)) => server(sub.value_of("port").unwrap()),
        ("token", Some(sub)) => token(sub.value_of("length").unwrap()),
        _ => unreachable!(),
    }?;

    Ok(())
}

fn request(method: Method, matches: &clap::ArgMatches<'_>) -> Result<(), Error> {
    let addr: Ipv6Addr = matches
        .value_of("addr")
        .unwrap()
        .parse::<Ipv6Addr>()
        .context("parsing destination address")?;
    let port: u16 = matches
        .value_of("port")
        .unwrap()
        .parse::<u16>()
        .context("parsing destination port")?;
    let path = matches.value_of("path").unwrap();

    let token_length: u8 = matches
        .value_of("token-length")
        .unwrap_or("0")
        .parse::<u8>()
        .context("parsing token length")?;
    if token_length > 8 {
        bail!("token length must be 0 to 8");
    }

    let coap = Coap::init(Config::default(), UdpTransport::new())
        .map_err(|e| format_err!("starting the stack: {}", e))?;

    let (tx, rx) = channel();
    let client = coap
        .register_client(token_length, move |state, meta, xfer| {
            tx.send((state, meta.code, xfer.payload.to_vec(), xfer.format))
                .ok();
        })
        .map_err(|e| format_err!("registering the client: {}", e))?;

    let mut xfer = Transfer::new(path);
    if let Some(data) = matches.value_of("data") {
        xfer = xfer.with_payload(data.as_bytes(), ContentFormat::TextPlain);
    }

    match client.send(method, addr.into(), port, &xfer) {
        Ok(n) => eprintln!("coap: msg sent, {} bytes", n),
        Err(e) => {
            eprintln!("coap: msg send failed");
            bail!("{}", e);
        }
    }

    let (state, code, payload, format) = match rx.recv_timeout(RESPONSE_TIMEOUT) {
        Ok(rsp) => rsp,
        Err(_) => bail!("timed out waiting for a response"),
    };

    let class = if state == XferState::Success && code.class() == 2 {
        "Success"
    } else {
        "Error"
    };
    eprintln!("coap: response {}, code {}", class, code);

    if payload.is_empty() {
        eprintln!("coap: empty payload");
    } else {
        match format {
            Some(ContentFormat::TextPlain) | Some(ContentFormat::ApplicationLinkFormat) => {
                println!("{}", String::from_utf8_lossy(&payload));
            }
            _ => println!("{:?}", payload),
        }
    }

    Ok(())
}

static STATS: AtomicU8 = AtomicU8::new(0);

/// Reports how many times it has been read, as a single octet
fn stats_handler(msg: &coap::Message<&[u8]>, reply: &mut Reply<'_>) -> Result<(), ucoap::Error> {
    let mut scratch = [0; 64];
    if let Ok(path) = msg.read_path(&mut scratch) {
        eprintln!("coap: request for {}", path);
    }

    let count = STATS.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    reply.header(Response::Content);
    reply.write(&[count])?;
    reply.content(ContentFormat::ApplicationOctetStream);
    Ok(())
}

fn server(port: &str) -> Result<(), Error> {
    let port: u16 = port.parse::<u16>().context("parsing port")?;
    if port == 0 {
        bail!("invalid port specified");
    }

    let coap = Coap::init(Config::default(), UdpTransport::new())
        .map_err(|e| format_err!("starting the stack: {}", e))?;

    coap.start_server(
        port,
        vec![Endpoint {
            path: "/cli/stats",
            method: Method::Get,
            handler: stats_handler,
        }],
    )
    .map_err(|e| format_err!("starting the server: {}", e))?;

    eprintln!("coap: started CoAP server on port {}", port);

    loop {
        thread::park();
    }
}

fn token(length: &str) -> Result<(), Error> {
    let length: u8 = length.parse::<u8>().context("parsing token length")?;
    if length > 8 {
        bail!("token length must be 0 to 8");
    }

    println!("{}", length);
    Ok(())
}
