//! Listener registry
//!
//! Every listener owns one UDP port; the registry keeps ports unique so the dispatcher can
//! demultiplex inbound datagrams by destination port alone. Iteration order is insertion order
//! and the list is append-only.

use std::sync::{Arc, Mutex};

use crate::endpoint::Endpoint;
use crate::stack::transport::Transport;
use crate::xfer::{Meta, Token, Transfer};
use crate::{coap, Error};

/// State of a resource transfer driven by a sender
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum XferState {
    /// No messaging yet
    Init,
    /// Request sent
    Req,
    /// Request failed
    Fail,
    /// Got a response
    Success,
}

/// An outbound-request holder awaiting a response
///
/// Tracks the metadata of the last request sent so the dispatcher can match the response token
/// against it.
pub struct Sender {
    pub(crate) state: XferState,
    pub(crate) meta: Meta,
    pub(crate) token_len: u8,
}

impl Sender {
    pub(crate) fn new(token_len: u8) -> Self {
        Sender {
            state: XferState::Init,
            meta: Meta {
                msg_type: coap::Type::NonConfirmable,
                code: coap::Code::EMPTY,
                message_id: 0,
                token: Token::EMPTY,
            },
            token_len,
        }
    }

    /// State of the messaging to complete the transfer
    pub fn state(&self) -> XferState {
        self.state
    }
}

pub(crate) type ResponseHandler = Box<dyn FnMut(XferState, &Meta, &Transfer<'_>) + Send>;

pub(crate) enum Kind {
    Server {
        endpoints: Arc<Vec<Endpoint>>,
    },
    Client {
        sender: Arc<Mutex<Sender>>,
        handler: Arc<Mutex<ResponseHandler>>,
    },
}

pub(crate) struct Listener {
    pub(crate) port: u16,
    pub(crate) kind: Kind,
}

pub(crate) struct Registry {
    listeners: Vec<Listener>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            listeners: Vec::new(),
        }
    }

    /// Appends a listener; fails when its port is already taken
    pub(crate) fn insert(&mut self, listener: Listener) -> Result<(), Error> {
        if self.find(listener.port).is_some() {
            return Err(Error::AlreadyRegistered);
        }
        self.listeners.push(listener);
        Ok(())
    }

    /// Looks up the listener bound to `port`
    pub(crate) fn find(&self, port: u16) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.port == port)
    }

    /// Picks the first free port in the ephemeral `range`
    ///
    /// A port is free when neither this registry nor the transport has a binding for it.
    pub(crate) fn allocate(
        &self,
        range: (u16, u16),
        transport: &dyn Transport,
    ) -> Result<u16, Error> {
        let (min, max) = range;
        let mut candidate = min;

        loop {
            if self.find(candidate).is_none() && !transport.bound(candidate) {
                return Ok(candidate);
            }
            if candidate == max {
                return Err(Error::NoPortAvailable);
            }
            candidate += 1;
        }
    }
}
