//! Nethead: a registration client for a network monitoring manager
//!
//! On startup the agent POSTs a hello to the manager's `/nh/lo` resource, carrying the 8-byte
//! interface identifier of the monitored interface as an octet-stream payload. The manager's
//! response (any success class) acknowledges the registration.

use std::sync::{Arc, Mutex};

use crate::coap::{ContentFormat, Method};
use crate::stack::{Client, Coap, XferState};
use crate::xfer::Transfer;
use crate::{ipv6, Error};

/// Path of the manager's registration resource
pub const PATH_HELLO: &str = "/nh/lo";

/// Operational state of the agent
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum State {
    /// Just started, no messaging yet
    Init,
    /// Hello request sent
    HelloReq,
    /// Hello acknowledged
    HelloAck,
    /// Hello request failed
    HelloFail,
}

/// A Nethead agent registered (or registering) with its manager
pub struct Nethead {
    client: Client,
    state: Arc<Mutex<State>>,
    mgr_addr: ipv6::Addr,
    mgr_port: u16,
    iid: [u8; 8],
}

impl Nethead {
    /// Registers with the manager at `mgr_addr:mgr_port`
    ///
    /// `iid` is the interface identifier of the monitored interface (the low 64 bits of its
    /// link-local address, see [`ipv6::Addr::interface_id`]). The state callback fires on every
    /// transition driven by the manager's response.
    pub fn init<F>(
        coap: &Coap,
        mgr_addr: ipv6::Addr,
        mgr_port: u16,
        iid: [u8; 8],
        state_cbf: F,
    ) -> Result<Nethead, Error>
    where
        F: Fn(State) + Send + 'static,
    {
        let state = Arc::new(Mutex::new(State::Init));

        let cb_state = state.clone();
        let client = coap.register_client(0, move |xfer_state, meta, _xfer| {
            let next = match xfer_state {
                XferState::Success if meta.code.class() == 2 => State::HelloAck,
                _ => State::HelloFail,
            };
            *cb_state.lock().unwrap() = next;
            state_cbf(next);
        })?;

        let nethead = Nethead {
            client,
            state,
            mgr_addr,
            mgr_port,
            iid,
        };
        nethead.hello()?;
        Ok(nethead)
    }

    /// Operational state of the agent
    pub fn op_state(&self) -> State {
        *self.state.lock().unwrap()
    }

    /// (Re)sends the hello request
    pub fn hello(&self) -> Result<(), Error> {
        let xfer = Transfer::new(PATH_HELLO)
            .with_payload(&self.iid, ContentFormat::ApplicationOctetStream);

        // record the request before the response can race it
        *self.state.lock().unwrap() = State::HelloReq;

        match self
            .client
            .send(Method::Post, self.mgr_addr, self.mgr_port, &xfer)
        {
            Ok(_) => Ok(()),
            Err(e) => {
                *self.state.lock().unwrap() = State::HelloFail;
                Err(e)
            }
        }
    }
}
