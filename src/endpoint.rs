//! Server endpoints
//!
//! An [`Endpoint`] ties a resource path and a request method to a handler. A listener keeps its
//! endpoints sorted lexicographically by path; [`find`] relies on that ordering to stop scanning
//! as soon as no later entry can match.
//!
//! Handlers run synchronously inside the dispatcher loop and must not block for long. A handler
//! that fails makes the dispatcher rewrite the response as 5.00 Internal Server Error.

use core::cmp::Ordering;

use crate::coap::{self, ContentFormat, Method, Response};
use crate::reply::Reply;
use crate::xfer::{self, Path};
use crate::Error;

/// Path of the built-in resource discovery endpoint
pub const WELL_KNOWN_CORE: &str = "/.well-known/core";

/// A request handler: the parsed request and the reply under construction
pub type Handler = fn(&coap::Message<&[u8]>, &mut Reply<'_>) -> Result<(), Error>;

/// A server resource: path, method and handler
#[derive(Clone, Copy)]
pub struct Endpoint {
    /// Absolute path of the resource
    pub path: &'static str,
    /// Request method this endpoint answers
    pub method: Method,
    /// Handler filling in the response
    pub handler: Handler,
}

/// Finds the endpoint matching a request path and method
///
/// `endpoints` must be sorted lexicographically by path. The scan stops early once an endpoint
/// path orders after the request path.
pub fn find<'e>(endpoints: &'e [Endpoint], path: &Path<'_>, method: Method) -> Option<&'e Endpoint> {
    debug_assert!(endpoints.windows(2).all(|w| w[0].path <= w[1].path));

    for ep in endpoints {
        match xfer::path_cmp(path, ep.path) {
            // no later entry can match
            Ordering::Less => break,
            Ordering::Greater => continue,
            Ordering::Equal => {
                if ep.method == method {
                    return Some(ep);
                }
            }
        }
    }

    None
}

/// Writes the resource discovery payload into `reply`
///
/// Lists every endpoint of the listener as `</path1>,</path2>` with media type
/// application/link-format. An empty table produces a 2.05 response with no payload.
pub fn well_known_core(endpoints: &[Endpoint], reply: &mut Reply<'_>) -> Result<(), Error> {
    reply.header(Response::Content);

    let mut first = true;
    for ep in endpoints {
        if !first {
            reply.write(b",")?;
        }
        reply.write(b"<")?;
        reply.write(ep.path.as_bytes())?;
        reply.write(b">")?;
        first = false;
    }

    if !first {
        reply.content(ContentFormat::ApplicationLinkFormat);
    }

    Ok(())
}
