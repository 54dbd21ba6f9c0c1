//! enclave-ack library
//!
//! A minimal HTTP-style endpoint served over virtio-vsock from inside an
//! enclave. Every well-formed request receives the same JSON
//! acknowledgement; malformed requests are dropped without a response.

pub mod config;
pub mod handler;
pub mod logging;
pub mod request;
pub mod response;
pub mod server;
pub mod shutdown;
pub mod transport;
#[cfg(unix)]
pub mod vsock;

#[cfg(test)]
mod test_log;

pub use handler::{ConnectionSettings, HandlerError, handle};
pub use request::{ParseError, ParseLimits, Request, parse_request};
pub use response::{Acknowledgement, Response, WriteError};
pub use server::{Server, ServerError, ServerOptions};
pub use transport::{Acceptor, Address, Connection, Endpoint};
