//! Transport abstractions shared by the accept loop and the connection handler.
//!
//! The server only needs two capabilities from a transport: accepting byte
//! streams, and reporting the vsock addresses on both ends of a stream. Both
//! are traits so the accept loop can run over real vsock in production and
//! over in-memory pipes in tests.

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Hypervisor CID, reserved.
pub const CID_HYPERVISOR: u32 = 0;

/// Local (loopback) CID.
pub const CID_LOCAL: u32 = 1;

/// Host CID (always 2 for the host)
pub const CID_HOST: u32 = 2;

/// Listen on any CID
pub const CID_ANY: u32 = u32::MAX;

/// CID assigned to the enclave by default
pub const ENCLAVE_CID: u32 = 16;

/// Default port to listen on
pub const DEFAULT_PORT: u32 = 8080;

/// A virtual socket address: context identifier plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub cid: u32,
    pub port: u32,
}

impl Address {
    pub const fn new(cid: u32, port: u32) -> Self {
        Self { cid, port }
    }

    /// Name of the role a well-known CID plays, if any.
    pub fn role(&self) -> Option<&'static str> {
        match self.cid {
            CID_HYPERVISOR => Some("hypervisor"),
            CID_LOCAL => Some("local"),
            CID_HOST => Some("host"),
            CID_ANY => Some("any"),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role() {
            Some(role) => write!(f, "{}({}):{}", role, self.cid, self.port),
            None => write!(f, "vm({}):{}", self.cid, self.port),
        }
    }
}

/// Address information carried by an accepted connection.
pub trait Endpoint {
    fn local_address(&self) -> io::Result<Address>;
    fn remote_address(&self) -> io::Result<Address>;
}

/// A stream the connection handler can own and serve.
pub trait Connection: AsyncRead + AsyncWrite + Endpoint + Unpin + Send + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Endpoint + Unpin + Send + 'static {}

/// A bound listener producing inbound connections.
#[async_trait]
pub trait Acceptor: Send + 'static {
    type Conn: Connection;

    /// Wait for the next inbound connection.
    ///
    /// An error is terminal: the accept loop reports it and stops.
    async fn accept(&mut self) -> io::Result<Self::Conn>;

    /// The address this listener is bound to.
    fn local_address(&self) -> io::Result<Address>;

    /// Release the bound address. Safe to call more than once.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_guest() {
        let addr = Address::new(16, 8080);
        assert_eq!(addr.to_string(), "vm(16):8080");
    }

    #[test]
    fn test_address_display_well_known() {
        assert_eq!(Address::new(CID_HOST, 52000).to_string(), "host(2):52000");
        assert_eq!(
            Address::new(CID_ANY, 8080).to_string(),
            "any(4294967295):8080"
        );
    }

    #[test]
    fn test_address_role() {
        assert_eq!(Address::new(CID_HYPERVISOR, 1).role(), Some("hypervisor"));
        assert_eq!(Address::new(CID_LOCAL, 1).role(), Some("local"));
        assert_eq!(Address::new(ENCLAVE_CID, 1).role(), None);
    }
}
