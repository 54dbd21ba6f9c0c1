//! Vsock transport
//!
//! Guest-side listener for virtio-vsock (Nitro Enclaves, Firecracker).
//! Binds a (cid, port) pair and hands accepted streams to the server.

use async_trait::async_trait;
use std::io;
use tokio_vsock::{VsockAddr, VsockListener, VsockStream};

use crate::transport::{Acceptor, Address, Endpoint};

impl From<VsockAddr> for Address {
    fn from(addr: VsockAddr) -> Self {
        Address::new(addr.cid(), addr.port())
    }
}

impl From<Address> for VsockAddr {
    fn from(addr: Address) -> Self {
        VsockAddr::new(addr.cid, addr.port)
    }
}

impl Endpoint for VsockStream {
    fn local_address(&self) -> io::Result<Address> {
        self.local_addr().map(Address::from)
    }

    fn remote_address(&self) -> io::Result<Address> {
        self.peer_addr().map(Address::from)
    }
}

/// A bound vsock listener.
pub struct VsockTransport {
    inner: Option<VsockListener>,
    address: Address,
}

impl VsockTransport {
    /// Bind a vsock listener on the given address.
    pub fn bind(address: Address) -> io::Result<Self> {
        let listener = VsockListener::bind(address.into())?;
        Ok(Self {
            inner: Some(listener),
            address,
        })
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

#[async_trait]
impl Acceptor for VsockTransport {
    type Conn = VsockStream;

    async fn accept(&mut self) -> io::Result<VsockStream> {
        let Some(listener) = self.inner.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "vsock listener is closed",
            ));
        };
        let (stream, _peer) = listener.accept().await?;
        Ok(stream)
    }

    fn local_address(&self) -> io::Result<Address> {
        match &self.inner {
            Some(listener) => listener.local_addr().map(Address::from),
            None => Ok(self.address),
        }
    }

    fn close(&mut self) {
        // Dropping the listener closes the socket.
        self.inner.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_conversion() {
        let addr = Address::new(16, 8080);
        let vsock: VsockAddr = addr.into();
        assert_eq!(vsock.cid(), 16);
        assert_eq!(vsock.port(), 8080);
        assert_eq!(Address::from(vsock), addr);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_accept() {
        let address = Address::new(16, 8080);
        let mut transport = VsockTransport {
            inner: None,
            address,
        };

        transport.close();
        transport.close();
        assert!(transport.is_closed());

        match transport.accept().await {
            Ok(_) => panic!("accept succeeded on a closed listener"),
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::NotConnected),
        }
        assert_eq!(transport.local_address().unwrap(), address);
    }
}
