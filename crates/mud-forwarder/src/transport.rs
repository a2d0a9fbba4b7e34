// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram endpoint abstraction.
//!
//! The forwarder owns exactly one endpoint between `start` and `stop`.
//! [`UdpEndpoint`] is the host implementation; mesh stack adapters provide
//! their own.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6, UdpSocket};
use std::time::Duration;

/// Well-known MUD notification port.
pub const MUD_PORT: u16 = 1234;

/// Default listen address: unspecified IPv6 address on the MUD port.
pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, MUD_PORT, 0, 0))
}

/// A bindable datagram endpoint.
pub trait DatagramEndpoint {
    /// Bind to a local address.
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()>;

    /// True between a successful `bind` and `close`.
    fn is_open(&self) -> bool;

    /// Receive one datagram if one is pending.
    ///
    /// Returns `Ok(None)` when nothing arrived within the endpoint's wait
    /// budget.
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Bound address, if open.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Release the endpoint. Calling it on a closed endpoint is a no-op.
    fn close(&mut self);
}

/// UDP endpoint built on `socket2`.
#[derive(Debug, Default)]
pub struct UdpEndpoint {
    socket: Option<UdpSocket>,
    /// `None` blocks indefinitely in `recv_from`
    read_timeout: Option<Duration>,
}

impl UdpEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the wait in `recv_from` so a caller loop can check for shutdown.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

impl DatagramEndpoint for UdpEndpoint {
    fn bind(&mut self, addr: SocketAddr) -> io::Result<()> {
        if self.socket.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                "endpoint already bound",
            ));
        }

        // No SO_REUSEADDR: the forwarder is the port's only owner.
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        if addr.is_ipv6() {
            socket.set_only_v6(true)?;
        }
        socket.bind(&addr.into())?;

        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(self.read_timeout)?;
        tracing::debug!("UDP endpoint bound to {}", socket.local_addr()?);
        self.socket = Some(socket);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "endpoint not bound"))?;

        match socket.recv_from(buf) {
            Ok((len, from)) => Ok(Some((len, from))),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            tracing::debug!("UDP endpoint closed ({:?})", socket.local_addr().ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listen_addr() {
        let addr = default_listen_addr();
        assert_eq!(addr.port(), 1234);
        assert!(addr.ip().is_unspecified());
        assert!(addr.is_ipv6());
    }

    #[test]
    fn test_bind_close_lifecycle() {
        let mut endpoint = UdpEndpoint::new().with_read_timeout(Duration::from_millis(10));
        assert!(!endpoint.is_open());

        endpoint.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(endpoint.is_open());
        assert!(endpoint.local_addr().is_some());

        let err = endpoint.bind("127.0.0.1:0".parse().unwrap()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);

        endpoint.close();
        assert!(!endpoint.is_open());
        endpoint.close();
    }

    #[test]
    fn test_recv_timeout_returns_none() {
        let mut endpoint = UdpEndpoint::new().with_read_timeout(Duration::from_millis(10));
        endpoint.bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let mut buf = [0u8; 64];
        assert!(endpoint.recv_from(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_recv_on_closed_endpoint() {
        let mut endpoint = UdpEndpoint::new();
        let mut buf = [0u8; 8];
        let err = endpoint.recv_from(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_recv_datagram() {
        let mut endpoint = UdpEndpoint::new().with_read_timeout(Duration::from_secs(2));
        endpoint.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let target = endpoint.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"ping", target).unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = endpoint.recv_from(&mut buf).unwrap().expect("datagram");
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, sender.local_addr().unwrap());
    }
}
