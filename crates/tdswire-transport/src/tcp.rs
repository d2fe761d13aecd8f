use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::DbStream;

/// TCP transport.
///
/// Provides bind/accept/connect over TCP. The listening side exists mainly
/// for diagnostics and tests; a real deployment only ever connects out to a
/// database server.
pub struct TcpTransport {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on a TCP address.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let display = addr.to_string();
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: display,
            source: e,
        })?;
        let addr = listener.local_addr()?;

        info!(%addr, "listening on tcp");

        Ok(Self { listener, addr })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<DbStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true).map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(DbStream::from_tcp(stream))
    }

    /// Connect to a listening server (blocking).
    ///
    /// Nagle is disabled on the new stream: the protocol exchanges small
    /// request/response packets and write latency dominates throughput.
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<DbStream> {
        let addr_str = addr.to_string();
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: addr_str.clone(),
            source: e,
        })?;
        stream.set_nodelay(true).map_err(|e| TransportError::Connect {
            addr: addr_str.clone(),
            source: e,
        })?;
        debug!(addr = %addr_str, "connected");
        Ok(DbStream::from_tcp(stream))
    }

    /// The address this transport is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn bind_accept_connect() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let handle = std::thread::spawn(move || {
            let mut client = TcpTransport::connect(addr).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn connect_refused() {
        // Port 1 is essentially never listening on loopback.
        let result = TcpTransport::connect("127.0.0.1:1");
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn try_clone_shares_connection() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let handle = std::thread::spawn(move || {
            let client = TcpTransport::connect(addr).unwrap();
            let mut clone = client.try_clone().unwrap();
            clone.write_all(b"via-clone").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 9];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"via-clone");

        handle.join().unwrap();
    }

    #[test]
    fn shutdown_unblocks_reader() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let client = TcpTransport::connect(addr).unwrap();
        let mut reader = client.try_clone().unwrap();
        let _server = listener.accept().unwrap();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        client.shutdown().unwrap();

        let read = handle.join().unwrap().unwrap();
        assert_eq!(read, 0, "shutdown should surface as EOF");
    }

    #[test]
    fn shutdown_is_idempotent() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();

        let client = TcpTransport::connect(addr).unwrap();
        let _server = listener.accept().unwrap();

        client.shutdown().unwrap();
        client.shutdown().unwrap();
    }
}
