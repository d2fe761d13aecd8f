use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};

use crate::error::Result;

/// A connected database server stream — implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations.
/// Today this wraps a TCP stream; a TLS-wrapped variant would slot in
/// here without touching the packet layer above.
pub struct DbStream {
    inner: DbStreamInner,
}

enum DbStreamInner {
    Tcp(std::net::TcpStream),
}

impl Read for DbStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DbStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for DbStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DbStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            DbStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl DbStream {
    /// Create a DbStream from a TCP stream.
    pub(crate) fn from_tcp(stream: std::net::TcpStream) -> Self {
        Self {
            inner: DbStreamInner::Tcp(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            DbStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            DbStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            DbStreamInner::Tcp(stream) => {
                let cloned = stream.try_clone()?;
                Ok(Self::from_tcp(cloned))
            }
        }
    }

    /// Shut down both halves of the stream.
    ///
    /// Any blocked read on a clone of this stream returns immediately.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            DbStreamInner::Tcp(stream) => match stream.shutdown(Shutdown::Both) {
                Ok(()) => Ok(()),
                // Already torn down by the peer; nothing left to do.
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(err.into()),
            },
        }
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            DbStreamInner::Tcp(stream) => stream.peer_addr().map_err(Into::into),
        }
    }
}

impl std::fmt::Debug for DbStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            DbStreamInner::Tcp(_) => f.debug_struct("DbStream").field("type", &"tcp").finish(),
        }
    }
}
