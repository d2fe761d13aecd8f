use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tdswire_transport::DbStream;

use crate::codec::{decode_packet, Packet, PacketConfig};
use crate::error::{PacketError, Result};
use crate::header::HEADER_SIZE;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete packets from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete packets.
/// A clean end-of-stream between packets surfaces as `ConnectionClosed`;
/// end-of-stream with a partial packet buffered is `Truncated` and the
/// connection must be torn down.
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(PacketError::ConnectionClosed)` on clean EOF and
    /// `Err(PacketError::Truncated)` when the stream ends mid-packet.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buf, self.config.max_packet_size)? {
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(PacketError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Err(PacketError::ConnectionClosed);
                }
                return Err(PacketError::Truncated {
                    expected: self.expected_len(),
                    actual: self.buf.len(),
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    // Best-effort total length of the packet being received, for the
    // Truncated diagnostic. With less than a header buffered, the header
    // itself is what's missing.
    fn expected_len(&self) -> usize {
        if self.buf.len() >= 4 {
            u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize
        } else {
            HEADER_SIZE
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum packet size for subsequent decoding, e.g. after the
    /// server renegotiates it during login.
    pub fn set_max_packet_size(&mut self, max_packet_size: u16) {
        self.config.max_packet_size = max_packet_size;
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

impl PacketReader<DbStream> {
    /// Create a packet reader for `DbStream` and apply the read timeout
    /// from config.
    pub fn with_config_db(inner: DbStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_packet_error)?;
        Ok(Self::with_config(inner, config))
    }
}

fn transport_to_packet_error(err: tdswire_transport::TransportError) -> PacketError {
    match err {
        tdswire_transport::TransportError::Io(io)
        | tdswire_transport::TransportError::Accept(io) => PacketError::Io(io),
        tdswire_transport::TransportError::Bind { source, .. }
        | tdswire_transport::TransportError::Connect { source, .. } => PacketError::Io(source),
        other => PacketError::Io(std::io::Error::other(other.to_string())),
    }
}
