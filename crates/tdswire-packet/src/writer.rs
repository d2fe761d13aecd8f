use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tdswire_transport::DbStream;

use crate::codec::{encode_packet, Packet, PacketConfig};
use crate::error::{PacketError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Writes complete packets to any `Write` stream.
///
/// Header and payload go out as one atomic unit; partial writes are
/// retried until the whole packet is on the wire, then flushed. The
/// channel id lives inside the header, so writers on different channels
/// must not interleave at the byte level; serialize calls to one writer.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
}

impl<T: Write> PacketWriter<T> {
    /// Create a new packet writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet writer with explicit configuration.
    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete packet (blocking).
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        if packet.header.length > self.config.max_packet_size {
            return Err(PacketError::InvalidLength {
                length: packet.header.length,
                max: self.config.max_packet_size,
            });
        }

        self.buf.clear();
        encode_packet(packet, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(PacketError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(PacketError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(PacketError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum packet size for subsequent encoding.
    pub fn set_max_packet_size(&mut self, max_packet_size: u16) {
        self.config.max_packet_size = max_packet_size;
    }

    /// Current packet writer configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

impl PacketWriter<DbStream> {
    /// Create a packet writer for `DbStream` and apply the write timeout
    /// from config.
    pub fn with_config_db(inner: DbStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
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

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::decode_packet;
    use crate::header::{PacketStatus, PacketType};

    fn eom_packet(msg_type: PacketType, channel: u16, payload: &[u8]) -> Packet {
        let mut packet = Packet::new(msg_type, channel, payload.to_vec());
        packet.header.status = PacketStatus::EOM;
        packet
    }

    #[test]
    fn write_single_packet() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write_packet(&eom_packet(PacketType::Lang, 1, b"hello"))
            .unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let packet = decode_packet(&mut wire, u16::MAX).unwrap().unwrap();
        assert_eq!(packet.header.channel, 1);
        assert_eq!(packet.payload.as_ref(), b"hello");
    }

    #[test]
    fn write_multiple_packets() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write_packet(&eom_packet(PacketType::Lang, 1, b"one"))
            .unwrap();
        writer
            .write_packet(&eom_packet(PacketType::Rpc, 2, b"two"))
            .unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let p1 = decode_packet(&mut wire, u16::MAX).unwrap().unwrap();
        let p2 = decode_packet(&mut wire, u16::MAX).unwrap().unwrap();
        assert_eq!((p1.header.channel, p1.payload.as_ref()), (1, b"one".as_ref()));
        assert_eq!((p2.header.channel, p2.payload.as_ref()), (2, b"two".as_ref()));
        assert!(wire.is_empty());
    }

    #[test]
    fn oversized_packet_rejected() {
        let cfg = PacketConfig {
            max_packet_size: 16,
            ..PacketConfig::default()
        };
        let mut writer = PacketWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer
            .write_packet(&eom_packet(PacketType::Lang, 1, &[0u8; 64]))
            .unwrap_err();
        assert!(matches!(err, PacketError::InvalidLength { max: 16, .. }));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = PacketWriter::new(sink);

        writer
            .write_packet(&eom_packet(PacketType::Lang, 1, b"x"))
            .unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let inner = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };
        let mut writer = PacketWriter::new(inner);
        writer
            .write_packet(&eom_packet(PacketType::Lang, 5, b"retry"))
            .unwrap();

        let inner = writer.into_inner();
        assert!(!inner.data.is_empty());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = PacketWriter::new(ZeroWriter);
        let err = writer
            .write_packet(&eom_packet(PacketType::Lang, 1, b"x"))
            .unwrap_err();
        assert!(matches!(err, PacketError::ConnectionClosed));
    }

    #[test]
    fn written_bytes_read_back() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write_packet(&eom_packet(PacketType::Echo, 3, b"z"))
            .unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = crate::reader::PacketReader::new(Cursor::new(wire));
        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.header.channel, 3);
        assert_eq!(packet.payload.as_ref(), b"z");
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
