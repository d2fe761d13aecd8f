use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PacketError, Result};
use crate::header::{PacketHeader, PacketStatus, PacketType, HEADER_SIZE};

/// Default maximum packet size negotiated by the protocol: 512 bytes.
pub const DEFAULT_MAX_PACKET: u16 = 512;

/// Smallest usable maximum packet size: header plus one payload byte.
pub const MIN_PACKET: u16 = (HEADER_SIZE + 1) as u16;

/// A packet: fixed header plus bounded payload. The unit placed on and
/// read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Create a packet, deriving the header length from the payload.
    pub fn new(msg_type: PacketType, channel: u16, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: PacketHeader::new(msg_type, channel, payload.len()),
            payload,
        }
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Whether this packet closes a logical message.
    pub fn is_eom(&self) -> bool {
        self.header.status.contains(PacketStatus::EOM)
    }
}

/// Encode a packet into the wire format.
///
/// The header length field must equal header size plus payload length;
/// a mismatch is a framing error, not silently patched.
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    let expected = HEADER_SIZE + packet.payload.len();
    if packet.header.length as usize != expected {
        return Err(PacketError::InvalidLength {
            length: packet.header.length,
            max: u16::MAX,
        });
    }

    let mut header = [0u8; HEADER_SIZE];
    packet.header.encode(&mut header)?;

    dst.reserve(expected);
    dst.put_slice(&header);
    dst.put_slice(&packet.payload);
    Ok(())
}

/// Decode a packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer.
pub fn decode_packet(src: &mut BytesMut, max_packet_size: u16) -> Result<Option<Packet>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let header = PacketHeader::decode(&src[..HEADER_SIZE])?;

    if header.length > max_packet_size {
        return Err(PacketError::InvalidLength {
            length: header.length,
            max: max_packet_size,
        });
    }

    let total = header.length as usize;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(total - HEADER_SIZE).freeze();

    Ok(Some(Packet { header, payload }))
}

/// Configuration for the packet codec.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Negotiated maximum packet size in bytes, header included.
    pub max_packet_size: u16,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
