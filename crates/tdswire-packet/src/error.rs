/// Errors that can occur at the packet layer.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// A header buffer had the wrong size for encode/decode.
    #[error("header buffer size mismatch (expected {expected} bytes, got {actual})")]
    Framing { expected: usize, actual: usize },

    /// The header length field is below the header size or above the
    /// negotiated maximum packet size.
    #[error("invalid packet length {length} (valid range 8..={max})")]
    InvalidLength { length: u16, max: u16 },

    /// The header carries an unknown packet type byte.
    #[error("unknown packet type 0x{0:02x}")]
    InvalidPacketType(u8),

    /// The connection was closed cleanly between packets.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a packet. Always fatal; the
    /// connection must be torn down.
    #[error("truncated packet (expected {expected} bytes, got {actual})")]
    Truncated { expected: usize, actual: usize },

    /// The packet contradicts the protocol state, e.g. a message-type
    /// change in the middle of a multi-packet message.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An I/O error occurred while reading or writing packets.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PacketError>;
