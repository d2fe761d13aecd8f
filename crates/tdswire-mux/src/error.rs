use tdswire_packet::PacketError;
use tdswire_transport::TransportError;

/// Errors that can occur in multiplexer operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Packet-level error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// An attention request is already in flight on the channel.
    #[error("attention already pending on channel {0}")]
    AttentionPending(u16),

    /// A receive wait expired.
    #[error("receive timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The connection failed; every channel observes the same terminal
    /// error for all outstanding and future operations.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,

    /// The connection configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, MuxError>;

/// Why the connection stopped. Once set, every operation on every channel
/// resolves to the same error.
#[derive(Debug, Clone)]
pub(crate) enum Terminal {
    /// The peer shut down cleanly between packets.
    PeerClosed,
    /// The stream broke: truncated packet, I/O failure, read timeout.
    Failed(String),
    /// Closed locally via `Connection::close`.
    Closed,
}

impl Terminal {
    pub(crate) fn to_error(&self) -> MuxError {
        match self {
            Terminal::PeerClosed => MuxError::Packet(PacketError::ConnectionClosed),
            Terminal::Failed(reason) => MuxError::ConnectionLost(reason.clone()),
            Terminal::Closed => MuxError::Closed,
        }
    }
}
