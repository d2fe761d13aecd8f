use std::time::Duration;

use tdswire_packet::{PacketConfig, PacketStatus, DEFAULT_MAX_PACKET, MIN_PACKET};

use crate::error::{MuxError, Result};

/// Connection configuration, consumed once at setup.
///
/// Values come from connection-string negotiation in a full driver; the
/// transport never mutates them afterward.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Negotiated maximum packet size in bytes, header included.
    pub max_packet_size: u16,
    /// Per-channel flow-control window: how many packets may be
    /// outstanding before an acknowledgment is required. 0 disables
    /// windowing, the protocol's common case.
    pub window: u8,
    /// Read timeout applied to the stream. Expiry is a fatal connection
    /// error, not a retry.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied to the stream.
    pub write_timeout: Option<Duration>,
    /// Status bits stamped on every outgoing packet, e.g. the encryption
    /// markers when the session negotiated a sealed transport.
    pub status: PacketStatus,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET,
            window: 0,
            read_timeout: None,
            write_timeout: None,
            status: PacketStatus::empty(),
        }
    }
}

impl ConnConfig {
    /// Override the maximum packet size.
    pub fn with_max_packet_size(mut self, max_packet_size: u16) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    /// Override the per-channel window.
    pub fn with_window(mut self, window: u8) -> Self {
        self.window = window;
        self
    }

    /// Override the read timeout.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the write timeout.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Override the outgoing status bits.
    pub fn with_status(mut self, status: PacketStatus) -> Self {
        self.status = status;
        self
    }

    /// Check the configuration is usable: the packet size must hold a
    /// header plus at least one payload byte.
    pub fn validate(&self) -> Result<()> {
        if self.max_packet_size < MIN_PACKET {
            return Err(MuxError::InvalidConfig(format!(
                "max packet size {} below minimum {}",
                self.max_packet_size, MIN_PACKET
            )));
        }
        Ok(())
    }

    pub(crate) fn packet_config(&self) -> PacketConfig {
        PacketConfig {
            max_packet_size: self.max_packet_size,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}
