//! Packet transport layer for the TDS database wire protocol.
//!
//! tdswire turns logical protocol messages (login, SQL batches, RPC calls,
//! cancellations) into fixed-header packets on a multiplexed connection and
//! reassembles inbound packets back into messages, enforcing channel
//! identity, packet sequencing and flow-control windows.
//!
//! # Crate Structure
//!
//! - [`transport`] — TCP stream abstraction (connect, timeouts, shutdown)
//! - [`packet`] — header codec, message splitting and reassembly
//! - [`mux`] — the multiplexed connection: windows, attention, reader task

/// Re-export transport types.
pub mod transport {
    pub use tdswire_transport::*;
}

/// Re-export packet types.
pub mod packet {
    pub use tdswire_packet::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use tdswire_mux::*;
}
