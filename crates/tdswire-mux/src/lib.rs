//! Channel multiplexing, window flow control and attention signaling over
//! one TDS connection.
//!
//! This is the stateful half of the transport. A [`Connection`] owns the
//! duplex stream: a dedicated reader thread demultiplexes inbound packets
//! into per-channel message assemblers while sender threads split outbound
//! messages into packets, each admitted against the channel's flow-control
//! window and written atomically. Attention (cancellation) requests bypass
//! the window and are the only way to interrupt an in-flight request.

pub mod config;
pub mod conn;
pub mod error;
pub mod window;

pub use config::ConnConfig;
pub use conn::{ChannelHandle, Connection};
pub use error::{MuxError, Result};
pub use window::FlowController;
