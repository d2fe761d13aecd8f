//! TCP transport abstraction for the tdswire protocol stack.
//!
//! Provides the duplex byte stream everything else builds on. The server
//! speaks the packet protocol over plain TCP; this crate only concerns
//! itself with connecting, timeouts, and stream lifecycle. Packet framing
//! lives one layer up in `tdswire-packet`.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::DbStream;
pub use tcp::TcpTransport;
