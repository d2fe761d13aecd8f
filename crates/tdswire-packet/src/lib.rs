//! Fixed-header packet framing for the TDS wire protocol.
//!
//! This is the pure half of the transport: every logical message travels as
//! one or more packets, each led by an 8-byte big-endian header carrying
//! message type, status bits, total length, multiplexing channel, sequence
//! number, and flow-control window. The splitter turns an outbound message
//! into a packet run; the assembler folds an inbound run back into a
//! message the moment the end-of-message bit is seen.
//!
//! No connection state lives here: windows, attention tracking, and the
//! reader task belong to `tdswire-mux`.

pub mod assembler;
pub mod codec;
pub mod error;
pub mod header;
pub mod reader;
pub mod splitter;
pub mod writer;

pub use assembler::{Assembler, Message, Push, SequenceGap};
pub use codec::{decode_packet, encode_packet, Packet, PacketConfig, DEFAULT_MAX_PACKET, MIN_PACKET};
pub use error::{PacketError, Result};
pub use header::{PacketHeader, PacketStatus, PacketType, HEADER_SIZE};
pub use reader::PacketReader;
pub use splitter::{packet_count, split_message, MessageSplitter};
pub use writer::PacketWriter;
