use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::codec::Packet;
use crate::error::{PacketError, Result};
use crate::header::{PacketStatus, PacketType};

/// A completed logical message: the concatenated payload of one channel's
/// packet run, bounded by the end-of-message bit, plus the header metadata
/// the consumer needs to interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type of the packets that carried this message.
    pub msg_type: PacketType,
    /// Union of the status bits observed across the message's packets
    /// (encryption markers, event flag, the closing EOM bit).
    pub status: PacketStatus,
    /// The message body. Header bytes are not part of the content.
    pub payload: Bytes,
}

/// A sequence discontinuity observed while assembling.
///
/// Sequence numbers exist for ordering diagnostics only. The protocol has
/// no retransmission, so a gap is reported and processing continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub channel: u16,
    pub expected: u8,
    pub actual: u8,
}

/// Outcome of feeding one packet to the assembler.
#[derive(Debug, Default)]
pub struct Push {
    /// Completed message, when the packet carried the end-of-message bit.
    pub message: Option<Message>,
    /// Sequence gap observed on the packet, if any. The packet's payload
    /// was still consumed.
    pub gap: Option<SequenceGap>,
}

/// Per-channel accumulator that reassembles packet runs into messages.
///
/// Exclusively owns the accumulation buffer between reset and finalize;
/// a finalized message's buffer is handed to the caller and a fresh one
/// starts on the next packet.
#[derive(Debug)]
pub struct Assembler {
    channel: u16,
    buf: BytesMut,
    in_progress: Option<PacketType>,
    status: PacketStatus,
    last_nr: Option<u8>,
    gaps: u64,
}

impl Assembler {
    /// Create an assembler for one channel.
    pub fn new(channel: u16) -> Self {
        Self {
            channel,
            buf: BytesMut::new(),
            in_progress: None,
            status: PacketStatus::empty(),
            last_nr: None,
            gaps: 0,
        }
    }

    /// The channel this assembler accumulates for.
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Whether a message is currently accumulating.
    pub fn in_progress(&self) -> bool {
        self.in_progress.is_some()
    }

    /// Total sequence gaps observed on this channel.
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Feed one inbound packet.
    ///
    /// Returns the completed message once the end-of-message bit is seen;
    /// the accumulator then resets for the channel's next message. A
    /// packet whose message type differs from the one that opened the
    /// in-progress message is a protocol violation and discards the
    /// partial message.
    pub fn push(&mut self, packet: Packet) -> Result<Push> {
        if packet.header.channel != self.channel {
            return Err(PacketError::ProtocolViolation(format!(
                "packet for channel {} fed to assembler for channel {}",
                packet.header.channel, self.channel
            )));
        }

        let gap = self.track_sequence(packet.header.packet_nr);

        match self.in_progress {
            Some(open) if open != packet.header.msg_type => {
                let err = PacketError::ProtocolViolation(format!(
                    "message type changed mid-message on channel {} ({} -> {})",
                    self.channel, open, packet.header.msg_type
                ));
                self.reset();
                return Err(err);
            }
            Some(_) => {}
            None => self.in_progress = Some(packet.header.msg_type),
        }

        self.status |= packet.header.status;
        self.buf.extend_from_slice(&packet.payload);

        let message = if packet.is_eom() {
            let msg_type = self
                .in_progress
                .take()
                .expect("in_progress set above for every accepted packet");
            let status = std::mem::take(&mut self.status);
            let payload = self.buf.split().freeze();
            Some(Message {
                msg_type,
                status,
                payload,
            })
        } else {
            None
        };

        Ok(Push { message, gap })
    }

    // The first packet ever seen on the channel sets the baseline; after
    // that, anything but previous+1 mod 256 is a gap.
    fn track_sequence(&mut self, nr: u8) -> Option<SequenceGap> {
        let gap = match self.last_nr {
            Some(last) => {
                let expected = last.wrapping_add(1);
                (nr != expected).then_some(SequenceGap {
                    channel: self.channel,
                    expected,
                    actual: nr,
                })
            }
            None => None,
        };
        self.last_nr = Some(nr);

        if let Some(gap) = gap {
            self.gaps += 1;
            warn!(
                channel = gap.channel,
                expected = gap.expected,
                actual = gap.actual,
                "packet sequence gap"
            );
        }
        gap
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.in_progress = None;
        self.status = PacketStatus::empty();
    }
}
