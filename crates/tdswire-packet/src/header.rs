use std::fmt;

use crate::error::{PacketError, Result};

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Packet type carried in the first header byte.
///
/// The transport treats the type opaquely except for attention and
/// protocol-acknowledge handling; everything else is interpreted by the
/// message codec layer above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Language (SQL text) command.
    Lang = 1,
    Login = 2,
    Rpc = 3,
    /// Server response stream.
    Response = 4,
    Unformatted = 5,
    /// Out-of-band cancellation signal.
    Attention = 6,
    Bulk = 7,
    Setup = 8,
    Close = 9,
    Error = 10,
    /// Protocol-level acknowledgment, consumed by the transport.
    ProtoAck = 11,
    Echo = 12,
    Logout = 13,
    EndParam = 14,
    Normal = 15,
    Urgent = 16,
    Migrate = 17,
    Hello = 18,
    CmdseqNormal = 19,
    CmdseqLogin = 20,
    CmdseqLiveness = 21,
    CmdseqReserved1 = 22,
    CmdseqReserved2 = 23,
}

impl PacketType {
    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Lang => "LANG",
            PacketType::Login => "LOGIN",
            PacketType::Rpc => "RPC",
            PacketType::Response => "RESPONSE",
            PacketType::Unformatted => "UNFMT",
            PacketType::Attention => "ATTN",
            PacketType::Bulk => "BULK",
            PacketType::Setup => "SETUP",
            PacketType::Close => "CLOSE",
            PacketType::Error => "ERROR",
            PacketType::ProtoAck => "PROTACK",
            PacketType::Echo => "ECHO",
            PacketType::Logout => "LOGOUT",
            PacketType::EndParam => "ENDPARAM",
            PacketType::Normal => "NORMAL",
            PacketType::Urgent => "URGENT",
            PacketType::Migrate => "MIGRATE",
            PacketType::Hello => "HELLO",
            PacketType::CmdseqNormal => "CMDSEQ_NORMAL",
            PacketType::CmdseqLogin => "CMDSEQ_LOGIN",
            PacketType::CmdseqLiveness => "CMDSEQ_LIVENESS",
            PacketType::CmdseqReserved1 => "CMDSEQ_RESERVED1",
            PacketType::CmdseqReserved2 => "CMDSEQ_RESERVED2",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => PacketType::Lang,
            2 => PacketType::Login,
            3 => PacketType::Rpc,
            4 => PacketType::Response,
            5 => PacketType::Unformatted,
            6 => PacketType::Attention,
            7 => PacketType::Bulk,
            8 => PacketType::Setup,
            9 => PacketType::Close,
            10 => PacketType::Error,
            11 => PacketType::ProtoAck,
            12 => PacketType::Echo,
            13 => PacketType::Logout,
            14 => PacketType::EndParam,
            15 => PacketType::Normal,
            16 => PacketType::Urgent,
            17 => PacketType::Migrate,
            18 => PacketType::Hello,
            19 => PacketType::CmdseqNormal,
            20 => PacketType::CmdseqLogin,
            21 => PacketType::CmdseqLiveness,
            22 => PacketType::CmdseqReserved1,
            23 => PacketType::CmdseqReserved2,
            other => return Err(PacketError::InvalidPacketType(other)),
        })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// Status bitmask carried in the second header byte.
    ///
    /// The encryption markers (SEAL, ENCRYPT, SYM_ENCRYPT) are independent
    /// bits and may be combined; unknown bits survive a decode/encode
    /// round-trip untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// Last packet of a request or response message.
        const EOM = 0x01;
        /// Acknowledgment of the last received attention.
        const ATTN_ACK = 0x02;
        /// Attention (cancellation) request.
        const ATTN = 0x04;
        /// Event notification.
        const EVENT = 0x08;
        /// Payload sealed by the transport.
        const SEAL = 0x10;
        /// Payload encrypted.
        const ENCRYPT = 0x20;
        /// Payload encrypted with a symmetric on-demand key.
        const SYM_ENCRYPT = 0x40;
    }
}

impl Default for PacketStatus {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for PacketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        let unknown = self.bits() & !PacketStatus::all().bits();
        if unknown != 0 {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "0x{unknown:02x}")?;
        }
        Ok(())
    }
}

/// The fixed 8-byte packet header.
///
/// Wire layout (big-endian):
/// ```text
/// ┌─────────┬─────────┬────────────┬────────────┬──────────┬─────────┐
/// │ Type    │ Status  │ Length     │ Channel    │ PacketNr │ Window  │
/// │ (1B)    │ (1B)    │ (2B BE)    │ (2B BE)    │ (1B)     │ (1B)    │
/// └─────────┴─────────┴────────────┴────────────┴──────────┴─────────┘
/// ```
/// `length` counts the whole packet including this header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Message type, e.g. login or language command.
    pub msg_type: PacketType,
    /// Status bits, e.g. end-of-message or encryption markers.
    pub status: PacketStatus,
    /// Total packet length in bytes, header included.
    pub length: u16,
    /// Channel the packet belongs to when multiplexing.
    pub channel: u16,
    /// Per-channel sequence number, wrapping at 256. Ordering
    /// diagnostics only; there is no retransmission.
    pub packet_nr: u8,
    /// Advertised flow-control window (0 disables windowing).
    pub window: u8,
}

impl PacketHeader {
    /// Create a header for a packet with `payload_len` payload bytes.
    pub fn new(msg_type: PacketType, channel: u16, payload_len: usize) -> Self {
        Self {
            msg_type,
            status: PacketStatus::empty(),
            length: (HEADER_SIZE + payload_len) as u16,
            channel,
            packet_nr: 0,
            window: 0,
        }
    }

    /// Number of payload bytes following this header.
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }

    /// Encode into a destination buffer of exactly [`HEADER_SIZE`] bytes.
    pub fn encode(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() != HEADER_SIZE {
            return Err(PacketError::Framing {
                expected: HEADER_SIZE,
                actual: dst.len(),
            });
        }
        dst[0] = self.msg_type as u8;
        dst[1] = self.status.bits();
        dst[2..4].copy_from_slice(&self.length.to_be_bytes());
        dst[4..6].copy_from_slice(&self.channel.to_be_bytes());
        dst[6] = self.packet_nr;
        dst[7] = self.window;
        Ok(())
    }

    /// Decode from a source buffer of exactly [`HEADER_SIZE`] bytes.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() != HEADER_SIZE {
            return Err(PacketError::Framing {
                expected: HEADER_SIZE,
                actual: src.len(),
            });
        }
        let length = u16::from_be_bytes([src[2], src[3]]);
        if (length as usize) < HEADER_SIZE {
            return Err(PacketError::InvalidLength {
                length,
                max: u16::MAX,
            });
        }
        Ok(Self {
            msg_type: PacketType::try_from(src[0])?,
            status: PacketStatus::from_bits_retain(src[1]),
            length,
            channel: u16::from_be_bytes([src[4], src[5]]),
            packet_nr: src[6],
            window: src[7],
        })
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={} status={} length={} channel={} nr={} window={}",
            self.msg_type, self.status, self.length, self.channel, self.packet_nr, self.window
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> PacketHeader {
        PacketHeader {
            msg_type: PacketType::Lang,
            status: PacketStatus::EOM | PacketStatus::SEAL,
            length: 512,
            channel: 3,
            packet_nr: 42,
            window: 4,
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let header = sample_header();
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf).unwrap();

        let decoded = PacketHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn roundtrip_all_types_and_statuses() {
        for type_byte in 1u8..=23 {
            let msg_type = PacketType::try_from(type_byte).unwrap();
            for status_bits in [0x00u8, 0x01, 0x03, 0x70, 0x7f] {
                let header = PacketHeader {
                    msg_type,
                    status: PacketStatus::from_bits_retain(status_bits),
                    length: 8 + u16::from(type_byte),
                    channel: u16::from(type_byte) * 7,
                    packet_nr: type_byte.wrapping_mul(11),
                    window: type_byte,
                };
                let mut buf = [0u8; HEADER_SIZE];
                header.encode(&mut buf).unwrap();
                assert_eq!(PacketHeader::decode(&buf).unwrap(), header);
            }
        }
    }

    #[test]
    fn wire_layout_is_big_endian() {
        let header = PacketHeader {
            msg_type: PacketType::Login,
            status: PacketStatus::EOM,
            length: 0x0102,
            channel: 0x0304,
            packet_nr: 5,
            window: 6,
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x02, 0x01, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn encode_rejects_wrong_buffer_size() {
        let header = sample_header();
        let mut short = [0u8; 7];
        let err = header.encode(&mut short).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Framing {
                expected: 8,
                actual: 7
            }
        ));

        let mut long = [0u8; 9];
        let err = header.encode(&mut long).unwrap_err();
        assert!(matches!(err, PacketError::Framing { actual: 9, .. }));
    }

    #[test]
    fn decode_rejects_wrong_buffer_size() {
        let err = PacketHeader::decode(&[0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Framing {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let buf = [0x00, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00];
        let err = PacketHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, PacketError::InvalidPacketType(0)));

        let buf = [0xff, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00];
        let err = PacketHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, PacketError::InvalidPacketType(0xff)));
    }

    #[test]
    fn decode_rejects_length_below_header_size() {
        let buf = [0x01, 0x01, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00];
        let err = PacketHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, PacketError::InvalidLength { length: 7, .. }));
    }

    #[test]
    fn unknown_status_bits_survive_roundtrip() {
        let header = PacketHeader {
            status: PacketStatus::from_bits_retain(0x80 | 0x01),
            ..sample_header()
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf).unwrap();
        let decoded = PacketHeader::decode(&buf).unwrap();
        assert_eq!(decoded.status.bits(), 0x81);
        assert!(decoded.status.contains(PacketStatus::EOM));
    }

    #[test]
    fn status_display_lists_set_bits() {
        let status = PacketStatus::EOM | PacketStatus::ATTN;
        assert_eq!(status.to_string(), "EOM|ATTN");
        assert_eq!(PacketStatus::empty().to_string(), "NONE");
    }

    #[test]
    fn encryption_markers_are_independent() {
        let mut status = PacketStatus::SEAL;
        status.insert(PacketStatus::SYM_ENCRYPT);
        assert!(status.contains(PacketStatus::SEAL));
        assert!(status.contains(PacketStatus::SYM_ENCRYPT));
        assert!(!status.contains(PacketStatus::ENCRYPT));

        status.remove(PacketStatus::SEAL);
        assert!(!status.contains(PacketStatus::SEAL));
        assert!(status.contains(PacketStatus::SYM_ENCRYPT));
    }

    #[test]
    fn payload_len_excludes_header() {
        let header = PacketHeader::new(PacketType::Lang, 1, 100);
        assert_eq!(header.length, 108);
        assert_eq!(header.payload_len(), 100);
    }
}
