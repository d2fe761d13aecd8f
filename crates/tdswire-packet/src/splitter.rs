use bytes::Bytes;

use crate::codec::{Packet, MIN_PACKET};
use crate::error::{PacketError, Result};
use crate::header::{PacketHeader, PacketStatus, PacketType, HEADER_SIZE};

/// Splits one logical outbound message into an ordered packet sequence.
///
/// Packets are produced lazily; each carries up to `max_packet_size - 8`
/// payload bytes, a wrapping per-channel sequence number, and the caller's
/// status bits. The end-of-message bit is OR'd onto the final packet only.
/// A zero-length payload still yields exactly one header-only packet; this
/// is how empty logical messages (bare attention signals) go on the wire.
///
/// The caller must write the produced packets in order on the same channel
/// without interleaving another message on that channel; interleaving
/// across different channels is expected under multiplexing.
#[derive(Debug)]
pub struct MessageSplitter {
    channel: u16,
    msg_type: PacketType,
    status: PacketStatus,
    remaining: Bytes,
    chunk_size: usize,
    next_nr: u8,
    window: u8,
    done: bool,
}

/// Number of packets a payload of `payload_len` bytes splits into.
pub fn packet_count(payload_len: usize, max_packet_size: u16) -> usize {
    let chunk = max_packet_size as usize - HEADER_SIZE;
    std::cmp::max(1, payload_len.div_ceil(chunk))
}

/// Create a splitter for one logical message.
///
/// `first_nr` is the channel's next unused sequence number; `window` is
/// stamped into every header. Fails if `max_packet_size` cannot hold a
/// header plus at least one payload byte.
pub fn split_message(
    channel: u16,
    msg_type: PacketType,
    status: PacketStatus,
    payload: impl Into<Bytes>,
    max_packet_size: u16,
    first_nr: u8,
    window: u8,
) -> Result<MessageSplitter> {
    if max_packet_size < MIN_PACKET {
        return Err(PacketError::InvalidLength {
            length: max_packet_size,
            max: MIN_PACKET,
        });
    }
    Ok(MessageSplitter {
        channel,
        msg_type,
        status,
        remaining: payload.into(),
        chunk_size: max_packet_size as usize - HEADER_SIZE,
        next_nr: first_nr,
        window,
        done: false,
    })
}

impl Iterator for MessageSplitter {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        if self.done {
            return None;
        }

        let take = self.remaining.len().min(self.chunk_size);
        let chunk = self.remaining.split_to(take);

        let mut status = self.status;
        if self.remaining.is_empty() {
            status |= PacketStatus::EOM;
            self.done = true;
        }

        let header = PacketHeader {
            msg_type: self.msg_type,
            status,
            length: (HEADER_SIZE + chunk.len()) as u16,
            channel: self.channel,
            packet_nr: self.next_nr,
            window: self.window,
        };
        self.next_nr = self.next_nr.wrapping_add(1);

        Some(Packet {
            header,
            payload: chunk,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let n = packet_count(self.remaining.len(), (self.chunk_size + HEADER_SIZE) as u16);
        (n, Some(n))
    }
}

impl MessageSplitter {
    /// Sequence number the channel should use after this message.
    pub fn next_nr(&self) -> u8 {
        self.next_nr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_simple(payload: &'static [u8], max: u16) -> Vec<Packet> {
        split_message(
            3,
            PacketType::Lang,
            PacketStatus::empty(),
            payload,
            max,
            0,
            0,
        )
        .unwrap()
        .collect()
    }

    #[test]
    fn twenty_bytes_at_max_sixteen_yields_three_packets() {
        let packets = split_simple(b"0123456789abcdefghij", 16);

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].header.length, 16);
        assert_eq!(packets[1].header.length, 16);
        assert_eq!(packets[2].header.length, 12);

        assert!(!packets[0].is_eom());
        assert!(!packets[1].is_eom());
        assert!(packets[2].is_eom());

        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet.header.channel, 3);
            assert_eq!(packet.header.packet_nr, i as u8);
            assert_eq!(packet.header.msg_type, PacketType::Lang);
        }
    }

    #[test]
    fn empty_payload_yields_one_header_only_packet() {
        let packets: Vec<Packet> = split_message(
            1,
            PacketType::Attention,
            PacketStatus::ATTN,
            Bytes::new(),
            512,
            7,
            0,
        )
        .unwrap()
        .collect();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].header.length as usize, HEADER_SIZE);
        assert!(packets[0].payload.is_empty());
        assert!(packets[0].is_eom());
        assert!(packets[0].header.status.contains(PacketStatus::ATTN));
        assert_eq!(packets[0].header.packet_nr, 7);
    }

    #[test]
    fn eom_on_exactly_the_last_packet() {
        for len in [0usize, 1, 7, 8, 9, 16, 17, 100] {
            let payload = vec![0xAA; len];
            let packets: Vec<Packet> = split_message(
                1,
                PacketType::Lang,
                PacketStatus::empty(),
                payload,
                16,
                0,
                0,
            )
            .unwrap()
            .collect();

            let eom_count = packets.iter().filter(|p| p.is_eom()).count();
            assert_eq!(eom_count, 1, "payload len {len}");
            assert!(packets.last().unwrap().is_eom(), "payload len {len}");
        }
    }

    #[test]
    fn packet_count_matches_formula() {
        for (len, max, expected) in [
            (0usize, 16u16, 1usize),
            (1, 16, 1),
            (8, 16, 1),
            (9, 16, 2),
            (20, 16, 3),
            (4096, 512, 9),
        ] {
            assert_eq!(packet_count(len, max), expected, "len={len} max={max}");
            let payload = vec![0u8; len];
            let produced = split_message(
                1,
                PacketType::Lang,
                PacketStatus::empty(),
                payload,
                max,
                0,
                0,
            )
            .unwrap()
            .count();
            assert_eq!(produced, expected, "len={len} max={max}");
        }
    }

    #[test]
    fn caller_status_bits_on_every_packet() {
        let packets = split_message(
            1,
            PacketType::Lang,
            PacketStatus::SEAL | PacketStatus::SYM_ENCRYPT,
            vec![0u8; 20],
            16,
            0,
            0,
        )
        .unwrap()
        .collect::<Vec<_>>();

        for packet in &packets {
            assert!(packet.header.status.contains(PacketStatus::SEAL));
            assert!(packet.header.status.contains(PacketStatus::SYM_ENCRYPT));
        }
    }

    #[test]
    fn sequence_numbers_wrap_mod_256() {
        let payload = vec![0u8; 300 * 8]; // 300 packets at max 16
        let packets: Vec<Packet> = split_message(
            1,
            PacketType::Bulk,
            PacketStatus::empty(),
            payload,
            16,
            250,
            0,
        )
        .unwrap()
        .collect();

        assert_eq!(packets.len(), 300);
        assert_eq!(packets[0].header.packet_nr, 250);
        assert_eq!(packets[5].header.packet_nr, 255);
        assert_eq!(packets[6].header.packet_nr, 0);
        assert_eq!(packets[261].header.packet_nr, 255);
        assert_eq!(packets[262].header.packet_nr, 0);
    }

    #[test]
    fn window_stamped_into_every_header() {
        let packets = split_message(
            1,
            PacketType::Lang,
            PacketStatus::empty(),
            vec![0u8; 20],
            16,
            0,
            5,
        )
        .unwrap()
        .collect::<Vec<_>>();

        assert!(packets.iter().all(|p| p.header.window == 5));
    }

    #[test]
    fn rejects_max_packet_size_below_minimum() {
        let err = split_message(
            1,
            PacketType::Lang,
            PacketStatus::empty(),
            Bytes::new(),
            8,
            0,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, PacketError::InvalidLength { length: 8, .. }));
    }

    #[test]
    fn split_concatenation_reproduces_payload() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let packets = split_message(
            9,
            PacketType::Lang,
            PacketStatus::empty(),
            payload.clone(),
            100,
            0,
            0,
        )
        .unwrap();

        let mut reassembled = Vec::new();
        for packet in packets {
            reassembled.extend_from_slice(&packet.payload);
        }
        assert_eq!(reassembled, payload);
    }
}
