//! Packet Encoder/Decoder
//!
//! Encode straight into a pre-allocated buffer; decode by walking a buffer
//! of back-to-back packets using each packet's length word.
//! No allocation after construction.

use super::message::{
    decode_header, generate_checksum, BusHeader, PrimaryHeader, SecondaryHeader, MAX_PACKET_SIZE,
};
use crate::error::{BusError, Result};

/// Pre-allocated packet encoder
///
/// Every encode recomputes the length word from the bytes actually written,
/// so a stale length in the caller's header never reaches the wire.
pub struct Encoder {
    buffer: Box<[u8]>,
    write_pos: usize,
    generate_checksum: bool,
}

impl Encoder {
    /// Encoder with a fixed buffer of `capacity` bytes. Checksums are on.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            write_pos: 0,
            generate_checksum: true,
        }
    }

    /// Toggle command checksum generation.
    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.generate_checksum = enabled;
        self
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.write_pos = 0;
    }

    /// Append one packet (header + payload) to the buffer.
    ///
    /// Returns the slice holding the encoded packet.
    pub fn encode(&mut self, header: &BusHeader, payload: &[u8]) -> Result<&[u8]> {
        let header_size = header.size();
        let total_size = header_size + payload.len();

        if total_size > MAX_PACKET_SIZE {
            return Err(BusError::MessageTooLarge {
                size: total_size,
                max: MAX_PACKET_SIZE,
            });
        }

        if self.write_pos + total_size > self.buffer.len() {
            return Err(BusError::BufferFull {
                needed: total_size,
                available: self.available(),
            });
        }

        let start = self.write_pos;
        let end = start + total_size;

        let mut header = *header;
        header.primary.length = PrimaryHeader::length_for(total_size);
        let is_command = matches!(header.secondary, SecondaryHeader::Command(_));
        if let SecondaryHeader::Command(sec) = &mut header.secondary {
            if self.generate_checksum {
                sec.checksum = 0;
            }
        }

        header.encode_into(&mut self.buffer[start..start + header_size])?;
        self.buffer[start + header_size..end].copy_from_slice(payload);

        if is_command && self.generate_checksum {
            generate_checksum(&mut self.buffer[start..end])?;
        }

        self.write_pos = end;

        Ok(&self.buffer[start..end])
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.write_pos]
    }

    #[inline(always)]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.write_pos
    }
}

/// Zero-copy decoder over back-to-back packets
///
/// Yields `(header, payload)` pairs. The first malformed packet is reported
/// once and ends the iteration, since nothing after it can be framed.
pub struct Decoder<'a> {
    buffer: &'a [u8],
    read_pos: usize,
    failed: bool,
}

impl<'a> Decoder<'a> {
    #[inline(always)]
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_pos: 0,
            failed: false,
        }
    }

    fn decode_next(&mut self) -> Result<(BusHeader, &'a [u8])> {
        let rest = &self.buffer[self.read_pos..];
        let header = decode_header(rest)?;
        let header_size = header.size();
        let total = header.primary.total_len();

        if total < header_size {
            return Err(BusError::MalformedHeader {
                expected: header_size,
                actual: total,
            });
        }
        if total > rest.len() {
            return Err(BusError::MalformedHeader {
                expected: total,
                actual: rest.len(),
            });
        }

        self.read_pos += total;
        Ok((header, &rest[header_size..total]))
    }

    /// Bytes not yet consumed
    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.read_pos)
    }
}

impl<'a> Iterator for Decoder<'a> {
    type Item = Result<(BusHeader, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining() == 0 {
            return None;
        }
        let item = self.decode_next();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{validate_checksum, PacketType, Sequence};

    #[test]
    fn test_encode_recomputes_length() {
        let mut encoder = Encoder::new(4096);

        // Header claims a header-only packet; payload makes it 20 bytes
        let header = BusHeader::telemetry(0x42, 100, 7);
        let packet = encoder.encode(&header, b"ping").unwrap();

        assert_eq!(packet.len(), 20);
        assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), 13);
    }

    #[test]
    fn test_encode_command_checksum() {
        let mut encoder = Encoder::new(4096);
        let header = BusHeader::command(0x10, 4);
        let packet = encoder.encode(&header, &[1, 2, 3, 4, 5]).unwrap();
        assert!(validate_checksum(packet));

        let mut plain = Encoder::new(4096).with_checksum(false);
        let packet = plain.encode(&header, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(packet[7], 0);
    }

    #[test]
    fn test_encode_decode_multiple() {
        let mut encoder = Encoder::new(4096);
        encoder
            .encode(&BusHeader::command(0x10, 1), b"Message 1")
            .unwrap();
        encoder
            .encode(
                &BusHeader::telemetry(0x11, 5, 6).with_sequence(Sequence::unsegmented(9)),
                b"Message 2",
            )
            .unwrap();
        encoder.encode(&BusHeader::command(0x12, 3), b"").unwrap();

        let decoded: Vec<_> = Decoder::new(encoder.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].1, b"Message 1");
        assert_eq!(decoded[1].0.packet_type(), PacketType::Telemetry);
        assert_eq!(decoded[1].0.primary.seq().count(), 9);
        assert_eq!(decoded[1].1, b"Message 2");
        assert!(decoded[2].1.is_empty());
    }

    #[test]
    fn test_decoder_truncated_tail() {
        let mut encoder = Encoder::new(4096);
        encoder.encode(&BusHeader::command(0x10, 1), b"whole").unwrap();
        encoder.encode(&BusHeader::command(0x10, 2), b"cut off").unwrap();

        let bytes = encoder.as_bytes();
        let mut decoder = Decoder::new(&bytes[..bytes.len() - 3]);

        assert!(decoder.next().unwrap().is_ok());
        assert!(matches!(
            decoder.next(),
            Some(Err(BusError::MalformedHeader { .. }))
        ));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_encoder_full() {
        let mut encoder = Encoder::new(16);
        assert!(encoder.encode(&BusHeader::command(1, 1), b"1234").is_ok());
        let err = encoder.encode(&BusHeader::command(1, 1), b"").unwrap_err();
        assert!(matches!(
            err,
            BusError::BufferFull {
                needed: 12,
                available: 0
            }
        ));

        encoder.reset();
        assert_eq!(encoder.available(), 16);
    }

    #[test]
    fn test_length_word_overflow_rejected() {
        let mut encoder = Encoder::new(2 * MAX_PACKET_SIZE);
        let header = BusHeader::command(1, 1);
        let payload = vec![0u8; header.max_payload() + 1];

        match encoder.encode(&header, &payload) {
            Err(BusError::MessageTooLarge { size, max }) => {
                assert!(size > max);
                assert_eq!(max, MAX_PACKET_SIZE);
            }
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }
        assert_eq!(encoder.available(), 2 * MAX_PACKET_SIZE);
    }

    #[test]
    fn test_largest_packet_per_variant() {
        let mut encoder = Encoder::new(2 * MAX_PACKET_SIZE);
        for header in [BusHeader::command(1, 1), BusHeader::telemetry(2, 0, 0)] {
            let payload = vec![0x5Au8; header.max_payload()];
            let packet = encoder.encode(&header, &payload).unwrap();
            assert_eq!(packet.len(), MAX_PACKET_SIZE);
            assert_eq!(&packet[4..6], &[0xFF, 0xFF]);
        }

        let mut decoder = Decoder::new(encoder.as_bytes());
        for _ in 0..2 {
            let (header, payload) = decoder.next().unwrap().unwrap();
            assert_eq!(payload.len(), header.max_payload());
        }
        assert!(decoder.next().is_none());
    }
}
