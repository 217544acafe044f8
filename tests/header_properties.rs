//! Property-based tests for the header codec.
//!
//! These tests use proptest to check that for any field values:
//! - Encode/decode round-trips every header shape
//! - Encoded sizes are fixed per shape
//! - Short buffers are always rejected, never read past
//! - Masked fields never leak into neighbouring bits

use proptest::prelude::*;
use sbn_client::protocol::{
    decode_command_header, decode_header, decode_primary, decode_telemetry_header,
    encode_command_header, encode_primary, encode_telemetry_header, validate_checksum, BusHeader,
    CommandSecondaryHeader, Decoder, Encoder, PacketType, PrimaryHeader, SecondaryHeader,
    Sequence, StreamId, TelemetrySecondaryHeader, COMMAND_HEADER_SIZE, PRIMARY_HEADER_SIZE,
    TELEMETRY_HEADER_SIZE,
};
use sbn_client::BusError;

fn primary_strategy() -> impl Strategy<Value = PrimaryHeader> {
    (any::<u16>(), any::<u16>(), any::<u16>()).prop_map(|(stream_id, sequence, length)| {
        PrimaryHeader {
            stream_id,
            sequence,
            length,
        }
    })
}

fn command_sec_strategy() -> impl Strategy<Value = CommandSecondaryHeader> {
    (any::<u8>(), any::<u8>()).prop_map(|(function_code, checksum)| CommandSecondaryHeader {
        function_code,
        checksum,
    })
}

fn telemetry_sec_strategy() -> impl Strategy<Value = TelemetrySecondaryHeader> {
    (any::<u32>(), any::<u16>()).prop_map(|(s, ss)| TelemetrySecondaryHeader::new(s, ss))
}

fn bus_header_strategy() -> impl Strategy<Value = BusHeader> {
    prop_oneof![
        (0u16..0x800, any::<u8>()).prop_map(|(apid, fc)| BusHeader::command(apid, fc)),
        (0u16..0x800, any::<u32>(), any::<u16>())
            .prop_map(|(apid, s, ss)| BusHeader::telemetry(apid, s, ss)),
    ]
}

#[test]
fn prop_primary_round_trip() {
    proptest!(|(header in primary_strategy())| {
        let bytes = encode_primary(header.stream_id, header.sequence, header.length);
        prop_assert_eq!(bytes.len(), PRIMARY_HEADER_SIZE);
        prop_assert_eq!(decode_primary(&bytes).unwrap(), header);
        prop_assert_eq!(bytes, header.encode());
    });
}

#[test]
fn prop_command_round_trip() {
    proptest!(|(msg in primary_strategy(), sec in command_sec_strategy())| {
        let bytes = encode_command_header(&msg, &sec);
        prop_assert_eq!(bytes.len(), COMMAND_HEADER_SIZE);
        prop_assert_eq!(&bytes[8..], &[0u8; 4][..]);

        let decoded = decode_command_header(&bytes).unwrap();
        prop_assert_eq!(decoded.msg, msg);
        prop_assert_eq!(decoded.sec, sec);
    });
}

#[test]
fn prop_telemetry_round_trip() {
    proptest!(|(msg in primary_strategy(), sec in telemetry_sec_strategy())| {
        let bytes = encode_telemetry_header(&msg, &sec);
        prop_assert_eq!(bytes.len(), TELEMETRY_HEADER_SIZE);
        prop_assert_eq!(&bytes[12..], &[0u8; 4][..]);

        let decoded = decode_telemetry_header(&bytes).unwrap();
        prop_assert_eq!(decoded.msg, msg);
        prop_assert_eq!(decoded.sec, sec);
    });
}

#[test]
fn prop_spare_bytes_ignored() {
    proptest!(|(msg in primary_strategy(), sec in telemetry_sec_strategy(), spare in any::<[u8; 4]>())| {
        let mut bytes = encode_telemetry_header(&msg, &sec);
        bytes[12..].copy_from_slice(&spare);
        let decoded = decode_telemetry_header(&bytes).unwrap();
        prop_assert_eq!(decoded.sec, sec);
    });
}

#[test]
fn prop_short_buffers_rejected() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..TELEMETRY_HEADER_SIZE))| {
        let len = bytes.len();
        prop_assert_eq!(decode_primary(&bytes).is_err(), len < PRIMARY_HEADER_SIZE);
        prop_assert_eq!(decode_command_header(&bytes).is_err(), len < COMMAND_HEADER_SIZE);

        let is_malformed = matches!(
            decode_telemetry_header(&bytes),
            Err(BusError::MalformedHeader { expected: TELEMETRY_HEADER_SIZE, .. })
        );
        prop_assert!(is_malformed);
    });
}

#[test]
fn prop_arbitrary_bytes_never_panic() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..256))| {
        let _ = decode_header(&bytes);
        for item in Decoder::new(&bytes) {
            if item.is_err() {
                break;
            }
        }
    });
}

#[test]
fn prop_decoded_type_follows_bit_12() {
    proptest!(|(stream_id in any::<u16>())| {
        let header = decode_primary(&encode_primary(stream_id, 0, 0)).unwrap();
        let expected = if stream_id & 0x1000 != 0 {
            PacketType::Command
        } else {
            PacketType::Telemetry
        };
        prop_assert_eq!(header.packet_type(), expected);
    });
}

#[test]
fn prop_fields_stay_in_their_bits() {
    proptest!(|(apid in any::<u16>(), count in any::<u16>(), command in any::<bool>(), sec in any::<bool>())| {
        let packet_type = if command { PacketType::Command } else { PacketType::Telemetry };
        let sid = StreamId::new(apid, packet_type, sec);
        prop_assert_eq!(sid.apid(), apid & 0x07FF);
        prop_assert_eq!(sid.packet_type(), packet_type);
        prop_assert_eq!(sid.has_secondary_header(), sec);
        prop_assert_eq!(sid.version(), 0);

        let seq = Sequence::unsegmented(count);
        prop_assert_eq!(seq.count(), count & 0x3FFF);
        prop_assert_eq!(seq.raw() & 0xC000, 0xC000);
    });
}

#[test]
fn prop_length_word_is_total_minus_seven() {
    proptest!(|(total in 7usize..=(u16::MAX as usize + 7))| {
        let header = PrimaryHeader::new(StreamId::default(), Sequence::default(), total);
        prop_assert_eq!(header.length as usize, total - 7);
        prop_assert_eq!(header.total_len(), total);
    });
}

#[test]
fn prop_encoded_packets_decode() {
    proptest!(|(
        header in bus_header_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..512)
    )| {
        let mut encoder = Encoder::new(1024);
        let packet = encoder.encode(&header, &payload).unwrap().to_vec();

        prop_assert_eq!(packet.len(), header.size() + payload.len());
        prop_assert_eq!(
            u16::from_be_bytes([packet[4], packet[5]]) as usize,
            packet.len() - 7
        );

        let decoded = decode_header(&packet).unwrap();
        prop_assert_eq!(decoded.packet_type(), header.packet_type());
        prop_assert_eq!(decoded.msg_id(), header.msg_id());
        match (decoded.secondary, header.secondary) {
            (SecondaryHeader::Command(got), SecondaryHeader::Command(want)) => {
                prop_assert_eq!(got.code(), want.code());
                prop_assert!(validate_checksum(&packet));
            }
            (SecondaryHeader::Telemetry(got), SecondaryHeader::Telemetry(want)) => {
                prop_assert_eq!(got, want);
            }
            _ => prop_assert!(false, "secondary header variant changed"),
        }
    });
}
