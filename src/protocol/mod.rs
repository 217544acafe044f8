//! Protocol Layer: CCSDS packet headers in network byte order
//!
//! Design principles:
//! - Fixed-size headers: 6 byte primary, 12 byte command, 16 byte telemetry
//! - Explicit big endian packing, never a struct cast
//! - No allocation: encode/decode directly to/from caller buffers

mod encoder;
mod message;

pub use encoder::{Decoder, Encoder};
pub use message::{
    decode_command_header, decode_header, decode_primary, decode_telemetry_header,
    encode_command_header, encode_primary, encode_telemetry_header, generate_checksum,
    packet_type, validate_checksum, BusHeader, CommandHeader, CommandSecondaryHeader, Message,
    MsgId, Packet, PacketType, PrimaryHeader, SecondaryHeader, SegmentationFlags, Sequence,
    StreamId, TelemetryHeader, TelemetrySecondaryHeader, COMMAND_HEADER_SIZE, LENGTH_BIAS,
    MAX_PACKET_SIZE, PRIMARY_HEADER_SIZE, SPARE_SIZE, TELEMETRY_HEADER_SIZE,
};
