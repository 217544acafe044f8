//! CCSDS Space Packet headers (cFS message layout)
//!
//! Layout:
//! ┌─────────────────────────────────────────────────────┐
//! │ PrimaryHeader (6 bytes, common to every packet)     │
//! ├─────────────────────────────────────────────────────┤
//! │ Secondary header: CMD 2 bytes | TLM 6 bytes         │
//! ├─────────────────────────────────────────────────────┤
//! │ Spare (4 bytes, always zero on the wire)            │
//! ├─────────────────────────────────────────────────────┤
//! │ Payload (variable, max 64KB)                        │
//! └─────────────────────────────────────────────────────┘
//!
//! Every word is written most-significant byte first. Nothing here depends
//! on host byte order, and no struct is ever cast straight onto the wire.
//!
//! Which secondary header follows the primary one is decided by the
//! packet-type bit of the stream id. There is no tag byte.

use std::fmt;

use crate::error::{BusError, Result};

/// Serialized size of the primary header.
pub const PRIMARY_HEADER_SIZE: usize = 6;
/// Explicit spare bytes that keep the payload 64-bit aligned.
pub const SPARE_SIZE: usize = 4;
/// Primary (6) + command secondary (2) + spare (4).
pub const COMMAND_HEADER_SIZE: usize =
    PRIMARY_HEADER_SIZE + CommandSecondaryHeader::SIZE + SPARE_SIZE;
/// Primary (6) + telemetry secondary (6) + spare (4).
pub const TELEMETRY_HEADER_SIZE: usize =
    PRIMARY_HEADER_SIZE + TelemetrySecondaryHeader::SIZE + SPARE_SIZE;
/// The length word stores `total - LENGTH_BIAS`.
pub const LENGTH_BIAS: usize = 7;
/// Largest packet the 16-bit length word can describe (65542 bytes).
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize + LENGTH_BIAS;

/// Secondary header starts right after the primary header.
const SECONDARY_OFFSET: usize = PRIMARY_HEADER_SIZE;
/// Offset of the function code byte inside a command packet.
const FUNCTION_CODE_OFFSET: usize = SECONDARY_OFFSET;
/// Offset of the checksum byte inside a command packet.
const CHECKSUM_OFFSET: usize = SECONDARY_OFFSET + 1;
const SECONDS_OFFSET: usize = SECONDARY_OFFSET;
const SUBSECONDS_OFFSET: usize = SECONDS_OFFSET + 4;

#[inline(always)]
fn ensure_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(BusError::MalformedHeader {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

#[inline(always)]
fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

#[inline(always)]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Packet type bit (0x1000 of the stream id)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Telemetry = 0,
    Command = 1,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telemetry => f.write_str("TLM"),
            Self::Command => f.write_str("CMD"),
        }
    }
}

/// Segmentation flags (0xC000 of the sequence word)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationFlags {
    Continuation = 0,
    First = 1,
    Last = 2,
    /// Complete, unsegmented packet. The only value cFS emits.
    Unsegmented = 3,
}

impl SegmentationFlags {
    #[inline(always)]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Continuation,
            1 => Self::First,
            2 => Self::Last,
            _ => Self::Unsegmented,
        }
    }
}

/// Bit-field view of the stream id word.
///
/// ```text
/// 0x07FF  0  application id
/// 0x0800 11  secondary header present
/// 0x1000 12  packet type (0 = TLM, 1 = CMD)
/// 0xE000 13  version
/// ```
///
/// Constructors mask every field to its width. Out-of-range values are
/// truncated silently, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamId(pub u16);

impl StreamId {
    pub const APID_MASK: u16 = 0x07FF;
    pub const SECONDARY_HEADER_FLAG: u16 = 0x0800;
    pub const PACKET_TYPE_FLAG: u16 = 0x1000;
    pub const VERSION_MASK: u16 = 0xE000;
    pub const VERSION_SHIFT: u32 = 13;

    pub fn new(apid: u16, packet_type: PacketType, secondary_header: bool) -> Self {
        let mut raw = apid & Self::APID_MASK;
        if secondary_header {
            raw |= Self::SECONDARY_HEADER_FLAG;
        }
        if packet_type == PacketType::Command {
            raw |= Self::PACKET_TYPE_FLAG;
        }
        Self(raw)
    }

    /// Replace the version bits. Only the low three bits of `version` are kept.
    pub fn with_version(self, version: u8) -> Self {
        let bits = ((version as u16) << Self::VERSION_SHIFT) & Self::VERSION_MASK;
        Self((self.0 & !Self::VERSION_MASK) | bits)
    }

    #[inline(always)]
    pub fn apid(self) -> u16 {
        self.0 & Self::APID_MASK
    }

    #[inline(always)]
    pub fn has_secondary_header(self) -> bool {
        self.0 & Self::SECONDARY_HEADER_FLAG != 0
    }

    #[inline(always)]
    pub fn packet_type(self) -> PacketType {
        if self.0 & Self::PACKET_TYPE_FLAG != 0 {
            PacketType::Command
        } else {
            PacketType::Telemetry
        }
    }

    /// Informational only; unknown versions are never rejected.
    #[inline(always)]
    pub fn version(self) -> u8 {
        ((self.0 & Self::VERSION_MASK) >> Self::VERSION_SHIFT) as u8
    }

    #[inline(always)]
    pub fn raw(self) -> u16 {
        self.0
    }
}

/// Bit-field view of the sequence word: 14-bit count, 2-bit segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sequence(pub u16);

impl Sequence {
    pub const COUNT_MASK: u16 = 0x3FFF;
    pub const FLAGS_SHIFT: u32 = 14;

    pub fn new(count: u16, flags: SegmentationFlags) -> Self {
        Self((count & Self::COUNT_MASK) | ((flags as u16) << Self::FLAGS_SHIFT))
    }

    /// Complete packet with the given count, which wraps at 14 bits.
    pub fn unsegmented(count: u16) -> Self {
        Self::new(count, SegmentationFlags::Unsegmented)
    }

    #[inline(always)]
    pub fn count(self) -> u16 {
        self.0 & Self::COUNT_MASK
    }

    #[inline(always)]
    pub fn flags(self) -> SegmentationFlags {
        SegmentationFlags::from_bits((self.0 >> Self::FLAGS_SHIFT) as u8)
    }

    #[inline(always)]
    pub fn raw(self) -> u16 {
        self.0
    }
}

/// CCSDS primary header - 6 bytes, three big endian words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrimaryHeader {
    pub stream_id: u16,
    pub sequence: u16,
    /// Total packet length in bytes minus 7.
    pub length: u16,
}

/// The base envelope. No secondary header variant is resolved at this level.
pub type Message = PrimaryHeader;

impl PrimaryHeader {
    pub const SIZE: usize = PRIMARY_HEADER_SIZE;

    pub fn new(stream_id: StreamId, sequence: Sequence, total_len: usize) -> Self {
        Self {
            stream_id: stream_id.raw(),
            sequence: sequence.raw(),
            length: Self::length_for(total_len),
        }
    }

    /// Length word for a packet of `total_len` bytes.
    ///
    /// Truncated to 16 bits; lengths below the bias wrap.
    #[inline(always)]
    pub fn length_for(total_len: usize) -> u16 {
        total_len.wrapping_sub(LENGTH_BIAS) as u16
    }

    /// Total packet length declared by the length word.
    #[inline(always)]
    pub fn total_len(&self) -> usize {
        self.length as usize + LENGTH_BIAS
    }

    #[inline(always)]
    pub fn stream(&self) -> StreamId {
        StreamId(self.stream_id)
    }

    #[inline(always)]
    pub fn seq(&self) -> Sequence {
        Sequence(self.sequence)
    }

    #[inline(always)]
    pub fn packet_type(&self) -> PacketType {
        self.stream().packet_type()
    }

    #[inline(always)]
    pub fn encode(&self) -> [u8; PRIMARY_HEADER_SIZE] {
        encode_primary(self.stream_id, self.sequence, self.length)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_primary(bytes)
    }
}

impl fmt::Display for PrimaryHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#06x} {:#06x} {:#06x}",
            self.stream_id, self.sequence, self.length
        )
    }
}

/// Pack the three primary header words MSB first. No range checks.
#[inline(always)]
pub fn encode_primary(stream_id: u16, sequence: u16, length: u16) -> [u8; PRIMARY_HEADER_SIZE] {
    let s = stream_id.to_be_bytes();
    let q = sequence.to_be_bytes();
    let l = length.to_be_bytes();
    [s[0], s[1], q[0], q[1], l[0], l[1]]
}

/// Unpack a primary header from the first six bytes of `bytes`.
///
/// Fails with [`BusError::MalformedHeader`] when fewer than six bytes are
/// supplied. The version bits are not validated.
#[inline(always)]
pub fn decode_primary(bytes: &[u8]) -> Result<PrimaryHeader> {
    ensure_len(bytes, PRIMARY_HEADER_SIZE)?;
    Ok(PrimaryHeader {
        stream_id: read_u16(bytes, 0),
        sequence: read_u16(bytes, 2),
        length: read_u16(bytes, 4),
    })
}

/// Bit 12 of the stream id, the only dispatch between command and telemetry.
#[inline(always)]
pub fn packet_type(header: &PrimaryHeader) -> PacketType {
    header.packet_type()
}

/// Command secondary header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandSecondaryHeader {
    /// 0x7F function code, 0x80 reserved
    pub function_code: u8,
    pub checksum: u8,
}

impl CommandSecondaryHeader {
    pub const SIZE: usize = 2;
    pub const CODE_MASK: u8 = 0x7F;

    /// Function code is masked to seven bits, checksum starts at zero.
    pub fn new(function_code: u8) -> Self {
        Self {
            function_code: function_code & Self::CODE_MASK,
            checksum: 0,
        }
    }

    #[inline(always)]
    pub fn code(&self) -> u8 {
        self.function_code & Self::CODE_MASK
    }
}

/// Telemetry secondary header: 4 byte seconds, 2 byte subseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TelemetrySecondaryHeader {
    pub seconds: u32,
    pub subseconds: u16,
}

impl TelemetrySecondaryHeader {
    pub const SIZE: usize = 6;

    pub fn new(seconds: u32, subseconds: u16) -> Self {
        Self {
            seconds,
            subseconds,
        }
    }
}

impl fmt::Display for TelemetrySecondaryHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} {:#06x}", self.seconds, self.subseconds)
    }
}

/// Full command envelope (12 bytes on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandHeader {
    pub msg: Message,
    pub sec: CommandSecondaryHeader,
}

impl CommandHeader {
    pub const SIZE: usize = COMMAND_HEADER_SIZE;
}

/// Full telemetry envelope (16 bytes on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TelemetryHeader {
    pub msg: Message,
    pub sec: TelemetrySecondaryHeader,
}

impl TelemetryHeader {
    pub const SIZE: usize = TELEMETRY_HEADER_SIZE;
}

pub fn encode_command_header(
    msg: &Message,
    sec: &CommandSecondaryHeader,
) -> [u8; COMMAND_HEADER_SIZE] {
    let mut out = [0u8; COMMAND_HEADER_SIZE];
    out[..PRIMARY_HEADER_SIZE].copy_from_slice(&msg.encode());
    out[FUNCTION_CODE_OFFSET] = sec.function_code;
    out[CHECKSUM_OFFSET] = sec.checksum;
    // spare stays zero
    out
}

/// Spare bytes are ignored, not validated.
pub fn decode_command_header(bytes: &[u8]) -> Result<CommandHeader> {
    ensure_len(bytes, COMMAND_HEADER_SIZE)?;
    Ok(CommandHeader {
        msg: decode_primary(bytes)?,
        sec: CommandSecondaryHeader {
            function_code: bytes[FUNCTION_CODE_OFFSET],
            checksum: bytes[CHECKSUM_OFFSET],
        },
    })
}

pub fn encode_telemetry_header(
    msg: &Message,
    sec: &TelemetrySecondaryHeader,
) -> [u8; TELEMETRY_HEADER_SIZE] {
    let mut out = [0u8; TELEMETRY_HEADER_SIZE];
    out[..PRIMARY_HEADER_SIZE].copy_from_slice(&msg.encode());
    out[SECONDS_OFFSET..SUBSECONDS_OFFSET].copy_from_slice(&sec.seconds.to_be_bytes());
    out[SUBSECONDS_OFFSET..SUBSECONDS_OFFSET + 2].copy_from_slice(&sec.subseconds.to_be_bytes());
    out
}

pub fn decode_telemetry_header(bytes: &[u8]) -> Result<TelemetryHeader> {
    ensure_len(bytes, TELEMETRY_HEADER_SIZE)?;
    Ok(TelemetryHeader {
        msg: decode_primary(bytes)?,
        sec: TelemetrySecondaryHeader {
            seconds: read_u32(bytes, SECONDS_OFFSET),
            subseconds: read_u16(bytes, SUBSECONDS_OFFSET),
        },
    })
}

/// Secondary header, resolved once from the packet-type bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecondaryHeader {
    Command(CommandSecondaryHeader),
    Telemetry(TelemetrySecondaryHeader),
}

impl SecondaryHeader {
    #[inline(always)]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Command(_) => PacketType::Command,
            Self::Telemetry(_) => PacketType::Telemetry,
        }
    }
}

/// Decoded header of a bus packet: primary plus the tagged secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusHeader {
    pub primary: PrimaryHeader,
    pub secondary: SecondaryHeader,
}

impl BusHeader {
    /// Header-only command packet. The length word is recomputed on encode.
    pub fn command(apid: u16, function_code: u8) -> Self {
        let stream = StreamId::new(apid, PacketType::Command, true);
        Self {
            primary: PrimaryHeader::new(stream, Sequence::unsegmented(0), COMMAND_HEADER_SIZE),
            secondary: SecondaryHeader::Command(CommandSecondaryHeader::new(function_code)),
        }
    }

    /// Header-only telemetry packet. The length word is recomputed on encode.
    pub fn telemetry(apid: u16, seconds: u32, subseconds: u16) -> Self {
        let stream = StreamId::new(apid, PacketType::Telemetry, true);
        Self {
            primary: PrimaryHeader::new(stream, Sequence::unsegmented(0), TELEMETRY_HEADER_SIZE),
            secondary: SecondaryHeader::Telemetry(TelemetrySecondaryHeader::new(
                seconds, subseconds,
            )),
        }
    }

    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.primary.sequence = sequence.raw();
        self
    }

    #[inline(always)]
    pub fn packet_type(&self) -> PacketType {
        self.secondary.packet_type()
    }

    /// Serialized size for this variant (12 or 16).
    #[inline(always)]
    pub fn size(&self) -> usize {
        match self.secondary {
            SecondaryHeader::Command(_) => COMMAND_HEADER_SIZE,
            SecondaryHeader::Telemetry(_) => TELEMETRY_HEADER_SIZE,
        }
    }

    /// Largest payload that still fits the length word behind this header.
    #[inline(always)]
    pub fn max_payload(&self) -> usize {
        MAX_PACKET_SIZE - self.size()
    }

    #[inline(always)]
    pub fn msg_id(&self) -> MsgId {
        MsgId::from_header(&self.primary)
    }

    /// Primary header as it goes on the wire: the packet-type bit and the
    /// secondary-header flag always agree with the secondary variant.
    fn wire_primary(&self) -> PrimaryHeader {
        let mut primary = self.primary;
        primary.stream_id |= StreamId::SECONDARY_HEADER_FLAG;
        match self.secondary {
            SecondaryHeader::Command(_) => primary.stream_id |= StreamId::PACKET_TYPE_FLAG,
            SecondaryHeader::Telemetry(_) => primary.stream_id &= !StreamId::PACKET_TYPE_FLAG,
        }
        primary
    }

    /// Write the header into the front of `buf`, returning bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let size = self.size();
        if buf.len() < size {
            return Err(BusError::BufferFull {
                needed: size,
                available: buf.len(),
            });
        }
        let primary = self.wire_primary();
        match &self.secondary {
            SecondaryHeader::Command(sec) => {
                buf[..size].copy_from_slice(&encode_command_header(&primary, sec))
            }
            SecondaryHeader::Telemetry(sec) => {
                buf[..size].copy_from_slice(&encode_telemetry_header(&primary, sec))
            }
        }
        Ok(size)
    }
}

impl fmt::Display for BusHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.primary, self.packet_type())?;
        match &self.secondary {
            SecondaryHeader::Command(sec) => {
                write!(f, " fc={} cksum={:#04x}", sec.code(), sec.checksum)
            }
            SecondaryHeader::Telemetry(sec) => write!(f, " time={}", sec),
        }
    }
}

/// Decode a full header, dispatching on the packet-type bit.
///
/// Needs 12 bytes for commands and 16 for telemetry.
pub fn decode_header(bytes: &[u8]) -> Result<BusHeader> {
    let primary = decode_primary(bytes)?;
    let secondary = match primary.packet_type() {
        PacketType::Command => SecondaryHeader::Command(decode_command_header(bytes)?.sec),
        PacketType::Telemetry => SecondaryHeader::Telemetry(decode_telemetry_header(bytes)?.sec),
    };
    Ok(BusHeader { primary, secondary })
}

/// Software bus message id.
///
/// For version 1 CCSDS headers this is the whole stream id word. It crosses
/// the native boundary as a 32-bit value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MsgId(pub u32);

impl MsgId {
    #[inline(always)]
    pub fn from_header(header: &PrimaryHeader) -> Self {
        Self(header.stream_id as u32)
    }

    #[inline(always)]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl From<u16> for MsgId {
    fn from(v: u16) -> Self {
        Self(v as u32)
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// A packet borrowed from a receive buffer
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub header: BusHeader,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Parse one packet from the front of `buf` (zero-copy payload).
    ///
    /// The declared length must cover the header and fit inside `buf`;
    /// trailing bytes past the declared length are ignored.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let header = decode_header(buf)?;
        let size = header.size();
        let total = header.primary.total_len();

        if total < size {
            return Err(BusError::MalformedHeader {
                expected: size,
                actual: total,
            });
        }
        if buf.len() < total {
            return Err(BusError::MalformedHeader {
                expected: total,
                actual: buf.len(),
            });
        }

        Ok(Self {
            header,
            payload: &buf[size..total],
        })
    }

    #[inline(always)]
    pub fn total_len(&self) -> usize {
        self.header.size() + self.payload.len()
    }
}

/// Fill in the command checksum of an encoded command packet.
///
/// The checksum byte is chosen so that the XOR of every byte of the packet,
/// checksum included, is 0xFF.
pub fn generate_checksum(packet: &mut [u8]) -> Result<()> {
    ensure_len(packet, COMMAND_HEADER_SIZE)?;
    packet[CHECKSUM_OFFSET] = 0;
    let sum = packet.iter().fold(0u8, |acc, b| acc ^ b);
    packet[CHECKSUM_OFFSET] = sum ^ 0xFF;
    Ok(())
}

/// True when the XOR of every byte of the packet is 0xFF.
#[inline(always)]
pub fn validate_checksum(packet: &[u8]) -> bool {
    packet.len() >= COMMAND_HEADER_SIZE && packet.iter().fold(0u8, |acc, b| acc ^ b) == 0xFF
}
