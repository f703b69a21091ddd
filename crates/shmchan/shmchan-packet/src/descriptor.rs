//! Fixed 16-byte packet descriptor.
//!
//! All multi-byte fields are little-endian on the wire; byte order is a
//! constant of the channel protocol, agreed by both ends at build time.
//! `data_offset8` and `length8` count 8-byte units from the start of the
//! descriptor, so every packet's declared extent is a multiple of 8 bytes
//! and payloads are padded up to that boundary by the sender.

use crate::error::PacketError;
use byteorder::{ByteOrder, LittleEndian};

/// Encoded size of [`PacketDescriptor`].
pub const DESCRIPTOR_SIZE: usize = 16;

/// Size of the backward link (`prev_start_offset`) preceding each
/// descriptor in the ring.
pub const PREV_OFFSET_SIZE: usize = 8;

/// Bytes a receiver must peek to size a packet: backward link + descriptor.
pub const WIRE_PREFIX_SIZE: usize = PREV_OFFSET_SIZE + DESCRIPTOR_SIZE;

/// Flag bit 0: the sender asks for a completion packet carrying the same
/// transaction id.
pub const FLAG_COMPLETION_REQUESTED: u16 = 1 << 0;

/// Packet type codes. Numeric values are part of the wire protocol and must
/// match the far end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    Invalid = 0,
    Synch = 1,
    AddTransferPageSet = 2,
    RemoveTransferPageSet = 3,
    EstablishGpadl = 4,
    TeardownGpadl = 5,
    DataInBand = 6,
    DataUsingTransferPages = 7,
    DataUsingGpadl = 8,
    DataUsingGpaDirect = 9,
    CancelRequest = 0xa,
    Completion = 0xb,
    DataUsingAdditionalPackets = 0xc,
    AdditionalData = 0xd,
}

impl PacketType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Invalid,
            1 => Self::Synch,
            2 => Self::AddTransferPageSet,
            3 => Self::RemoveTransferPageSet,
            4 => Self::EstablishGpadl,
            5 => Self::TeardownGpadl,
            6 => Self::DataInBand,
            7 => Self::DataUsingTransferPages,
            8 => Self::DataUsingGpadl,
            9 => Self::DataUsingGpaDirect,
            0xa => Self::CancelRequest,
            0xb => Self::Completion,
            0xc => Self::DataUsingAdditionalPackets,
            0xd => Self::AdditionalData,
            _ => return None,
        })
    }

    #[inline]
    pub fn raw(self) -> u16 {
        self as u16
    }
}

/// The fixed header of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketDescriptor {
    pub packet_type: PacketType,
    /// Offset of the opaque payload from the descriptor start, in 8-byte
    /// units. At least 2 (the descriptor itself).
    pub data_offset8: u16,
    /// Total packet length from the descriptor start, in 8-byte units.
    pub length8: u16,
    pub flags: u16,
    pub transaction_id: u64,
}

impl PacketDescriptor {
    /// Payload offset in bytes from the descriptor start.
    #[inline]
    pub fn data_offset(&self) -> usize {
        self.data_offset8 as usize * 8
    }

    /// Declared packet length in bytes, descriptor included.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.length8 as usize * 8
    }

    /// On-wire footprint: backward link plus the declared length.
    #[inline]
    pub fn wire_len(&self) -> usize {
        PREV_OFFSET_SIZE + self.total_len()
    }

    #[inline]
    pub fn completion_requested(&self) -> bool {
        self.flags & FLAG_COMPLETION_REQUESTED != 0
    }

    pub fn encode(&self, buf: &mut [u8; DESCRIPTOR_SIZE]) {
        LittleEndian::write_u16(&mut buf[0..2], self.packet_type.raw());
        LittleEndian::write_u16(&mut buf[2..4], self.data_offset8);
        LittleEndian::write_u16(&mut buf[4..6], self.length8);
        LittleEndian::write_u16(&mut buf[6..8], self.flags);
        LittleEndian::write_u64(&mut buf[8..16], self.transaction_id);
    }

    /// Decodes a descriptor and validates it against `available`, the bytes
    /// currently readable from the descriptor start onward. A declared
    /// length beyond `available` means the stream is desynchronized (whole
    /// packets are published atomically), so it is rejected here before any
    /// downstream reader can index past valid data.
    pub fn decode(buf: &[u8], available: u32) -> Result<Self, PacketError> {
        if buf.len() < DESCRIPTOR_SIZE {
            return Err(PacketError::Malformed("truncated descriptor"));
        }

        let raw_type = LittleEndian::read_u16(&buf[0..2]);
        let packet_type = PacketType::from_raw(raw_type)
            .ok_or(PacketError::Malformed("unknown packet type"))?;
        if packet_type == PacketType::Invalid {
            return Err(PacketError::Malformed("invalid packet type"));
        }

        let desc = Self {
            packet_type,
            data_offset8: LittleEndian::read_u16(&buf[2..4]),
            length8: LittleEndian::read_u16(&buf[4..6]),
            flags: LittleEndian::read_u16(&buf[6..8]),
            transaction_id: LittleEndian::read_u64(&buf[8..16]),
        };

        if (desc.data_offset8 as usize) < DESCRIPTOR_SIZE / 8 {
            return Err(PacketError::Malformed("payload offset inside descriptor"));
        }
        if desc.length8 < desc.data_offset8 {
            return Err(PacketError::Malformed("declared length before payload offset"));
        }
        if desc.total_len() as u64 > available as u64 {
            return Err(PacketError::Malformed("declared length exceeds readable bytes"));
        }

        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PacketDescriptor {
        PacketDescriptor {
            packet_type: PacketType::DataInBand,
            data_offset8: 2,
            length8: 5,
            flags: FLAG_COMPLETION_REQUESTED,
            transaction_id: 0xdead_beef_0042,
        }
    }

    #[test]
    fn codec_round_trip() {
        let desc = sample();
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        desc.encode(&mut buf);
        let back = PacketDescriptor::decode(&buf, 40).unwrap();
        assert_eq!(back, desc);
        assert!(back.completion_requested());
        assert_eq!(back.total_len(), 40);
        assert_eq!(back.data_offset(), 16);
    }

    #[test]
    fn rejects_length_beyond_available() {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        sample().encode(&mut buf);
        let err = PacketDescriptor::decode(&buf, 39).unwrap_err();
        assert_eq!(
            err,
            PacketError::Malformed("declared length exceeds readable bytes")
        );
    }

    #[test]
    fn rejects_invalid_and_unknown_types() {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        let mut desc = sample();
        desc.packet_type = PacketType::Invalid;
        desc.encode(&mut buf);
        assert!(PacketDescriptor::decode(&buf, 1024).is_err());

        LittleEndian::write_u16(&mut buf[0..2], 0x7fff);
        assert_eq!(
            PacketDescriptor::decode(&buf, 1024).unwrap_err(),
            PacketError::Malformed("unknown packet type")
        );
    }

    #[test]
    fn rejects_offset_inside_descriptor() {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        let mut desc = sample();
        desc.data_offset8 = 1;
        desc.encode(&mut buf);
        assert!(PacketDescriptor::decode(&buf, 1024).is_err());
    }
}
