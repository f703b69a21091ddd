//! Variant bodies layered behind the descriptor.
//!
//! Seven shapes cover the fourteen packet type codes. Every parser checks
//! its declared counts against the descriptor's extent before indexing, so
//! an inconsistent packet is a [`PacketError::Malformed`], never an
//! out-of-bounds access.
//!
//! Payload spans run from `data_offset8 * 8` to `length8 * 8` and are
//! therefore padded to an 8-byte multiple on the wire; callers that need a
//! byte-exact length carry it in the payload itself (as `AdditionalData`
//! does with `byte_count`).

use crate::descriptor::{DESCRIPTOR_SIZE, PacketDescriptor, PacketType};
use crate::error::PacketError;
use byteorder::{ByteOrder, LittleEndian};

/// Encoded size of one [`PageRange`].
pub const PAGE_RANGE_SIZE: usize = 8;

/// One span inside a registered page set or a guest-physical range list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub byte_count: u32,
    pub byte_offset: u32,
}

/// A decoded packet body, borrowing payload bytes from the packet buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody<'a> {
    /// Descriptor-only shape: `Synch`, `DataInBand`, `CancelRequest`,
    /// `Completion`, `DataUsingAdditionalPackets`. The payload is opaque
    /// and may be empty.
    Simple { payload: &'a [u8] },

    /// References a previously registered transfer-page set:
    /// `AddTransferPageSet`, `RemoveTransferPageSet`,
    /// `DataUsingTransferPages` (range count zero for remove).
    TransferPages {
        set_id: u16,
        sender_owns_set: bool,
        ranges: Vec<PageRange>,
    },

    /// `DataUsingGpadl`: data lives behind the registered handle.
    Gpadl { gpadl: u32 },

    /// `EstablishGpadl`: defines a new registered page-range list.
    EstablishGpadl { gpadl: u32, ranges: Vec<PageRange> },

    /// `TeardownGpadl`: releases a registered handle.
    TeardownGpadl { gpadl: u32 },

    /// `DataUsingGpaDirect`: inline range list immediately followed by raw
    /// payload bytes.
    GpaDirect {
        ranges: Vec<PageRange>,
        payload: &'a [u8],
    },

    /// `AdditionalData`: continuation fragment of a logical message larger
    /// than one packet. `payload.len()` is the fragment's exact
    /// `byte_count`.
    AdditionalData {
        total_bytes: u64,
        byte_offset: u32,
        payload: &'a [u8],
    },
}

impl PacketBody<'_> {
    /// Whether a packet of `ty` carries this body shape.
    pub fn matches_type(&self, ty: PacketType) -> bool {
        use PacketType::*;
        match self {
            Self::Simple { .. } => matches!(
                ty,
                Synch | DataInBand | CancelRequest | Completion | DataUsingAdditionalPackets
            ),
            Self::TransferPages { .. } => matches!(
                ty,
                AddTransferPageSet | RemoveTransferPageSet | DataUsingTransferPages
            ),
            Self::Gpadl { .. } => ty == DataUsingGpadl,
            Self::EstablishGpadl { .. } => ty == PacketType::EstablishGpadl,
            Self::TeardownGpadl { .. } => ty == PacketType::TeardownGpadl,
            Self::GpaDirect { .. } => ty == DataUsingGpaDirect,
            Self::AdditionalData { .. } => ty == PacketType::AdditionalData,
        }
    }

    /// Encodes the structured part that sits between the descriptor and the
    /// payload span. Empty for descriptor-only shapes.
    pub(crate) fn encode_header(&self) -> Vec<u8> {
        fn push_ranges(out: &mut Vec<u8>, ranges: &[PageRange]) {
            for r in ranges {
                out.extend_from_slice(&r.byte_count.to_le_bytes());
                out.extend_from_slice(&r.byte_offset.to_le_bytes());
            }
        }

        match self {
            Self::Simple { .. } => Vec::new(),
            Self::TransferPages {
                set_id,
                sender_owns_set,
                ranges,
            } => {
                let mut out = Vec::with_capacity(8 + ranges.len() * PAGE_RANGE_SIZE);
                out.extend_from_slice(&set_id.to_le_bytes());
                out.push(*sender_owns_set as u8);
                out.push(0); // reserved
                out.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
                push_ranges(&mut out, ranges);
                out
            }
            Self::Gpadl { gpadl } => {
                let mut out = Vec::with_capacity(8);
                out.extend_from_slice(&gpadl.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes()); // reserved
                out
            }
            Self::EstablishGpadl { gpadl, ranges } => {
                let mut out = Vec::with_capacity(8 + ranges.len() * PAGE_RANGE_SIZE);
                out.extend_from_slice(&gpadl.to_le_bytes());
                out.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
                push_ranges(&mut out, ranges);
                out
            }
            Self::TeardownGpadl { gpadl } => gpadl.to_le_bytes().to_vec(),
            Self::GpaDirect { ranges, .. } => {
                let mut out = Vec::with_capacity(8 + ranges.len() * PAGE_RANGE_SIZE);
                out.extend_from_slice(&0u32.to_le_bytes()); // reserved
                out.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
                push_ranges(&mut out, ranges);
                out
            }
            Self::AdditionalData {
                total_bytes,
                byte_offset,
                payload,
            } => {
                let mut out = Vec::with_capacity(16);
                out.extend_from_slice(&total_bytes.to_le_bytes());
                out.extend_from_slice(&byte_offset.to_le_bytes());
                out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                out
            }
        }
    }

    /// The raw payload bytes this body appends after its structured part.
    pub(crate) fn payload_bytes(&self) -> &[u8] {
        match self {
            Self::Simple { payload }
            | Self::GpaDirect { payload, .. }
            | Self::AdditionalData { payload, .. } => payload,
            _ => &[],
        }
    }
}

/// Bounds-checked little-endian cursor over a body slice.
struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PacketError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(PacketError::Malformed("variant header exceeds declared length"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u16(&mut self) -> Result<u16, PacketError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn read_u32(&mut self) -> Result<u32, PacketError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn read_u64(&mut self) -> Result<u64, PacketError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    /// Reads `count` page ranges, validating the count against the bytes
    /// left below the bound before any allocation or indexing.
    fn read_ranges(&mut self, count: u32) -> Result<Vec<PageRange>, PacketError> {
        let needed = count as u64 * PAGE_RANGE_SIZE as u64;
        if needed > (self.buf.len() - self.pos) as u64 {
            return Err(PacketError::Malformed("range list exceeds declared length"));
        }
        let mut ranges = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ranges.push(PageRange {
                byte_count: self.read_u32()?,
                byte_offset: self.read_u32()?,
            });
        }
        Ok(ranges)
    }
}

/// Parses the body of a decoded descriptor.
///
/// `body` holds the bytes from the end of the descriptor to the declared
/// end of the packet (`length8 * 8`), exactly as read from the ring.
pub fn decode_body<'a>(
    desc: &PacketDescriptor,
    body: &'a [u8],
) -> Result<PacketBody<'a>, PacketError> {
    if body.len() + DESCRIPTOR_SIZE < desc.total_len() {
        return Err(PacketError::Malformed("truncated packet body"));
    }
    if desc.data_offset() < DESCRIPTOR_SIZE || desc.data_offset() > desc.total_len() {
        return Err(PacketError::Malformed("payload offset outside packet"));
    }
    let payload_start = desc.data_offset() - DESCRIPTOR_SIZE;
    let payload_end = desc.total_len() - DESCRIPTOR_SIZE;
    let payload = &body[payload_start..payload_end];

    use PacketType::*;
    match desc.packet_type {
        Synch | DataInBand | CancelRequest | Completion | DataUsingAdditionalPackets => {
            Ok(PacketBody::Simple { payload })
        }

        AddTransferPageSet | RemoveTransferPageSet | DataUsingTransferPages => {
            let mut r = BodyReader::new(&body[..payload_end]);
            let set_id = r.read_u16()?;
            let sender_owns_set = r.read_u8()? != 0;
            let _reserved = r.read_u8()?;
            let count = r.read_u32()?;
            Ok(PacketBody::TransferPages {
                set_id,
                sender_owns_set,
                ranges: r.read_ranges(count)?,
            })
        }

        DataUsingGpadl => {
            let mut r = BodyReader::new(&body[..payload_start]);
            Ok(PacketBody::Gpadl { gpadl: r.read_u32()? })
        }

        PacketType::EstablishGpadl => {
            let mut r = BodyReader::new(&body[..payload_end]);
            let gpadl = r.read_u32()?;
            let count = r.read_u32()?;
            Ok(PacketBody::EstablishGpadl {
                gpadl,
                ranges: r.read_ranges(count)?,
            })
        }

        PacketType::TeardownGpadl => {
            let mut r = BodyReader::new(&body[..payload_end]);
            Ok(PacketBody::TeardownGpadl { gpadl: r.read_u32()? })
        }

        DataUsingGpaDirect => {
            // The range list must end at or before the payload span begins.
            let mut r = BodyReader::new(&body[..payload_start]);
            let _reserved = r.read_u32()?;
            let count = r.read_u32()?;
            Ok(PacketBody::GpaDirect {
                ranges: r.read_ranges(count)?,
                payload,
            })
        }

        PacketType::AdditionalData => {
            let mut r = BodyReader::new(&body[..payload_end]);
            let total_bytes = r.read_u64()?;
            let byte_offset = r.read_u32()?;
            let byte_count = r.read_u32()?;
            let data = r.take(byte_count as usize).map_err(|_| {
                PacketError::Malformed("fragment byte count exceeds declared length")
            })?;
            Ok(PacketBody::AdditionalData {
                total_bytes,
                byte_offset,
                payload: data,
            })
        }

        Invalid => Err(PacketError::Malformed("invalid packet type")),
    }
}
