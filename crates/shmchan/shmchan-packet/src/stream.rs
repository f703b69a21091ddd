//! Moving packets through a ring channel.
//!
//! The sender turns one packet into a gather list — backward link +
//! descriptor + structured header in one owned buffer, the caller's payload
//! borrowed as-is, a short pad — and hands it to a single atomic
//! [`RingChannel::write`]. The receiver peeks the fixed prefix to size the
//! packet, then consumes it with exactly one committing read.

use crate::body::{PacketBody, decode_body};
use crate::descriptor::{
    DESCRIPTOR_SIZE, FLAG_COMPLETION_REQUESTED, PREV_OFFSET_SIZE, PacketDescriptor, PacketType,
    WIRE_PREFIX_SIZE,
};
use crate::error::PacketError;
use byteorder::{ByteOrder, LittleEndian};
use shmchan_ring::{ChannelError, RingChannel};

/// A packet about to be framed and written.
#[derive(Debug, Clone)]
pub struct OutboundPacket<'a> {
    pub packet_type: PacketType,
    pub flags: u16,
    pub transaction_id: u64,
    pub body: PacketBody<'a>,
}

impl<'a> OutboundPacket<'a> {
    pub fn new(
        packet_type: PacketType,
        flags: u16,
        transaction_id: u64,
        body: PacketBody<'a>,
    ) -> Self {
        Self {
            packet_type,
            flags,
            transaction_id,
            body,
        }
    }

    /// In-band data packet asking for a completion.
    pub fn data_in_band(transaction_id: u64, payload: &'a [u8]) -> Self {
        Self::new(
            PacketType::DataInBand,
            FLAG_COMPLETION_REQUESTED,
            transaction_id,
            PacketBody::Simple { payload },
        )
    }

    /// Completion answering the transaction of an earlier packet.
    pub fn completion(transaction_id: u64, payload: &'a [u8]) -> Self {
        Self::new(
            PacketType::Completion,
            0,
            transaction_id,
            PacketBody::Simple { payload },
        )
    }
}

/// Producer-side framing state for one direction.
///
/// Tracks the previous packet's on-wire size so each packet can carry its
/// backward link. One sender per direction, matching the single logical
/// writer of the ring.
pub struct PacketSender<'c> {
    chan: &'c RingChannel,
    prev_wire_len: u64,
}

impl<'c> PacketSender<'c> {
    pub fn new(chan: &'c RingChannel) -> Self {
        Self {
            chan,
            prev_wire_len: 0,
        }
    }

    /// Frames `packet` and writes it as one atomic unit.
    ///
    /// [`ChannelError::InsufficientSpace`] passes through untouched; the
    /// ring and the sender state are unchanged and the caller may retry
    /// after the far side frees space.
    pub fn send(&mut self, packet: &OutboundPacket<'_>) -> Result<(), PacketError> {
        if !packet.body.matches_type(packet.packet_type) {
            return Err(PacketError::Malformed("body shape does not match packet type"));
        }

        let header = packet.body.encode_header();
        let payload = packet.body.payload_bytes();

        let data_offset = (DESCRIPTOR_SIZE + header.len()).next_multiple_of(8);
        let total = (data_offset + payload.len()).next_multiple_of(8);
        if total / 8 > u16::MAX as usize {
            return Err(PacketError::Malformed("packet exceeds maximum framed size"));
        }

        let desc = PacketDescriptor {
            packet_type: packet.packet_type,
            data_offset8: (data_offset / 8) as u16,
            length8: (total / 8) as u16,
            flags: packet.flags,
            transaction_id: packet.transaction_id,
        };

        // Backward link + descriptor + structured header, padded so the
        // payload lands exactly at `data_offset`.
        let mut head = Vec::with_capacity(PREV_OFFSET_SIZE + data_offset);
        head.extend_from_slice(&self.prev_wire_len.to_le_bytes());
        let mut dbuf = [0u8; DESCRIPTOR_SIZE];
        desc.encode(&mut dbuf);
        head.extend_from_slice(&dbuf);
        head.extend_from_slice(&header);
        head.resize(PREV_OFFSET_SIZE + data_offset, 0);

        let pad = [0u8; 8];
        let tail = &pad[..total - data_offset - payload.len()];

        self.chan.write(&[&head, payload, tail])?;
        self.prev_wire_len = (PREV_OFFSET_SIZE + total) as u64;
        Ok(())
    }
}

/// A packet pulled out of the ring, owning its bytes.
#[derive(Debug, Clone)]
pub struct OwnedPacket {
    prev_start_offset: u64,
    desc: PacketDescriptor,
    /// Backward link + descriptor + body, exactly as read.
    raw: Vec<u8>,
}

impl OwnedPacket {
    pub fn descriptor(&self) -> &PacketDescriptor {
        &self.desc
    }

    /// Byte distance back to the previous packet's start; 0 for the first
    /// packet of the stream.
    pub fn prev_start_offset(&self) -> u64 {
        self.prev_start_offset
    }

    /// Parses the variant body, borrowing payload bytes from this packet.
    pub fn body(&self) -> Result<PacketBody<'_>, PacketError> {
        decode_body(&self.desc, &self.raw[WIRE_PREFIX_SIZE..])
    }
}

/// Consumer-side framing over one direction.
pub struct PacketReceiver<'c> {
    chan: &'c RingChannel,
}

impl<'c> PacketReceiver<'c> {
    pub fn new(chan: &'c RingChannel) -> Self {
        Self { chan }
    }

    /// Pulls the next packet, or `Ok(None)` on an empty ring.
    ///
    /// The body is parsed once here so a malformed packet surfaces at
    /// receive time; on [`PacketError::Malformed`] the channel should be
    /// torn down, since the next packet boundary can no longer be trusted.
    pub fn try_recv(&self) -> Result<Option<OwnedPacket>, PacketError> {
        let mut prefix = [0u8; WIRE_PREFIX_SIZE];
        match self.chan.peek(&mut prefix) {
            Ok(()) => {}
            Err(ChannelError::InsufficientData { available, .. }) => {
                if available == 0 {
                    return Ok(None);
                }
                // Writes publish whole packets; a partial prefix means the
                // stream is desynchronized.
                tracing::warn!(available, "ring holds less than a packet prefix");
                return Err(PacketError::Malformed("ring holds less than a packet prefix"));
            }
            Err(e) => return Err(e.into()),
        }

        let prev_start_offset = LittleEndian::read_u64(&prefix[..PREV_OFFSET_SIZE]);
        let available = self.chan.readable() - PREV_OFFSET_SIZE as u32;
        let desc = PacketDescriptor::decode(&prefix[PREV_OFFSET_SIZE..], available)
            .inspect_err(|e| tracing::warn!(error = %e, "rejected packet descriptor"))?;

        let mut raw = vec![0u8; desc.wire_len()];
        self.chan.read(&mut raw, 0)?;

        let packet = OwnedPacket {
            prev_start_offset,
            desc,
            raw,
        };
        packet
            .body()
            .inspect_err(|e| tracing::warn!(error = %e, "rejected packet body"))?;
        Ok(Some(packet))
    }
}

/// Walks the packet stream backward from `start_offset` (bytes past
/// `read_index`, naming a packet start) using each packet's backward link.
///
/// Purely diagnostic and read-only: `read_index` does not move. Returns the
/// visited packet-start offsets, newest first, stopping at the stream head,
/// at the edge of the readable window (older packets are already consumed),
/// or after `limit` entries.
pub fn traverse_backward(
    chan: &RingChannel,
    start_offset: u32,
    limit: usize,
) -> Result<Vec<u32>, PacketError> {
    let readable = chan.readable();
    let mut offsets = Vec::new();
    let mut off = start_offset;

    while offsets.len() < limit {
        if off as u64 + PREV_OFFSET_SIZE as u64 > readable as u64 {
            return Err(PacketError::Malformed("offset outside readable window"));
        }
        let mut link = [0u8; PREV_OFFSET_SIZE];
        chan.peek_at(&mut link, off)?;
        offsets.push(off);

        let prev = u64::from_le_bytes(link);
        if prev == 0 || prev > off as u64 {
            break;
        }
        off -= prev as u32;
    }
    Ok(offsets)
}
