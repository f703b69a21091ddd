//! Self-describing packet framing over a [`shmchan_ring::RingChannel`].
//!
//! Packets are laid back-to-back in the ring. Each one carries a backward
//! link to the previous packet's start (for diagnostics), a fixed 16-byte
//! descriptor, and a variant body. The framing layer moves opaque payload
//! bytes; their meaning belongs to callers.

mod body;
mod descriptor;
mod error;
mod stream;

pub use body::{PAGE_RANGE_SIZE, PacketBody, PageRange, decode_body};
pub use descriptor::{
    DESCRIPTOR_SIZE, FLAG_COMPLETION_REQUESTED, PREV_OFFSET_SIZE, PacketDescriptor, PacketType,
    WIRE_PREFIX_SIZE,
};
pub use error::PacketError;
pub use stream::{OutboundPacket, OwnedPacket, PacketReceiver, PacketSender, traverse_backward};
