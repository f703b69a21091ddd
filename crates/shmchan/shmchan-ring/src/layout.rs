//! Shared-memory layout of a ring buffer region.
//!
//! A region is a single fixed-size block of memory shared by the two ends of
//! one channel direction. It is laid out so that both ends, compiled
//! independently, agree on every byte:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      RingHeader (4096 B)                     │
//! │  ┌─────────────┬────────────┬────────────────┬────────────┐  │
//! │  │ write_index │ read_index │ interrupt_mask │  padding   │  │
//! │  │ (4B atomic) │ (4B atomic)│   (4B atomic)  │ to page    │  │
//! │  └─────────────┴────────────┴────────────────┴────────────┘  │
//! ├──────────────────────────────────────────────────────────────┤
//! │                      buffer[0 .. C)                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The header is padded to a full page so `buffer[0]` begins on a page
//! boundary. Both indices live in `[0, C)`; one byte of capacity is reserved
//! so that `write_index == read_index` always means empty and occupancy
//! never exceeds `C - 1`.
//!
//! There is no magic or version word: the layout is fixed by the channel
//! protocol and both ends must agree on it before the region is exchanged.

use std::sync::atomic::{AtomicU32, Ordering};

/// Size of the ring header, and therefore the offset of `buffer[0]`.
pub const HEADER_SIZE: usize = 4096;

/// Smallest usable data-array capacity: one storable byte plus the byte
/// permanently reserved to disambiguate full from empty.
pub const MIN_CAPACITY: usize = 2;

/// Header at offset 0 of every region.
///
/// Each side mutates only its own index and reads the other side's with
/// acquire ordering; the release store on the own index is what makes the
/// data bytes behind it visible across the two domains.
#[repr(C)]
pub struct RingHeader {
    /// Next byte the producer will write, in `[0, C)`.
    pub write_index: AtomicU32,

    /// Next byte the consumer will read, in `[0, C)`.
    pub read_index: AtomicU32,

    /// Consumer-set hint: non-zero tells the producer to skip the
    /// out-of-band notification after a write. Advisory only.
    pub interrupt_mask: AtomicU32,

    /// Pads the header to `HEADER_SIZE` so the data array is page-aligned.
    _pad: [u8; HEADER_SIZE - 3 * size_of::<u32>()],
}

const _: () = assert!(size_of::<RingHeader>() == HEADER_SIZE);

impl RingHeader {
    /// Zero-initializes the live fields.
    ///
    /// Called exactly once, by whichever side creates the region. Attaching
    /// to an already-live region must never reset it.
    pub(crate) fn reset(&self) {
        self.write_index.store(0, Ordering::Relaxed);
        self.read_index.store(0, Ordering::Relaxed);
        self.interrupt_mask.store(0, Ordering::Release);
    }
}

/// Total region bytes needed for a data array of `capacity` bytes.
pub fn region_size_for(capacity: usize) -> usize {
    HEADER_SIZE + capacity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fills_exactly_one_page() {
        assert_eq!(size_of::<RingHeader>(), HEADER_SIZE);
        assert_eq!(region_size_for(128), HEADER_SIZE + 128);
    }
}
