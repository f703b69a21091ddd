//! Point-to-point ring buffer channel over a shared region.
//!
//! One direction of a duplex channel: a single logical producer and a single
//! logical consumer, each of which may be entered from several threads. The
//! two roles never block each other — each mutates only its own index and
//! observes the other's through acquire loads — but calls within one role
//! are serialized by that role's lock.
//!
//! # Index protocol
//!
//! - Producer: load own `write_index` (relaxed, under the producer lock),
//!   load `read_index` with `Acquire` to compute free space, copy bytes,
//!   then publish the new `write_index` with `Release`. The release store
//!   is the correctness hinge: a consumer that observes the new index is
//!   guaranteed to observe every byte copied before it.
//! - Consumer: symmetric, with `write_index` acquired and `read_index`
//!   released.
//!
//! One byte of capacity is permanently reserved, so occupancy is always in
//! `0 ..= C-1` and equal indices unambiguously mean empty.
//!
//! No operation blocks or suspends. Insufficient space or data is returned
//! immediately; retry and backpressure policy belong to the caller, as does
//! waking the far side (informed by [`RingChannel::interrupt_mask`]).

use crate::error::ChannelError;
use crate::layout::{HEADER_SIZE, MIN_CAPACITY, RingHeader};
use parking_lot::Mutex;
use std::fmt;
use std::ptr;
use std::sync::atomic::Ordering;

/// One direction of a shared-memory channel.
///
/// Wraps a region created elsewhere; the region's memory is owned by the
/// channel-setup collaborator and outlives this handle. Dropping the handle
/// releases nothing in the region and never erases it.
#[derive(Debug)]
pub struct RingChannel {
    /// Start of the region (header at offset 0, data at `HEADER_SIZE`).
    base: *mut u8,
    /// Length of the data array in bytes.
    capacity: u32,
    /// Serializes concurrent producers. Never held together with
    /// `consumer_lock` by this crate.
    producer_lock: Mutex<()>,
    /// Serializes concurrent consumers.
    consumer_lock: Mutex<()>,
}

// SAFETY: the shared header is only accessed through atomics; the data
// array is written only under `producer_lock` and read only under
// `consumer_lock`, with the written span published via the release store on
// `write_index` before the consumer can address it.
unsafe impl Send for RingChannel {}
unsafe impl Sync for RingChannel {}

/// Best-effort snapshot of a ring's state.
///
/// Assembled from relaxed loads without taking either lock, so the fields
/// may straddle a concurrent mutation and are not guaranteed mutually
/// consistent. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingDebugInfo {
    pub interrupt_mask: bool,
    pub read_index: u32,
    pub write_index: u32,
    pub occupancy: u32,
    pub free: u32,
}

impl fmt::Display for RingDebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ring(w={} r={} occ={} free={} masked={})",
            self.write_index, self.read_index, self.occupancy, self.free, self.interrupt_mask
        )
    }
}

impl RingChannel {
    /// Validates a region and returns its data capacity.
    fn check_region(len: usize) -> Result<u32, ChannelError> {
        let min = HEADER_SIZE + MIN_CAPACITY;
        if len < min {
            return Err(ChannelError::InvalidRegion { len, min });
        }
        u32::try_from(len - HEADER_SIZE)
            .map_err(|_| ChannelError::InvalidRegion { len, min })
    }

    /// Opens a channel over a fresh region, zero-initializing the header.
    ///
    /// Call this exactly once per region, on the side that allocated it.
    /// Fails with [`ChannelError::InvalidRegion`] if `len` cannot hold the
    /// header plus at least [`MIN_CAPACITY`] data bytes.
    ///
    /// # Safety
    /// `base` must point to at least `len` bytes of memory, valid and
    /// 4-byte aligned for the lifetime of the returned channel, and no
    /// other channel may be concurrently created over the same region.
    pub unsafe fn create(base: *mut u8, len: usize) -> Result<Self, ChannelError> {
        let chan = unsafe { Self::attach(base, len)? };
        chan.header().reset();
        tracing::debug!(capacity = chan.capacity, "ring region initialized");
        Ok(chan)
    }

    /// Opens a channel over an already-live region without resetting it.
    ///
    /// Used by the far side after the region handle has been exchanged, or
    /// to re-attach after the local handle was dropped.
    ///
    /// # Safety
    /// Same requirements as [`RingChannel::create`], except that the header
    /// may already carry live indices (they are left untouched).
    pub unsafe fn attach(base: *mut u8, len: usize) -> Result<Self, ChannelError> {
        let capacity = Self::check_region(len)?;
        Ok(Self {
            base,
            capacity,
            producer_lock: Mutex::new(()),
            consumer_lock: Mutex::new(()),
        })
    }

    #[inline(always)]
    fn header(&self) -> &RingHeader {
        // SAFETY: `base` points to a region at least HEADER_SIZE bytes long
        // (checked in `attach`), and the header is only touched atomically.
        unsafe { &*(self.base as *const RingHeader) }
    }

    #[inline(always)]
    fn data(&self) -> *mut u8 {
        // SAFETY: the region extends `capacity` bytes past the header.
        unsafe { self.base.add(HEADER_SIZE) }
    }

    /// Length of the data array in bytes. Usable occupancy is one less.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bytes queued between `r` and `w`, both in `[0, C)`.
    #[inline(always)]
    fn occupancy(&self, w: u32, r: u32) -> u32 {
        if w >= r { w - r } else { self.capacity - r + w }
    }

    /// Current interrupt-mask hint, without locking or ordering. Advisory:
    /// the producer consults it to decide whether to ring the doorbell, it
    /// is never a synchronization point.
    #[inline]
    pub fn interrupt_mask(&self) -> bool {
        self.header().interrupt_mask.load(Ordering::Relaxed) != 0
    }

    /// Sets the interrupt-mask hint. Consumer side: mask while draining,
    /// unmask before going idle.
    #[inline]
    pub fn set_interrupt_mask(&self, masked: bool) {
        self.header()
            .interrupt_mask
            .store(masked as u32, Ordering::Relaxed);
    }

    /// Copies `src` into the data array starting at index `at`, splitting
    /// into two contiguous copies when the span crosses the wrap boundary.
    /// Returns the index one past the last byte written, wrapped.
    #[inline]
    fn copy_in(&self, at: u32, src: &[u8]) -> u32 {
        let cap = self.capacity as usize;
        let at = at as usize;
        let tail = src.len().min(cap - at);
        // SAFETY: `at < cap` and both copy spans stay inside the data
        // array; the producer lock gives us exclusive write access to the
        // unpublished span.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.data().add(at), tail);
            if tail < src.len() {
                ptr::copy_nonoverlapping(src.as_ptr().add(tail), self.data(), src.len() - tail);
            }
        }
        ((at + src.len()) % cap) as u32
    }

    /// Copies `dst.len()` bytes out of the data array starting at index
    /// `from`, with the same wrap split as `copy_in`.
    #[inline]
    fn copy_out(&self, from: u32, dst: &mut [u8]) {
        let cap = self.capacity as usize;
        let from = from as usize;
        let tail = dst.len().min(cap - from);
        // SAFETY: `from < cap`; the span being read was published by a
        // release store on `write_index` that we observed with Acquire.
        unsafe {
            ptr::copy_nonoverlapping(self.data().add(from), dst.as_mut_ptr(), tail);
            if tail < dst.len() {
                ptr::copy_nonoverlapping(self.data(), dst.as_mut_ptr().add(tail), dst.len() - tail);
            }
        }
    }

    /// Writes an ordered gather list of byte segments as one atomic unit.
    ///
    /// Either every byte of every segment is enqueued and the new
    /// `write_index` published, or the call fails with
    /// [`ChannelError::InsufficientSpace`] and the ring is untouched. The
    /// caller retains ownership of the segment buffers.
    ///
    /// Notifying the far side is not done here; callers consult
    /// [`RingChannel::interrupt_mask`] and their signaling collaborator.
    pub fn write(&self, segments: &[&[u8]]) -> Result<(), ChannelError> {
        let total: u64 = segments.iter().map(|s| s.len() as u64).sum();

        let _guard = self.producer_lock.lock();

        // Own index: only this role mutates it, and we hold the role lock.
        let w = self.header().write_index.load(Ordering::Relaxed);
        let r = self.header().read_index.load(Ordering::Acquire);
        let free = self.capacity - 1 - self.occupancy(w, r);
        if total > free as u64 {
            return Err(ChannelError::InsufficientSpace { needed: total, free });
        }

        let mut at = w;
        for seg in segments {
            at = self.copy_in(at, seg);
        }

        // Publish: every byte above must be visible before the new index.
        self.header().write_index.store(at, Ordering::Release);
        Ok(())
    }

    /// Non-destructively copies `buf.len()` bytes from the front of the
    /// queue. `read_index` does not move; two consecutive peeks of the same
    /// length return identical bytes.
    pub fn peek(&self, buf: &mut [u8]) -> Result<(), ChannelError> {
        self.peek_at(buf, 0)
    }

    /// Like [`RingChannel::peek`], but starting `start_offset` bytes past
    /// `read_index`. Lets a consumer inspect mid-stream bytes (say, a
    /// variant header behind a descriptor) before committing to anything.
    pub fn peek_at(&self, buf: &mut [u8], start_offset: u32) -> Result<(), ChannelError> {
        let _guard = self.consumer_lock.lock();

        let r = self.header().read_index.load(Ordering::Relaxed);
        let w = self.header().write_index.load(Ordering::Acquire);
        let available = self.occupancy(w, r);
        let needed = start_offset as u64 + buf.len() as u64;
        if needed > available as u64 {
            return Err(ChannelError::InsufficientData { needed, available });
        }

        self.copy_out((r + start_offset) % self.capacity, buf);
        Ok(())
    }

    /// Copies `buf.len()` bytes starting `start_offset` bytes past
    /// `read_index`, then consumes the whole span: `read_index` advances by
    /// `start_offset + buf.len()`.
    ///
    /// The canonical packet pattern is peek the framing header at offset 0,
    /// size the packet, then `read` the full packet with offset 0 — one
    /// committing call per packet. On
    /// [`ChannelError::InsufficientData`] the index is untouched.
    pub fn read(&self, buf: &mut [u8], start_offset: u32) -> Result<(), ChannelError> {
        let _guard = self.consumer_lock.lock();

        let r = self.header().read_index.load(Ordering::Relaxed);
        let w = self.header().write_index.load(Ordering::Acquire);
        let available = self.occupancy(w, r);
        let needed = start_offset as u64 + buf.len() as u64;
        if needed > available as u64 {
            return Err(ChannelError::InsufficientData { needed, available });
        }

        self.copy_out((r + start_offset) % self.capacity, buf);

        // Release the consumed span back to the producer.
        let advanced = (r + needed as u32) % self.capacity;
        self.header().read_index.store(advanced, Ordering::Release);
        Ok(())
    }

    /// Consumer-side lower bound on the bytes currently readable.
    ///
    /// Unlocked; the value can only grow between this call and a subsequent
    /// `peek`/`read` by the same (sole logical) consumer.
    pub fn readable(&self) -> u32 {
        let r = self.header().read_index.load(Ordering::Relaxed);
        let w = self.header().write_index.load(Ordering::Acquire);
        self.occupancy(w, r)
    }

    /// Unlocked snapshot for diagnostics; see [`RingDebugInfo`].
    pub fn debug_info(&self) -> RingDebugInfo {
        let w = self.header().write_index.load(Ordering::Relaxed);
        let r = self.header().read_index.load(Ordering::Relaxed);
        let occupancy = self.occupancy(w, r);
        RingDebugInfo {
            interrupt_mask: self.header().interrupt_mask.load(Ordering::Relaxed) != 0,
            read_index: r,
            write_index: w,
            occupancy,
            free: self.capacity - 1 - occupancy,
        }
    }
}
