//! Shared helpers for the criterion benches.

use shmchan_ring::{HeapRegion, RingChannel};

/// Builds a channel over a fresh heap region; the region must stay alive
/// for as long as the channel is used.
pub fn make_channel(capacity: usize) -> (HeapRegion, RingChannel) {
    let region = HeapRegion::new(capacity);
    // SAFETY: freshly allocated, correctly sized, kept alive by the caller.
    let chan = unsafe { RingChannel::create(region.as_mut_ptr(), region.len()) }
        .expect("failed to create bench channel");
    (region, chan)
}

pub fn make_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
