//! Page-aligned heap-backed region for tests, benches, and single-process
//! channels. Production regions come from the setup collaborator (typically
//! a mapped file or a hypervisor-granted range); this allocates an
//! equivalent block without touching the filesystem.

use crate::layout::region_size_for;
use std::alloc::{self, Layout};

/// An owned, zero-filled region sized for `capacity` data bytes.
pub struct HeapRegion {
    ptr: *mut u8,
    layout: Layout,
}

// SAFETY: sole owner of the allocation; sharing is done via raw pointer
// hand-off to `RingChannel`, which carries its own synchronization.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    /// Allocates a zeroed region with a page-aligned base.
    ///
    /// # Panics
    /// Panics on allocation failure or a zero-size layout; region sizing
    /// bugs in tests should fail loudly.
    pub fn new(capacity: usize) -> Self {
        let layout = Layout::from_size_align(region_size_for(capacity), 4096)
            .expect("invalid region layout");
        // SAFETY: layout has non-zero size (header alone is 4096 bytes).
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            alloc::handle_alloc_error(layout);
        }
        Self { ptr, layout }
    }

    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { alloc::dealloc(self.ptr, self.layout) };
    }
}
