mod channel;
mod error;
mod heap;
mod layout;

pub use channel::{RingChannel, RingDebugInfo};
pub use error::ChannelError;
pub use heap::HeapRegion;
pub use layout::{HEADER_SIZE, MIN_CAPACITY, RingHeader, region_size_for};
