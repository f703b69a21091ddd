use thiserror::Error;

/// Errors reported by the ring channel.
///
/// `InsufficientSpace` and `InsufficientData` are expected, non-fatal
/// conditions: the operation mutated nothing and the caller decides whether
/// and when to retry (typically after the far side's notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The region is too small to hold the header plus a usable data array.
    #[error("region of {len} bytes cannot hold a ring (need at least {min} bytes)")]
    InvalidRegion { len: usize, min: usize },

    /// A write was larger than the free space at the time of the call.
    #[error("write of {needed} bytes exceeds free space of {free} bytes")]
    InsufficientSpace { needed: u64, free: u32 },

    /// A peek or read asked for more bytes than are currently queued.
    #[error("requested {needed} bytes but only {available} are queued")]
    InsufficientData { needed: u64, available: u32 },
}
