use shmchan_ring::ChannelError;
use thiserror::Error;

/// Errors reported by the framing layer.
///
/// `Malformed` means the byte stream is no longer trustworthy: either a
/// protocol bug or a corrupted/desynchronized peer. It is fatal at channel
/// scope — tear the channel down and reopen it rather than keep parsing,
/// since a bad boundary invalidates every packet after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    /// A declared count or length is inconsistent with the descriptor or
    /// with the bytes actually available.
    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    /// Ring-level condition, passed through untouched (notably
    /// `InsufficientSpace`, which the caller's retry policy handles).
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
