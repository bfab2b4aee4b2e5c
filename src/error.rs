//! Error types for the layer codec and envelope pipeline.

use thiserror::Error;

/// Why a buffer could not be parsed as a layer frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer than 4 bytes: no room for the wrapped-key length.
    #[error("frame shorter than length prefix ({len} bytes)")]
    MissingLength { len: usize },

    /// Declared wrapped-key length plus IV and tag exceeds the buffer.
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Wrapped key too large to describe in a u32 prefix.
    #[error("wrapped key length {len} does not fit the length prefix")]
    Oversized { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed or structurally invalid key material.
    #[error("key error: {0}")]
    Key(String),

    /// Corrupted or truncated envelope, or wrong layer count.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Key unwrap or symmetric decryption failed its integrity check.
    ///
    /// Carries no cause: wrong key, wrong order and tampering are reported
    /// identically.
    #[error("decryption failed")]
    Decryption,

    /// The OS random source failed.
    #[error("random source unavailable")]
    Rng,

    /// A chain of zero authorities was requested.
    #[error("at least one authority is required")]
    NoAuthorities,

    /// Authority indices are `u32`; a larger chain cannot be numbered.
    #[error("{0} authorities exceed the u32 index range")]
    TooManyAuthorities(usize),

    #[error("layer count mismatch: expected {expected} authorities, got {actual}")]
    LayerCountMismatch { expected: usize, actual: usize },

    /// Authority chain is not exactly `1..=N` in ascending order.
    #[error("authority at position {position} has index {index}, expected {}", .position + 1)]
    AuthorityOrder { position: usize, index: u32 },
}

impl Error {
    pub(crate) fn key(err: impl core::fmt::Display) -> Self {
        Self::Key(err.to_string())
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
