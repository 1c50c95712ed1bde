//! Error types shared between the spool and the delivery layer.
//!
//! A transport failure is classified so the spool can decide what to do with
//! the message that triggered it:
//! - Permanent failures (the relay will never accept it) - drop, don't retry
//! - Transient failures (timeouts, busy relay) - leave queued for the next cycle
//! - Unreachable - the relay could not be contacted at all

use thiserror::Error;

/// Classified failure surfaced by a [`crate::Transport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The relay could not be reached (DNS, connect, TLS).
    #[error("Transport unreachable: {0}")]
    Unreachable(String),

    /// The relay rejected the message and will keep rejecting it
    /// (blocklisted address, policy rejection).
    #[error("Message rejected permanently: {0}")]
    Permanent(String),

    /// The relay failed in a way that may succeed later.
    #[error("Message rejected transiently: {0}")]
    Transient(String),

    /// The message was refused before any remote call was attempted.
    #[error("Malformed message: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Returns `true` if the message should be dropped from the queue.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_) | Self::Malformed(_))
    }

    /// Returns `true` if the message should stay queued for another attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Unreachable(_))
    }
}
