//! Typed error handling for dispatch cycles.
//!
//! A cycle can fail in three ways:
//! - the transport could not be created
//! - the transport could not be reached, before or during the drain
//! - the spool itself failed (I/O, validation)
//!
//! None of these is fatal to the driving loop; the cycle is logged and the
//! next one retries. Per-message delivery failures never surface here, the
//! spool records them in its drain report.

use outpost_common::TransportError;
use outpost_spool::SpoolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport could not be reached; the spool is left as it was.
    #[error("Transport unreachable: {0}")]
    TransportUnreachable(TransportError),

    /// The factory could not produce a transport.
    #[error("Failed to create transport: {0}")]
    Factory(TransportError),

    /// The spool could not be read or updated.
    #[error("Spool error: {0}")]
    Spool(SpoolError),
}

impl From<SpoolError> for DispatchError {
    fn from(err: SpoolError) -> Self {
        match err {
            SpoolError::Transport(e) => Self::TransportUnreachable(e),
            other => Self::Spool(other),
        }
    }
}

impl DispatchError {
    /// Returns `true` if the next cycle may succeed without intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportUnreachable(_) | Self::Spool(SpoolError::Io(_)))
    }
}
