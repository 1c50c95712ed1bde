use async_trait::async_trait;

use crate::error::TransportError;

/// Boundary to a remote delivery service.
///
/// A transport owns at most one connection handle. `connect` establishes it
/// (or verifies it is usable), `send` hands a single raw message to the relay
/// and `close` releases the handle. A transport is owned by one processing
/// cycle at a time, so implementations do not need interior locking.
#[async_trait]
pub trait Transport: Send {
    /// Establish the connection, or confirm that the relay is reachable.
    ///
    /// # Errors
    /// [`TransportError::Unreachable`] if the relay cannot be contacted.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Deliver a single message.
    ///
    /// Implementations must reject a payload they cannot represent with
    /// [`TransportError::Malformed`] before contacting the relay.
    ///
    /// # Errors
    /// A classified [`TransportError`] describing why the relay did not
    /// accept the message.
    async fn send(
        &mut self,
        from: &str,
        to: &[String],
        message: &[u8],
    ) -> Result<(), TransportError>;

    /// Release the connection handle. Safe to call more than once.
    async fn close(&mut self);
}

/// Produces a fresh [`Transport`] for every processing cycle.
pub trait TransportFactory: Send + Sync {
    /// # Errors
    /// If the transport cannot be constructed from its configuration.
    fn create(&self) -> Result<Box<dyn Transport>, TransportError>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Result<Box<dyn Transport>, TransportError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn Transport>, TransportError> {
        self()
    }
}
