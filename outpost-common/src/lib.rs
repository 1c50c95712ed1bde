pub mod error;
pub mod logging;
pub mod traits;

pub use error::TransportError;
pub use traits::{Transport, TransportFactory};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
