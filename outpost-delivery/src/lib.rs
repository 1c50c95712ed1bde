//! Queue dispatcher and transport adapters for handling outbound mail from
//! the spool
//!
//! This crate provides functionality to:
//! - Drain a maildir on a fixed cadence, or whenever it changes
//! - Debounce bursts of spool changes into a bounded number of cycles
//! - Deliver messages through an HTTP mail relay, classifying failures as
//!   permanent or transient

mod config;
mod dispatcher;
mod error;
pub mod transport;

pub use config::DispatcherConfig;
pub use dispatcher::{ChangeAction, DispatchState, Dispatcher};
pub use error::DispatchError;
pub use transport::{HttpTransport, HttpTransportConfig, HttpTransportFactory};
