//! Error types for the outpost-verp crate.
//!
//! Decoding never fails: an address that cannot be verified simply yields no
//! identities. These errors only cover inputs the caller controls.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerpError {
    /// A label contains a structural delimiter or is empty.
    #[error("Invalid label {0:?}: labels must be non-empty and may not contain '+', '%', '.', '@' or whitespace")]
    InvalidLabel(String),

    /// The sender address could not be parsed as a single mailbox.
    #[error("Invalid sender address: {0}")]
    InvalidSender(String),
}
