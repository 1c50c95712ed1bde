//! Error types for the outpost-spool crate.
//!
//! This module provides typed error handling for spool operations including
//! file I/O, envelope parsing, path validation and directory watching.

use std::io;

use outpost_common::TransportError;
use thiserror::Error;

use crate::SpooledMessageId;

/// Top-level spool error type.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// I/O operation failed (file read/write/rename/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message not found in the spool.
    #[error("Message not found: {0}")]
    NotFound(SpooledMessageId),

    /// A spool file does not carry a usable envelope.
    #[error("Invalid spooled message: {0}")]
    InvalidMessage(String),

    /// An envelope that cannot be written to the spool.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Spool directory validation failed.
    #[error("Spool validation error: {0}")]
    Validation(#[from] ValidationError),

    /// File watcher error.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// The transport became unreachable part way through a drain.
    #[error("Transport error: {0}")]
    Transport(TransportError),
}

/// Spool directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Spool path does not exist.
    #[error("Spool path does not exist: {0}")]
    PathNotFound(String),

    /// Spool path is not a directory.
    #[error("Spool path is not a directory: {0}")]
    NotDirectory(String),

    /// Spool path contains `..` components.
    #[error("Spool path cannot contain '..' components: {0}")]
    ParentComponent(String),

    /// Spool path lies inside a system directory.
    #[error("Spool path cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: &'static str, path: String },
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;
