//! Maildir spool for queued outbound mail.
//!
//! Producers write a message to `tmp/` and atomically rename it into `new/`,
//! so a message only becomes visible once it is complete. The dispatcher
//! drains `new/` and `cur/` through a [`outpost_common::Transport`], removing
//! delivered messages, setting aside permanently rejected ones and leaving
//! everything else for the next cycle.

pub mod config;
pub mod error;
pub mod maildir;
pub mod message;
pub mod types;
pub mod watcher;

pub use config::SpoolConfig;
pub use error::{Result, SpoolError, ValidationError};
pub use maildir::{DrainReport, Maildir};
pub use message::SpoolMessage;
pub use types::SpooledMessageId;
pub use watcher::{ChangeEvent, SpoolWatcher};
