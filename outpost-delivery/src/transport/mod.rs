//! Transport adapters
//!
//! The [`outpost_common::Transport`] contract lives in `outpost-common` so the
//! spool can drain through it; the implementations live here.

mod http;

pub use http::{HttpTransport, HttpTransportConfig, HttpTransportFactory, classify_status};
