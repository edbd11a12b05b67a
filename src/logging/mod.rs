//! Structured logging
//!
//! Self-healing paths in the access engine (records rewritten, synthesized or
//! removed, duplicate page rows dropped) log at `info`/`warn`. Individual access
//! checks are never logged above `debug`.

pub mod subscriber;

pub use subscriber::*;
