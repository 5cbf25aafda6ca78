//! eew-notify library crate.
//!
//! Relays earthquake early warning revisions to chat and push channels. The
//! binary wires these modules together; they are exposed for integration testing.

pub mod config;
pub mod dispatch;
pub mod earthquake;
pub mod error;
pub mod logging;
pub mod map;
pub mod notification;
pub mod source;
pub mod utils;

pub use error::{Error, Result};
