//! An out-of-the-box agent that operates an iPhone through the iPhone
//! Mirroring app on macOS.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library, or through its C ABI, to bring the agent into your
//! own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod screen;
mod session;

pub use config::{Config, ConfigError};
pub use screen::{CaptureRegion, MacScreen};
pub use session::{DEFAULT_SYSTEM_PROMPT, Session, SessionBuilder};

/// Re-exports of [`mirror_agent_core`] crate.
pub mod core {
    pub use mirror_agent_core::*;
}
