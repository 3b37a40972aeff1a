//! An abstraction layer for vision-capable LLMs.
//!
//! This crate establishes an unified protocol for the agent to talk to a
//! model provider: a transcript of user and assistant turns made of typed
//! content blocks (text, screenshots, tool calls and tool results) goes in,
//! and a stream of response events comes out. The agent core never sees a
//! provider's wire format.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
