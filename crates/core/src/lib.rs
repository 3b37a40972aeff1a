//! Core logic of the mirroring agent: the agent loop that turns model
//! decisions into cursor actions, the contracts for the mirrored device,
//! and the tools the model may call.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod device;
mod error;
mod model_client;
pub mod tool;
pub mod transcript;

pub use agent::{
    Agent, AgentBuilder, DEFAULT_CYCLE_DELAY, DEFAULT_MAX_TURNS, TaskHandle,
};
pub use error::TaskError;
