//! Core logic: the model client, tool execution, the agent loop and the
//! prompt-level model handle.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod agent;
mod handle;
mod model_client;
mod reply;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentError};
pub use handle::{INIT_FAILED_MESSAGE, ModelHandle, ModelSettings};
pub use model_client::{ModelClient, ModelClientResponse};
pub use reply::Reply;
