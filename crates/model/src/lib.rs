//! The protocol between the agent and a language model backend.
//!
//! Every backend (the local Ollama server, the scripted model used in
//! tests) implements [`ModelProvider`], and the rest of the program only
//! talks to that trait. Requests are plain data, and responses are polled
//! as a stream of [`ModelResponseEvent`]s.
//!
//! Types in this crate don't define any behavior, they are the contract
//! implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
