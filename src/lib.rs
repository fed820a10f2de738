//! Causette is a terminal client for a chat-completion service that streams
//! replies as server-sent events.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the wire payloads and the [`api::ChatBackend`] seam, with
//!   an HTTP implementation in [`api::ApiClient`].
//! - [`core`] turns response bytes into frames and deltas, runs each request
//!   as a cancellable stream, accumulates the conversation, and exposes the
//!   send/stop contract through [`core::orchestrator`].
//! - [`cli`] parses arguments and runs the interactive chat and one-shot
//!   commands.
//! - [`utils`] holds URL helpers and the conversation log.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
