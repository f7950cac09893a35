//! Toolchat is a terminal client for an AI chat backend that discovers,
//! configures, and runs MCP tool servers on the user's behalf.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the wire types and the [`api::Backend`] trait, with an
//!   HTTP implementation that opens the backend's streaming endpoints.
//! - [`core`] owns session state, decodes response streams into events,
//!   folds them into messages, and chains automatic follow-ups for function
//!   results.
//! - [`cli`] parses arguments and renders turns to the terminal.
//! - [`utils`] holds URL handling and the transcript log.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
