//! Charla is a terminal chat client for models served by a local Ollama
//! instance.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns runtime state, configuration, the streaming consumption
//!   loop, the transcript store, and document context handling.
//! - [`ui`] renders the terminal interface and runs the interactive event
//!   loop that drives user input and display updates.
//! - [`api`] defines the generate/tags payloads exchanged with the inference
//!   server.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which initializes and dispatches into
//! [`core::app`] and [`ui::chat_loop`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
