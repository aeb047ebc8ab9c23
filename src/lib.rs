//! Calango is a multi-provider LLM chat client.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the document store, provider and credential resolution,
//!   streaming chat turns, usage accounting, sessions and the arena.
//! - [`api`] defines the `chat/completions` payloads spoken on the wire.
//! - [`cli`] parses arguments and renders results as plain text.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which loads [`core::config::Config`] and
//! opens a [`core::app::Calango`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
