pub mod app;
pub mod arena;
pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod interactions;
pub mod message;
pub mod persona;
pub mod providers;
pub mod routes;
pub mod sessions;
pub mod store;
pub mod stream_errors;
pub mod usage;
