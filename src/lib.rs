#![forbid(unsafe_code)]

//! Public entry point for the VideoTube backend crate.
//!
//! The binary in `src/bin/backend.rs` only parses flags and serves the router
//! built by [`api::router`]; everything else lives here so integration tests
//! can drive the exact same stack.

pub mod api;
pub mod auth;
pub mod config;
pub mod media;
pub mod models;
pub mod security;
pub mod store;
