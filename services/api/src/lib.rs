//! Voice Gateway API Library Crate
//!
//! Configuration, shared state, REST handlers, routing and the device
//! WebSocket sessions. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
