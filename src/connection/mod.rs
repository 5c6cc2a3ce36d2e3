// src/connection/mod.rs

//! Manages the lifecycle of a single client connection: framing, request
//! routing, and release of its admission slot.

mod guard;
mod handler;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
