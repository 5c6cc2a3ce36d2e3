// src/core/mod.rs

//! The central module: the data model, the data source boundary, the
//! session, the notification pipeline, and the wire protocol.

pub mod driver;
pub mod errors;
pub mod handler;
pub mod metrics;
pub mod notifications;
pub mod protocol;
pub mod session;
pub mod state;
pub mod value;

pub use errors::GatewayError;
