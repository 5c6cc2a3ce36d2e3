// src/core/protocol/mod.rs

//! The line-oriented request/response protocol spoken with clients.

pub mod codec;
pub mod request;
pub mod response;

pub use codec::GatewayCodec;
pub use request::{Request, Verb, tokenize};
pub use response::Response;
