// src/core/session/mod.rs

//! The session/item management layer: the connection to the data source, its
//! subscription group and the directory of registered points.

mod core;
pub mod directory;
mod resources;

pub use self::core::{Session, SessionConfig};
pub use directory::{Directory, Point};
