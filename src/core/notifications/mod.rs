// src/core/notifications/mod.rs

pub mod pending;
pub mod pipeline;

pub use pending::PendingChanges;
pub use pipeline::{ChangePipeline, EmitHandler, ItemValue};
