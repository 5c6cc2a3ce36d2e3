// src/core/errors.rs

//! Defines the primary error type for the gateway library.

use crate::core::driver::DriverError;
use crate::core::value::DataType;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, covering the session, notification and broker layers.
/// Collaborator failures are translated into these kinds at the session boundary.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The data source refused to register a point.
    #[error("Registration of '{id}' failed: {reason}")]
    Registration { id: String, reason: String },

    /// The point identifier is not present in the directory.
    #[error("Unknown point '{0}'")]
    NotFound(String),

    /// The caller holds a point reference whose handle is no longer current.
    #[error("Stale handle {given} for '{id}' (current handle is {current})")]
    HandleMismatch { id: String, given: u32, current: u32 },

    /// Activating or deactivating the subscription group failed.
    #[error("Group state change failed: {0}")]
    StateChange(String),

    /// A change notification batch was empty or its arrays disagreed in length.
    #[error("Invalid change notification: {0}")]
    InvalidNotification(String),

    /// A client request could not be understood.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An I/O failure on a client connection.
    #[error("Transport error: {0}")]
    Transport(Arc<std::io::Error>),

    /// The session has no live connection to the data source.
    #[error("Session is not connected")]
    NotConnected,

    /// A data-source call (connect, group, read, write, subscribe) failed.
    #[error("Data source call '{op}' failed: {reason}")]
    Source { op: &'static str, reason: String },

    /// A wire literal could not be decoded into the point's data type.
    #[error("Cannot decode '{literal}' as {data_type}")]
    Decode { literal: String, data_type: DataType },

    /// The value read back after a write differs from the written value.
    #[error("Write verification failed for '{id}': wrote {written}, read back {read_back}")]
    WriteVerification {
        id: String,
        written: String,
        read_back: String,
    },

    /// Teardown completed, but at least one step reported an error.
    #[error("Disconnect completed with errors: {0}")]
    Teardown(Box<GatewayError>),
}

impl PartialEq for GatewayError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GatewayError::Transport(e1), GatewayError::Transport(e2)) => {
                e1.kind() == e2.kind() && e1.to_string() == e2.to_string()
            }
            (
                GatewayError::Registration { id: i1, reason: r1 },
                GatewayError::Registration { id: i2, reason: r2 },
            ) => i1 == i2 && r1 == r2,
            (GatewayError::NotFound(s1), GatewayError::NotFound(s2)) => s1 == s2,
            (
                GatewayError::HandleMismatch {
                    id: i1,
                    given: g1,
                    current: c1,
                },
                GatewayError::HandleMismatch {
                    id: i2,
                    given: g2,
                    current: c2,
                },
            ) => i1 == i2 && g1 == g2 && c1 == c2,
            (GatewayError::StateChange(s1), GatewayError::StateChange(s2)) => s1 == s2,
            (GatewayError::InvalidNotification(s1), GatewayError::InvalidNotification(s2)) => {
                s1 == s2
            }
            (GatewayError::Protocol(s1), GatewayError::Protocol(s2)) => s1 == s2,
            (
                GatewayError::Source { op: o1, reason: r1 },
                GatewayError::Source { op: o2, reason: r2 },
            ) => o1 == o2 && r1 == r2,
            (
                GatewayError::Decode {
                    literal: l1,
                    data_type: t1,
                },
                GatewayError::Decode {
                    literal: l2,
                    data_type: t2,
                },
            ) => l1 == l2 && t1 == t2,
            (GatewayError::Teardown(e1), GatewayError::Teardown(e2)) => e1 == e2,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl GatewayError {
    /// Wraps a collaborator error raised by the named data-source call.
    pub(crate) fn from_driver(op: &'static str, err: DriverError) -> Self {
        GatewayError::Source {
            op,
            reason: err.to_string(),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Transport(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for GatewayError {
    fn from(_: std::str::Utf8Error) -> Self {
        GatewayError::Protocol("request is not valid UTF-8".to_string())
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(e: tokio::task::JoinError) -> Self {
        GatewayError::Source {
            op: "blocking call",
            reason: e.to_string(),
        }
    }
}
