// src/core/driver/mod.rs

//! The boundary to the data-source driver.
//!
//! The driver is an opaque, handle-based, blocking API. The session owns every
//! handle it obtains from it and releases them in a defined order.

pub mod simulated;

use crate::core::value::{DataType, Quality, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use simulated::{DriverCall, Operation, SimulatedDriver};

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle_type!(
    /// A live connection to a data source.
    ConnectionHandle
);
handle_type!(
    /// A subscription group scoped to one connection.
    GroupHandle
);
handle_type!(
    /// A registered point. Stable until the point is unregistered.
    PointHandle
);
handle_type!(
    /// A registered change handler on a group.
    SubscriptionHandle
);

/// Errors reported by the data-source driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("data source '{0}' is unavailable")]
    Unavailable(String),

    #[error("invalid connection handle {0}")]
    InvalidConnection(ConnectionHandle),

    #[error("invalid group handle {0}")]
    InvalidGroup(GroupHandle),

    #[error("invalid point handle {0}")]
    InvalidPoint(PointHandle),

    #[error("unknown item '{0}'")]
    UnknownItem(String),

    #[error("value of type {given} cannot be stored in a {expected} point")]
    BadType { expected: DataType, given: DataType },

    #[error("call failed: {0}")]
    Failed(String),
}

/// A batch of point changes pushed by the data source, as parallel arrays.
///
/// Well-formed batches are non-empty and have equal-length arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub handles: Vec<PointHandle>,
    pub values: Vec<Value>,
    pub qualities: Vec<Quality>,
}

impl ChangeBatch {
    /// Builds a well-formed batch from `(handle, value, quality)` triples.
    pub fn from_changes(changes: impl IntoIterator<Item = (PointHandle, Value, Quality)>) -> Self {
        let mut batch = ChangeBatch::default();
        for (handle, value, quality) in changes {
            batch.handles.push(handle);
            batch.values.push(value);
            batch.qualities.push(quality);
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// The handler a driver invokes with every change batch of a subscribed group.
pub type ChangeHandler = Arc<dyn Fn(ChangeBatch) + Send + Sync>;

/// The handle-based interface of a process-data server.
///
/// All calls are synchronous. Implementations must tolerate concurrent calls
/// from different threads, but the gateway never issues two reads (or two
/// writes) against the same group at once.
pub trait DataSourceDriver: Send + Sync {
    /// Opens a connection to the named data source.
    fn connect(&self, source_name: &str) -> Result<ConnectionHandle, DriverError>;

    /// Closes a connection. All of its groups must already be removed.
    fn disconnect(&self, connection: ConnectionHandle) -> Result<(), DriverError>;

    /// Creates a subscription group with the given update interval.
    fn create_group(
        &self,
        connection: ConnectionHandle,
        update_rate_ms: u32,
    ) -> Result<GroupHandle, DriverError>;

    /// Removes a group from its connection.
    fn remove_group(
        &self,
        connection: ConnectionHandle,
        group: GroupHandle,
    ) -> Result<(), DriverError>;

    /// Registers a point, returning its handle and canonical data type.
    fn register_point(
        &self,
        group: GroupHandle,
        id: &str,
        requested: DataType,
    ) -> Result<(PointHandle, DataType), DriverError>;

    fn unregister_point(&self, group: GroupHandle, point: PointHandle) -> Result<(), DriverError>;

    /// Reads one point from the device, bypassing any cache.
    fn sync_read(
        &self,
        group: GroupHandle,
        point: PointHandle,
    ) -> Result<(Value, Quality), DriverError>;

    fn sync_write(
        &self,
        group: GroupHandle,
        point: PointHandle,
        value: Value,
    ) -> Result<(), DriverError>;

    /// Activates or deactivates change reporting for a group.
    fn set_group_active(&self, group: GroupHandle, active: bool) -> Result<(), DriverError>;

    /// Registers the handler receiving change batches for a group.
    fn subscribe(
        &self,
        group: GroupHandle,
        handler: ChangeHandler,
    ) -> Result<SubscriptionHandle, DriverError>;

    fn unsubscribe(
        &self,
        group: GroupHandle,
        subscription: SubscriptionHandle,
    ) -> Result<(), DriverError>;
}
