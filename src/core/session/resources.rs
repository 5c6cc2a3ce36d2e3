// src/core/session/resources.rs

//! Owning guards for the data-source resources held by a session.
//!
//! Each guard releases its resource exactly once: explicitly through
//! `release`, which reports the outcome, or on drop as a fallback.

use crate::core::driver::{
    ChangeHandler, ConnectionHandle, DataSourceDriver, DriverError, GroupHandle,
    SubscriptionHandle,
};
use std::sync::Arc;
use tracing::warn;

/// An open connection to a data source.
pub(crate) struct SourceConnection {
    driver: Arc<dyn DataSourceDriver>,
    handle: Option<ConnectionHandle>,
}

impl SourceConnection {
    pub(crate) fn open(
        driver: Arc<dyn DataSourceDriver>,
        source_name: &str,
    ) -> Result<Self, DriverError> {
        let handle = driver.connect(source_name)?;
        Ok(Self {
            driver,
            handle: Some(handle),
        })
    }

    pub(crate) fn handle(&self) -> ConnectionHandle {
        // Only `release` and `drop` take the handle, and both consume the guard.
        self.handle.unwrap_or(ConnectionHandle(0))
    }

    pub(crate) fn release(mut self) -> Result<(), DriverError> {
        match self.handle.take() {
            Some(handle) => self.driver.disconnect(handle),
            None => Ok(()),
        }
    }
}

impl Drop for SourceConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("Connection {} dropped without teardown; closing it.", handle);
            if let Err(e) = self.driver.disconnect(handle) {
                warn!("Closing connection {} failed: {}", handle, e);
            }
        }
    }
}

/// The subscription group of a session.
pub(crate) struct SubscriptionGroup {
    driver: Arc<dyn DataSourceDriver>,
    connection: ConnectionHandle,
    handle: Option<GroupHandle>,
}

impl SubscriptionGroup {
    pub(crate) fn create(
        driver: Arc<dyn DataSourceDriver>,
        connection: &SourceConnection,
        update_rate_ms: u32,
    ) -> Result<Self, DriverError> {
        let connection = connection.handle();
        let handle = driver.create_group(connection, update_rate_ms)?;
        Ok(Self {
            driver,
            connection,
            handle: Some(handle),
        })
    }

    pub(crate) fn handle(&self) -> GroupHandle {
        self.handle.unwrap_or(GroupHandle(0))
    }

    pub(crate) fn release(mut self) -> Result<(), DriverError> {
        match self.handle.take() {
            Some(handle) => self.driver.remove_group(self.connection, handle),
            None => Ok(()),
        }
    }
}

impl Drop for SubscriptionGroup {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("Group {} dropped without teardown; removing it.", handle);
            if let Err(e) = self.driver.remove_group(self.connection, handle) {
                warn!("Removing group {} failed: {}", handle, e);
            }
        }
    }
}

/// A change handler registered on a group.
pub(crate) struct Subscription {
    driver: Arc<dyn DataSourceDriver>,
    group: GroupHandle,
    handle: Option<SubscriptionHandle>,
}

impl Subscription {
    pub(crate) fn register(
        driver: Arc<dyn DataSourceDriver>,
        group: &SubscriptionGroup,
        handler: ChangeHandler,
    ) -> Result<Self, DriverError> {
        let group = group.handle();
        let handle = driver.subscribe(group, handler)?;
        Ok(Self {
            driver,
            group,
            handle: Some(handle),
        })
    }

    pub(crate) fn release(mut self) -> Result<(), DriverError> {
        match self.handle.take() {
            Some(handle) => self.driver.unsubscribe(self.group, handle),
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("Subscription {} dropped without teardown; cancelling it.", handle);
            if let Err(e) = self.driver.unsubscribe(self.group, handle) {
                warn!("Cancelling subscription {} failed: {}", handle, e);
            }
        }
    }
}
