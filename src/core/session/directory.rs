// src/core/session/directory.rs

//! The point directory: the single source of truth for which points are
//! registered on the data source and under which handle.

use crate::core::GatewayError;
use crate::core::driver::{DataSourceDriver, GroupHandle, PointHandle};
use crate::core::value::DataType;
use indexmap::IndexMap;
use tracing::{debug, warn};

/// A registered point. Created on successful registration, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Point {
    pub id: String,
    pub handle: PointHandle,
    /// The canonical type reported by the data source.
    pub data_type: DataType,
}

/// Maps point identifiers to their registration on the data source.
///
/// Every handle held here is live on the data source. A handle is only
/// dropped from the directory once the data source confirmed its removal.
#[derive(Debug, Default)]
pub struct Directory {
    points: IndexMap<String, Point>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` with the data source, unless it is already known.
    pub fn add(
        &mut self,
        driver: &dyn DataSourceDriver,
        group: GroupHandle,
        id: &str,
        requested: DataType,
    ) -> Result<Point, GatewayError> {
        if let Some(existing) = self.points.get(id) {
            debug!("Point '{}' already registered as handle {}.", id, existing.handle);
            return Ok(existing.clone());
        }

        let (handle, data_type) =
            driver
                .register_point(group, id, requested)
                .map_err(|e| GatewayError::Registration {
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;

        let point = Point {
            id: id.to_string(),
            handle,
            data_type,
        };
        self.points.insert(id.to_string(), point.clone());
        debug!("Registered point '{}' as handle {} ({}).", id, handle, data_type);
        Ok(point)
    }

    /// Unregisters `id`. The entry is kept if the data source refuses.
    pub fn remove(
        &mut self,
        driver: &dyn DataSourceDriver,
        group: GroupHandle,
        id: &str,
    ) -> Result<(), GatewayError> {
        let handle = self
            .points
            .get(id)
            .map(|p| p.handle)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        driver
            .unregister_point(group, handle)
            .map_err(|e| GatewayError::from_driver("unregister_point", e))?;

        self.points.shift_remove(id);
        debug!("Unregistered point '{}' (handle {}).", id, handle);
        Ok(())
    }

    /// Attempts to remove every point, keeping those the data source refuses.
    /// Succeeds only if the directory ends up empty.
    pub fn remove_all(
        &mut self,
        driver: &dyn DataSourceDriver,
        group: GroupHandle,
    ) -> Result<(), GatewayError> {
        let ids: Vec<String> = self.points.keys().cloned().collect();
        let mut last_error = None;

        for id in ids {
            if let Err(e) = self.remove(driver, group, &id) {
                warn!("Failed to remove point '{}': {}", id, e);
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) if !self.points.is_empty() => Err(e),
            _ => Ok(()),
        }
    }

    pub fn lookup(&self, id: &str) -> Option<&Point> {
        self.points.get(id)
    }

    /// Resolves a data-source handle back to its point.
    pub fn find_by_handle(&self, handle: PointHandle) -> Option<&Point> {
        self.points.values().find(|p| p.handle == handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.values()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
