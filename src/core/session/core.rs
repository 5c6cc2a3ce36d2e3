// src/core/session/core.rs

//! Defines the `Session`: one connection to a data source, one subscription
//! group, and the directory of registered points.

use super::directory::{Directory, Point};
use super::resources::{SourceConnection, Subscription, SubscriptionGroup};
use crate::core::GatewayError;
use crate::core::driver::{ChangeBatch, ChangeHandler, DataSourceDriver, PointHandle};
use crate::core::notifications::ChangePipeline;
use crate::core::value::{DataType, Quality, Value};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables applied when a session connects.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The update interval requested for the subscription group.
    pub update_rate_ms: u32,
    /// Reads a point back after every write and fails the write on mismatch.
    pub verify_writes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            update_rate_ms: 1000,
            verify_writes: false,
        }
    }
}

/// Everything a connected session owns. Fields are declared in release order,
/// so dropping it without `disconnect` still tears down in a safe order.
struct Connected {
    source_name: String,
    subscription: Option<Subscription>,
    directory: Directory,
    active: bool,
    group: SubscriptionGroup,
    connection: SourceConnection,
}

impl Connected {
    /// Resolves a caller's point reference against the current directory.
    fn resolve(&self, point: &Point) -> Result<&Point, GatewayError> {
        let current = self
            .directory
            .lookup(&point.id)
            .ok_or_else(|| GatewayError::NotFound(point.id.clone()))?;
        if current.handle != point.handle {
            return Err(GatewayError::HandleMismatch {
                id: point.id.clone(),
                given: point.handle.0,
                current: current.handle.0,
            });
        }
        Ok(current)
    }
}

/// A stateful session against one data source.
///
/// The session is either idle or fully connected; callers never observe a
/// partially connected state. All methods take `&self` and may be called from
/// any thread. Reads and writes share the state lock, while lifecycle and
/// membership changes take it exclusively.
pub struct Session {
    driver: Arc<dyn DataSourceDriver>,
    config: SessionConfig,
    pipeline: Arc<ChangePipeline>,
    state: RwLock<Option<Connected>>,
}

impl Session {
    pub fn new(driver: Arc<dyn DataSourceDriver>, config: SessionConfig) -> Self {
        Self {
            driver,
            config,
            pipeline: Arc::new(ChangePipeline::new()),
            state: RwLock::new(None),
        }
    }

    /// The change notification pipeline fed by this session's subscription.
    pub fn pipeline(&self) -> &Arc<ChangePipeline> {
        &self.pipeline
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().is_some()
    }

    /// Whether the subscription group is currently active.
    pub fn is_active(&self) -> bool {
        self.state.read().as_ref().is_some_and(|c| c.active)
    }

    /// The name of the connected data source, if any.
    pub fn source_name(&self) -> Option<String> {
        self.state.read().as_ref().map(|c| c.source_name.clone())
    }

    /// Connects to `source_name` and creates the subscription group.
    /// Does nothing if the session is already connected.
    pub fn connect(&self, source_name: &str) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        if let Some(connected) = state.as_ref() {
            debug!(
                "Session already connected to '{}'; ignoring connect.",
                connected.source_name
            );
            return Ok(());
        }

        let connection = SourceConnection::open(self.driver.clone(), source_name)
            .map_err(|e| GatewayError::from_driver("connect", e))?;

        let group = match SubscriptionGroup::create(
            self.driver.clone(),
            &connection,
            self.config.update_rate_ms,
        ) {
            Ok(group) => group,
            Err(e) => {
                if let Err(release_err) = connection.release() {
                    warn!(
                        "Closing connection after failed group creation also failed: {}",
                        release_err
                    );
                }
                return Err(GatewayError::from_driver("create_group", e));
            }
        };

        info!(
            "Connected to data source '{}' (group {}, update rate {} ms).",
            source_name,
            group.handle(),
            self.config.update_rate_ms
        );
        *state = Some(Connected {
            source_name: source_name.to_string(),
            subscription: None,
            directory: Directory::new(),
            active: false,
            group,
            connection,
        });
        Ok(())
    }

    /// Tears the session down and returns it to idle. Does nothing if idle.
    ///
    /// Every step is attempted even if an earlier one fails; the last error is
    /// reported once teardown has completed.
    pub fn disconnect(&self) -> Result<(), GatewayError> {
        // Held until the cache is reset, so nobody observes a half torn down
        // session or connects before the old teardown is done.
        let mut state = self.state.write();
        let Some(mut connected) = state.take() else {
            return Ok(());
        };
        let mut last_error = None;
        let group = connected.group.handle();

        // 1. Stop change notifications.
        if connected.active {
            if let Err(e) = self.driver.set_group_active(group, false) {
                warn!("Teardown: deactivating group {} failed: {}", group, e);
                last_error = Some(GatewayError::StateChange(e.to_string()));
            }
            connected.active = false;
        }

        // 2. Release the subscription.
        if let Some(subscription) = connected.subscription.take()
            && let Err(e) = subscription.release()
        {
            warn!("Teardown: cancelling subscription failed: {}", e);
            last_error = Some(GatewayError::from_driver("unsubscribe", e));
        }

        // 3. Remove every point.
        if let Err(e) = connected.directory.remove_all(self.driver.as_ref(), group) {
            warn!(
                "Teardown: {} point(s) could not be removed: {}",
                connected.directory.len(),
                e
            );
            last_error = Some(e);
        }

        let Connected {
            source_name,
            group,
            connection,
            ..
        } = connected;

        // 4. Release the group.
        if let Err(e) = group.release() {
            warn!("Teardown: removing group failed: {}", e);
            last_error = Some(GatewayError::from_driver("remove_group", e));
        }

        // 5. Release the connection.
        if let Err(e) = connection.release() {
            warn!("Teardown: closing connection failed: {}", e);
            last_error = Some(GatewayError::from_driver("disconnect", e));
        }

        self.pipeline.reset();
        drop(state);

        match last_error {
            Some(e) => Err(GatewayError::Teardown(Box::new(e))),
            None => {
                info!("Disconnected from data source '{}'.", source_name);
                Ok(())
            }
        }
    }

    /// Subscribes the change pipeline to the group. Does nothing if already
    /// subscribed.
    pub fn start_notifications(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        let connected = state.as_mut().ok_or(GatewayError::NotConnected)?;
        if connected.subscription.is_some() {
            return Ok(());
        }

        let pipeline = self.pipeline.clone();
        let handler: ChangeHandler = Arc::new(move |batch: ChangeBatch| {
            if let Err(e) = pipeline.on_data_change(batch) {
                debug!("Change notification rejected: {}", e);
            }
        });
        let subscription = Subscription::register(self.driver.clone(), &connected.group, handler)
            .map_err(|e| GatewayError::from_driver("subscribe", e))?;
        connected.subscription = Some(subscription);
        debug!("Change notifications started.");
        Ok(())
    }

    /// Cancels the pipeline's subscription. Does nothing if not subscribed.
    pub fn stop_notifications(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        let connected = state.as_mut().ok_or(GatewayError::NotConnected)?;
        if let Some(subscription) = connected.subscription.take() {
            subscription
                .release()
                .map_err(|e| GatewayError::from_driver("unsubscribe", e))?;
            debug!("Change notifications stopped.");
        }
        Ok(())
    }

    /// Registers a point. Returns the existing registration if `id` is known.
    pub fn add_point(&self, id: &str, data_type: DataType) -> Result<Point, GatewayError> {
        let mut state = self.state.write();
        let connected = state.as_mut().ok_or(GatewayError::NotConnected)?;
        let group = connected.group.handle();
        connected
            .directory
            .add(self.driver.as_ref(), group, id, data_type)
    }

    pub fn remove_point(&self, id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        let connected = state.as_mut().ok_or(GatewayError::NotConnected)?;
        let group = connected.group.handle();
        connected.directory.remove(self.driver.as_ref(), group, id)
    }

    /// Removes every point, best effort. Succeeds on an idle session or an
    /// empty directory.
    pub fn remove_all_points(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        let Some(connected) = state.as_mut() else {
            return Ok(());
        };
        let group = connected.group.handle();
        connected.directory.remove_all(self.driver.as_ref(), group)
    }

    /// Looks up a point by identifier.
    pub fn get_item_info(&self, id: &str) -> Option<Point> {
        self.state
            .read()
            .as_ref()
            .and_then(|c| c.directory.lookup(id).cloned())
    }

    /// Resolves a data-source handle to its point.
    pub fn point_by_handle(&self, handle: PointHandle) -> Option<Point> {
        self.state
            .read()
            .as_ref()
            .and_then(|c| c.directory.find_by_handle(handle).cloned())
    }

    /// A snapshot of every registered point, in registration order.
    pub fn points(&self) -> Vec<Point> {
        self.state
            .read()
            .as_ref()
            .map(|c| c.directory.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Reads the current value of a point from the data source.
    pub fn read(&self, point: &Point) -> Result<(Value, Quality), GatewayError> {
        let state = self.state.read();
        let connected = state
            .as_ref()
            .ok_or_else(|| GatewayError::NotFound(point.id.clone()))?;
        let current = connected.resolve(point)?;
        self.driver
            .sync_read(connected.group.handle(), current.handle)
            .map_err(|e| GatewayError::from_driver("sync_read", e))
    }

    /// Writes a value to a point.
    pub fn write(&self, point: &Point, value: Value) -> Result<(), GatewayError> {
        let state = self.state.read();
        let connected = state
            .as_ref()
            .ok_or_else(|| GatewayError::NotFound(point.id.clone()))?;
        let current = connected.resolve(point)?;
        let group = connected.group.handle();

        self.driver
            .sync_write(group, current.handle, value.clone())
            .map_err(|e| GatewayError::from_driver("sync_write", e))?;

        if self.config.verify_writes {
            let (read_back, _) = self
                .driver
                .sync_read(group, current.handle)
                .map_err(|e| GatewayError::from_driver("sync_read", e))?;
            if read_back != value {
                return Err(GatewayError::WriteVerification {
                    id: current.id.clone(),
                    written: value.to_string(),
                    read_back: read_back.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Activates or deactivates the subscription group. The recorded state is
    /// left unchanged if the data source refuses.
    pub fn set_group_state(&self, active: bool) -> Result<(), GatewayError> {
        let mut state = self.state.write();
        let connected = state.as_mut().ok_or(GatewayError::NotConnected)?;
        self.driver
            .set_group_active(connected.group.handle(), active)
            .map_err(|e| GatewayError::StateChange(e.to_string()))?;
        connected.active = active;
        info!(
            "Group {} {}.",
            connected.group.handle(),
            if active { "activated" } else { "deactivated" }
        );
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Session teardown on drop reported an error: {}", e);
        }
    }
}
