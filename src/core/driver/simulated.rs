// src/core/driver/simulated.rs

//! An in-memory process-data server.
//!
//! Behaves like the vendor simulation servers the gateway is usually pointed
//! at: any item id can be registered, values live on the server and are shared
//! by every group, and an active group reports changes to its subscribers.
//! It can be told to fail specific operations, and optionally journals every
//! call for inspection.

use super::{
    ChangeBatch, ChangeHandler, ConnectionHandle, DataSourceDriver, DriverError, GroupHandle,
    PointHandle, SubscriptionHandle,
};
use crate::core::value::{DataType, Quality, Value};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A driver operation, used for the call journal and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Disconnect,
    CreateGroup,
    RemoveGroup,
    RegisterPoint,
    UnregisterPoint,
    SyncRead,
    SyncWrite,
    SetGroupActive,
    Subscribe,
    Unsubscribe,
}

/// One journaled driver call.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverCall {
    pub op: Operation,
    pub succeeded: bool,
}

/// The data type given to points registered without one.
const DEFAULT_CANONICAL_TYPE: DataType = DataType::R8;

struct Tag {
    value: Value,
    quality: Quality,
}

struct SimPoint {
    id: String,
    data_type: DataType,
}

struct SimGroup {
    connection: ConnectionHandle,
    update_rate_ms: u32,
    active: bool,
    points: HashMap<PointHandle, SimPoint>,
    subscriptions: HashMap<SubscriptionHandle, ChangeHandler>,
}

#[derive(Default)]
struct SimState {
    next_handle: u32,
    sources: Option<HashSet<String>>,
    connections: HashMap<ConnectionHandle, HashSet<GroupHandle>>,
    groups: HashMap<GroupHandle, SimGroup>,
    tags: HashMap<String, Tag>,
    faults: HashSet<Operation>,
    journaling: bool,
    journal: Vec<DriverCall>,
}

impl SimState {
    fn allocate(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn group(&self, group: GroupHandle) -> Result<&SimGroup, DriverError> {
        self.groups
            .get(&group)
            .ok_or(DriverError::InvalidGroup(group))
    }

    fn group_mut(&mut self, group: GroupHandle) -> Result<&mut SimGroup, DriverError> {
        self.groups
            .get_mut(&group)
            .ok_or(DriverError::InvalidGroup(group))
    }

    /// Journals the call if enabled and fails it if a fault is injected for `op`.
    fn enter(&mut self, op: Operation) -> Result<(), DriverError> {
        let failing = self.faults.contains(&op);
        if self.journaling {
            self.journal.push(DriverCall {
                op,
                succeeded: !failing,
            });
        }
        if failing {
            return Err(DriverError::Failed(format!("injected fault on {op:?}")));
        }
        Ok(())
    }

    /// Marks the last journaled call as failed after a real error.
    fn record_failure(&mut self) {
        if let Some(last) = self.journal.last_mut() {
            last.succeeded = false;
        }
    }

    /// Passes `result` through, journaling it as failed if it is an error.
    fn check<T>(&mut self, result: Result<T, DriverError>) -> Result<T, DriverError> {
        if result.is_err() {
            self.record_failure();
        }
        result
    }

    fn point_info(
        &self,
        group: GroupHandle,
        point: PointHandle,
    ) -> Result<(String, DataType), DriverError> {
        self.group(group)?
            .points
            .get(&point)
            .map(|p| (p.id.clone(), p.data_type))
            .ok_or(DriverError::InvalidPoint(point))
    }

    /// Collects the pending notifications for every active, subscribed group
    /// that contains one of `ids`.
    fn collect_notifications(
        &self,
        ids: &HashSet<&str>,
        only_group: Option<GroupHandle>,
    ) -> Vec<(Vec<ChangeHandler>, ChangeBatch)> {
        let mut out = Vec::new();
        for (handle, group) in &self.groups {
            if !group.active || group.subscriptions.is_empty() {
                continue;
            }
            if only_group.is_some_and(|g| g != *handle) {
                continue;
            }
            let changes = group.points.iter().filter_map(|(point_handle, point)| {
                if !ids.contains(point.id.as_str()) {
                    return None;
                }
                let tag = self.tags.get(&point.id)?;
                Some((*point_handle, tag.value.clone(), tag.quality))
            });
            let batch = ChangeBatch::from_changes(changes);
            if batch.is_empty() {
                continue;
            }
            out.push((group.subscriptions.values().cloned().collect(), batch));
        }
        out
    }
}

/// The in-memory simulation server.
#[derive(Default)]
pub struct SimulatedDriver {
    state: Mutex<SimState>,
}

impl SimulatedDriver {
    /// Creates a server that accepts connections to any source name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a server that only accepts connections to the given source names.
    pub fn with_sources<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let driver = Self::default();
        driver.state.lock().sources = Some(names.into_iter().map(Into::into).collect());
        driver
    }

    /// Records every subsequent call in the journal. Off by default, since the
    /// journal grows with every call.
    pub fn with_journal(self) -> Self {
        self.state.lock().journaling = true;
        self
    }

    /// Makes every subsequent call of `op` fail until the fault is cleared.
    pub fn inject_fault(&self, op: Operation) {
        self.state.lock().faults.insert(op);
    }

    pub fn clear_fault(&self, op: Operation) {
        self.state.lock().faults.remove(&op);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Every journaled call so far, in order.
    pub fn journal(&self) -> Vec<DriverCall> {
        self.state.lock().journal.clone()
    }

    /// The operations called so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().journal.iter().map(|c| c.op).collect()
    }

    /// How many times `op` has been called.
    pub fn call_count(&self, op: Operation) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    /// Total points registered across all groups.
    pub fn point_count(&self) -> usize {
        self.state
            .lock()
            .groups
            .values()
            .map(|g| g.points.len())
            .sum()
    }

    pub fn subscription_count(&self) -> usize {
        self.state
            .lock()
            .groups
            .values()
            .map(|g| g.subscriptions.len())
            .sum()
    }

    pub fn is_group_active(&self, group: GroupHandle) -> bool {
        self.state
            .lock()
            .groups
            .get(&group)
            .is_some_and(|g| g.active)
    }

    /// The update interval a group was created with.
    pub fn update_rate(&self, group: GroupHandle) -> Option<u32> {
        self.state
            .lock()
            .groups
            .get(&group)
            .map(|g| g.update_rate_ms)
    }

    /// The current server-side value of an item, if it has ever been registered.
    pub fn value_of(&self, id: &str) -> Option<(Value, Quality)> {
        self.state
            .lock()
            .tags
            .get(id)
            .map(|t| (t.value.clone(), t.quality))
    }

    /// Simulates a device-side change of an item and reports it to every
    /// active group that contains it.
    pub fn set_value(&self, id: &str, value: Value, quality: Quality) {
        let notifications = {
            let mut state = self.state.lock();
            let tag = state.tags.entry(id.to_string()).or_insert(Tag {
                value: Value::Empty,
                quality: Quality::BAD,
            });
            tag.value = value;
            tag.quality = quality;
            state.collect_notifications(&HashSet::from([id]), None)
        };
        deliver(notifications);
    }
}

/// Invokes handlers outside the server lock, so that handlers may call back
/// into the driver.
fn deliver(notifications: Vec<(Vec<ChangeHandler>, ChangeBatch)>) {
    for (handlers, batch) in notifications {
        debug!("Simulated source reporting {} changed item(s).", batch.len());
        for handler in handlers {
            handler(batch.clone());
        }
    }
}

impl DataSourceDriver for SimulatedDriver {
    fn connect(&self, source_name: &str) -> Result<ConnectionHandle, DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::Connect)?;
        if let Some(sources) = &state.sources
            && !sources.contains(source_name)
        {
            state.record_failure();
            return Err(DriverError::Unavailable(source_name.to_string()));
        }
        let handle = ConnectionHandle(state.allocate());
        state.connections.insert(handle, HashSet::new());
        Ok(handle)
    }

    fn disconnect(&self, connection: ConnectionHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::Disconnect)?;
        let Some(groups) = state.connections.remove(&connection) else {
            state.record_failure();
            return Err(DriverError::InvalidConnection(connection));
        };
        for group in groups {
            state.groups.remove(&group);
        }
        Ok(())
    }

    fn create_group(
        &self,
        connection: ConnectionHandle,
        update_rate_ms: u32,
    ) -> Result<GroupHandle, DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateGroup)?;
        if !state.connections.contains_key(&connection) {
            state.record_failure();
            return Err(DriverError::InvalidConnection(connection));
        }
        let handle = GroupHandle(state.allocate());
        state.groups.insert(
            handle,
            SimGroup {
                connection,
                update_rate_ms,
                active: false,
                points: HashMap::new(),
                subscriptions: HashMap::new(),
            },
        );
        if let Some(groups) = state.connections.get_mut(&connection) {
            groups.insert(handle);
        }
        Ok(handle)
    }

    fn remove_group(
        &self,
        connection: ConnectionHandle,
        group: GroupHandle,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::RemoveGroup)?;
        let owned = state
            .groups
            .get(&group)
            .is_some_and(|g| g.connection == connection);
        if !owned {
            state.record_failure();
            return Err(DriverError::InvalidGroup(group));
        }
        state.groups.remove(&group);
        if let Some(groups) = state.connections.get_mut(&connection) {
            groups.remove(&group);
        }
        Ok(())
    }

    fn register_point(
        &self,
        group: GroupHandle,
        id: &str,
        requested: DataType,
    ) -> Result<(PointHandle, DataType), DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::RegisterPoint)?;
        let lookup = state.group(group).map(|_| ());
        state.check(lookup)?;
        if id.trim().is_empty() {
            state.record_failure();
            return Err(DriverError::UnknownItem(id.to_string()));
        }

        let canonical = match state.tags.get(id) {
            Some(tag) if tag.value.data_type() != DataType::Empty => tag.value.data_type(),
            _ if requested == DataType::Empty => DEFAULT_CANONICAL_TYPE,
            _ => requested,
        };
        state
            .tags
            .entry(id.to_string())
            .and_modify(|tag| {
                if tag.value.data_type() == DataType::Empty {
                    tag.value = Value::default_for(canonical);
                }
            })
            .or_insert(Tag {
                value: Value::default_for(canonical),
                quality: Quality::GOOD,
            });

        let handle = PointHandle(state.allocate());
        state.group_mut(group)?.points.insert(
            handle,
            SimPoint {
                id: id.to_string(),
                data_type: canonical,
            },
        );
        Ok((handle, canonical))
    }

    fn unregister_point(&self, group: GroupHandle, point: PointHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::UnregisterPoint)?;
        let removed = state
            .groups
            .get_mut(&group)
            .and_then(|g| g.points.remove(&point));
        if removed.is_none() {
            state.record_failure();
            return Err(DriverError::InvalidPoint(point));
        }
        Ok(())
    }

    fn sync_read(
        &self,
        group: GroupHandle,
        point: PointHandle,
    ) -> Result<(Value, Quality), DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::SyncRead)?;
        let lookup = state.point_info(group, point);
        let (id, _) = state.check(lookup)?;
        state
            .tags
            .get(&id)
            .map(|t| (t.value.clone(), t.quality))
            .ok_or(DriverError::UnknownItem(id))
    }

    fn sync_write(
        &self,
        group: GroupHandle,
        point: PointHandle,
        value: Value,
    ) -> Result<(), DriverError> {
        let notifications = {
            let mut state = self.state.lock();
            state.enter(Operation::SyncWrite)?;
            let lookup = state.point_info(group, point);
            let (id, data_type) = state.check(lookup)?;
            let Ok(coerced) = value.coerce(data_type) else {
                state.record_failure();
                return Err(DriverError::BadType {
                    expected: data_type,
                    given: value.data_type(),
                });
            };

            let tag = state.tags.entry(id.clone()).or_insert(Tag {
                value: Value::Empty,
                quality: Quality::GOOD,
            });
            let changed = tag.value != coerced || !tag.quality.is_good();
            tag.value = coerced;
            tag.quality = Quality::GOOD;

            if changed {
                state.collect_notifications(&HashSet::from([id.as_str()]), None)
            } else {
                Vec::new()
            }
        };
        deliver(notifications);
        Ok(())
    }

    fn set_group_active(&self, group: GroupHandle, active: bool) -> Result<(), DriverError> {
        let notifications = {
            let mut state = self.state.lock();
            state.enter(Operation::SetGroupActive)?;
            let lookup = state.group(group).map(|_| ());
            state.check(lookup)?;
            let g = state.group_mut(group)?;
            let was_active = g.active;
            g.active = active;

            // Activation triggers an initial refresh of every item in the group.
            if active && !was_active {
                let ids: Vec<String> = g.points.values().map(|p| p.id.clone()).collect();
                let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
                state.collect_notifications(&ids, Some(group))
            } else {
                Vec::new()
            }
        };
        deliver(notifications);
        Ok(())
    }

    fn subscribe(
        &self,
        group: GroupHandle,
        handler: ChangeHandler,
    ) -> Result<SubscriptionHandle, DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::Subscribe)?;
        let lookup = state.group(group).map(|_| ());
        state.check(lookup)?;
        let handle = SubscriptionHandle(state.allocate());
        state.group_mut(group)?.subscriptions.insert(handle, handler);
        Ok(handle)
    }

    fn unsubscribe(
        &self,
        group: GroupHandle,
        subscription: SubscriptionHandle,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.enter(Operation::Unsubscribe)?;
        let removed = state
            .groups
            .get_mut(&group)
            .and_then(|g| g.subscriptions.remove(&subscription));
        if removed.is_none() {
            state.record_failure();
            return Err(DriverError::Failed(format!(
                "no subscription {subscription} on group {group}"
            )));
        }
        Ok(())
    }
}
