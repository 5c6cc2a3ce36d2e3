// src/core/notifications/pipeline.rs

//! Reconciles pushed change batches against the latest-value cache and
//! forwards only new or changed values.

use crate::core::GatewayError;
use crate::core::driver::{ChangeBatch, PointHandle};
use crate::core::metrics;
use crate::core::value::{Quality, Value};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, warn};

/// One observed point value.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemValue {
    pub handle: PointHandle,
    pub value: Value,
    pub quality: Quality,
}

/// Receives the emitted changes of one batch, in receipt order.
pub type EmitHandler = Box<dyn Fn(&[ItemValue]) + Send + Sync>;

#[derive(Debug, Clone)]
struct CachedValue {
    value: Value,
    quality: Quality,
}

/// The change notification pipeline.
///
/// Batches are processed one at a time: the cache lock is held from
/// validation until the handler has returned, so cache updates and handler
/// deliveries of concurrent batches never interleave. The handler must not
/// call back into the pipeline.
#[derive(Default)]
pub struct ChangePipeline {
    cache: Mutex<HashMap<PointHandle, CachedValue>>,
    handler: RwLock<Option<EmitHandler>>,
}

impl ChangePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the handler that receives emitted changes, replacing any
    /// previous one.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&[ItemValue]) + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Box::new(handler));
    }

    pub fn clear_handler(&self) {
        *self.handler.write() = None;
    }

    /// Processes one pushed batch and returns how many changes were emitted.
    pub fn on_data_change(&self, batch: ChangeBatch) -> Result<usize, GatewayError> {
        let mut cache = self.cache.lock();
        metrics::NOTIFICATION_BATCHES_TOTAL.inc();

        if let Err(e) = validate(&batch) {
            warn!("Dropping change notification: {}", e);
            return Err(e);
        }

        let ChangeBatch {
            handles,
            values,
            qualities,
        } = batch;

        let mut emit = Vec::with_capacity(handles.len());
        for ((handle, value), quality) in handles.into_iter().zip(values).zip(qualities) {
            let quality = quality.masked();
            match cache.entry(handle) {
                Entry::Vacant(slot) => {
                    slot.insert(CachedValue {
                        value: value.clone(),
                        quality,
                    });
                    emit.push(ItemValue {
                        handle,
                        value,
                        quality,
                    });
                }
                Entry::Occupied(mut slot) => {
                    let cached = slot.get_mut();
                    match value.cmp(&cached.value) {
                        Ordering::Greater | Ordering::Less => {
                            cached.value = value.clone();
                            cached.quality = quality;
                            emit.push(ItemValue {
                                handle,
                                value,
                                quality,
                            });
                        }
                        Ordering::Equal => cached.quality = quality,
                    }
                }
            }
        }

        debug!(
            "Change batch reconciled: {} change(s) to forward.",
            emit.len()
        );
        if !emit.is_empty() {
            metrics::CHANGES_EMITTED_TOTAL.inc_by(emit.len() as f64);
            if let Some(handler) = self.handler.read().as_ref() {
                handler(&emit);
            }
        }
        Ok(emit.len())
    }

    /// The last observed value of a point, if any.
    pub fn latest(&self, handle: PointHandle) -> Option<(Value, Quality)> {
        self.cache
            .lock()
            .get(&handle)
            .map(|c| (c.value.clone(), c.quality))
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Forgets every cached value.
    pub fn reset(&self) {
        self.cache.lock().clear();
    }
}

fn validate(batch: &ChangeBatch) -> Result<(), GatewayError> {
    if batch.handles.is_empty() {
        return Err(GatewayError::InvalidNotification(
            "empty batch".to_string(),
        ));
    }
    if batch.values.len() != batch.handles.len() || batch.qualities.len() != batch.handles.len()
    {
        return Err(GatewayError::InvalidNotification(format!(
            "mismatched arrays: {} handles, {} values, {} qualities",
            batch.handles.len(),
            batch.values.len(),
            batch.qualities.len()
        )));
    }
    Ok(())
}
