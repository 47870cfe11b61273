//! In-process bus.
//!
//! Routes method calls to exported objects and fans signals out to every
//! subscriber watching the emitting path. Nothing leaves the process; this is
//! the carrier used to exercise exported registries end to end.
//!
//! Patterns supported:
//!   - **Calls**: request/response with a per-call deadline
//!   - **Signals**: broadcast with fan-out to all matching subscribers

use crate::bus::{Bus, MethodCall, PropertiesChanged, PropertiesObject, SignalMessage, PROPERTIES_CHANGED, PROPERTIES_INTERFACE};
use crate::dispatch;
use crate::types::{BusConfig, Error, ObjectPath, Result};
use crate::value::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;

// =============================================================================
// Subscriber Management
// =============================================================================

/// Subscriber handle for receiving signals.
#[derive(Debug)]
struct Subscriber {
    id: String,
    /// Only signals from this path are delivered; `None` receives all.
    path: Option<ObjectPath>,
    tx: mpsc::Sender<SignalMessage>,
}

/// Subscription receipt for managing subscriptions.
#[derive(Debug, Clone)]
pub struct SignalSubscription {
    pub id: String,
    pub path: Option<ObjectPath>,
}

/// Statistics about bus usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    pub calls_dispatched: u64,
    pub signals_emitted: u64,
    pub signals_dropped: u64,
    pub exported_objects: usize,
    pub active_subscribers: usize,
}

// =============================================================================
// LocalBus
// =============================================================================

/// In-memory bus carrying property calls and change signals.
#[derive(Debug, Clone)]
pub struct LocalBus {
    /// Exported objects: path -> object
    objects: Arc<RwLock<HashMap<ObjectPath, Arc<dyn PropertiesObject>>>>,

    subscribers: Arc<RwLock<Vec<Subscriber>>>,

    stats: Arc<RwLock<BusStats>>,

    config: BusConfig,
}

impl LocalBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(RwLock::new(BusStats::default())),
            config,
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Route a method call to the object exported at `call.path`.
    ///
    /// The object is looked up under the bus lock, which is released before the
    /// call runs. The call is abandoned with `Timeout` after
    /// `BusConfig::call_timeout`.
    pub async fn call(&self, call: MethodCall) -> Result<Vec<Value>> {
        let object = {
            let objects = self.objects.read().await;
            objects.get(&call.path).cloned().ok_or_else(|| {
                Error::unknown_object(format!("No object exported at {}", call.path))
            })?
        };

        let deadline = self.config.call_timeout;
        let reply = timeout(deadline, dispatch::dispatch(object.as_ref(), &call))
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "Call {}.{} on {} exceeded {}ms",
                    call.interface,
                    call.member,
                    call.path,
                    deadline.as_millis()
                ))
            })?;

        let mut stats = self.stats.write().await;
        stats.calls_dispatched += 1;
        drop(stats);

        tracing::debug!(
            "Dispatched call {}.{} on {} (ok={})",
            call.interface,
            call.member,
            call.path,
            reply.is_ok()
        );

        reply
    }

    /// Whether an object is exported at `path`.
    pub async fn is_exported(&self, path: &ObjectPath) -> bool {
        self.objects.read().await.contains_key(path)
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Subscribe to change signals, optionally only from one path.
    ///
    /// Returns (subscription handle, receiver channel). A generated id is used
    /// when `subscriber_id` is empty.
    pub async fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        path: Option<ObjectPath>,
    ) -> (SignalSubscription, mpsc::Receiver<SignalMessage>) {
        let mut id = subscriber_id.into();
        if id.is_empty() {
            id = format!("sub-{}", uuid::Uuid::new_v4().simple());
        }
        let (tx, rx) = mpsc::channel(self.config.signal_channel_capacity.max(1));

        let mut subscribers = self.subscribers.write().await;
        subscribers.push(Subscriber {
            id: id.clone(),
            path: path.clone(),
            tx,
        });

        let mut stats = self.stats.write().await;
        stats.active_subscribers = subscribers.len();

        tracing::debug!("Subscriber {} registered for signals from {:?}", id, path);

        (SignalSubscription { id, path }, rx)
    }

    /// Remove a subscription.
    pub async fn unsubscribe(&self, subscription: &SignalSubscription) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|s| s.id != subscription.id);

        let mut stats = self.stats.write().await;
        stats.active_subscribers = subscribers.len();

        tracing::debug!("Unsubscribed: {}", subscription.id);
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get current bus statistics.
    pub async fn get_stats(&self) -> BusStats {
        self.stats.read().await.clone()
    }

    /// Reset statistics counters.
    pub async fn reset_stats(&self) {
        let mut stats = self.stats.write().await;
        stats.calls_dispatched = 0;
        stats.signals_emitted = 0;
        stats.signals_dropped = 0;
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn export(&self, path: &ObjectPath, object: Arc<dyn PropertiesObject>) -> Result<()> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(path) {
            return Err(Error::invalid_argument(format!(
                "An object is already exported at {}",
                path
            )));
        }
        objects.insert(path.clone(), object);

        let mut stats = self.stats.write().await;
        stats.exported_objects = objects.len();

        tracing::info!("Exported object at {}", path);
        Ok(())
    }

    async fn unexport(&self, path: &ObjectPath) -> Result<()> {
        let mut objects = self.objects.write().await;
        if objects.remove(path).is_none() {
            return Err(Error::unknown_object(format!("No object exported at {}", path)));
        }

        let mut stats = self.stats.write().await;
        stats.exported_objects = objects.len();

        tracing::info!("Unexported object at {}", path);
        Ok(())
    }

    async fn emit(&self, path: &ObjectPath, signal: PropertiesChanged) -> Result<()> {
        let message = SignalMessage {
            path: path.clone(),
            interface: PROPERTIES_INTERFACE.to_string(),
            member: PROPERTIES_CHANGED.to_string(),
            body: signal,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };

        let subscribers = self.subscribers.read().await;
        let mut delivered = 0;
        let mut dropped = 0;
        for subscriber in subscribers
            .iter()
            .filter(|s| s.path.as_ref().map_or(true, |p| p == path))
        {
            // Fire-and-forget: a full or closed subscriber loses this signal.
            match subscriber.tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    dropped += 1;
                    tracing::warn!("Dropped signal for subscriber {}: {}", subscriber.id, e);
                }
            }
        }
        drop(subscribers);

        let mut stats = self.stats.write().await;
        stats.signals_emitted += 1;
        stats.signals_dropped += dropped;

        tracing::debug!(
            "Emitted {} from {} to {} subscribers",
            PROPERTIES_CHANGED,
            path,
            delivered
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
