//! Container lifecycle events
//!
//! A simple ordered broadcast: all currently-registered listeners are
//! invoked synchronously, in registration order, before the call that
//! triggered the signal returns. No delivery guarantees beyond that.

use std::sync::{Arc, RwLock};

#[cfg(feature = "logging")]
use tracing::debug;

/// Signals emitted by the container façade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Definition-time hooks have run; the definition set is final
    DefinitionsFinalized,
    /// Every eager singleton is built; the container is serving resolutions
    ContainerReady,
    /// Teardown is about to begin
    ContainerClosing,
}

/// Receives container lifecycle signals
pub trait LifecycleListener: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

impl<F> LifecycleListener for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn on_event(&self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Ordered synchronous broadcast to registered listeners
pub(crate) struct EventBus {
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners
            .write()
            .expect("listener list poisoned")
            .push(listener);
    }

    pub(crate) fn publish(&self, event: LifecycleEvent) {
        #[cfg(feature = "logging")]
        debug!(target: "wirework", event = ?event, "Publishing lifecycle event");

        // Snapshot under the read lock, invoke outside it: a listener may
        // subscribe further listeners without deadlocking.
        let snapshot: Vec<Arc<dyn LifecycleListener>> = self
            .listeners
            .read()
            .expect("listener list poisoned")
            .clone();
        for listener in snapshot {
            listener.on_event(&event);
        }
    }
}
