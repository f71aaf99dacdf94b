//! Change-notification plumbing shared by the providers. A handler is held by
//! the registry only while its `Subscription` is alive; releasing twice is a
//! no-op.

use super::Notification;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::runtime::Handle;
use tracing::{debug, trace};

pub type SessionHandler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    handlers: BTreeMap<u64, SessionHandler>,
}

type SharedListeners = Arc<Mutex<Listeners>>;

fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set of live change handlers.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: SharedListeners,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: SessionHandler) -> Subscription {
        let id = {
            let mut listeners = lock(&self.inner);
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.handlers.insert(id, handler);
            id
        };
        debug!(subscription = id, "session listener registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
            released: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schedules `notification` for every handler still registered when the
    /// delivery runs. Outside a tokio runtime the delivery happens inline.
    pub fn notify(&self, notification: Notification) {
        let registry = self.clone();
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                registry.deliver(&notification);
            });
        } else {
            registry.deliver(&notification);
        }
    }

    fn deliver(&self, notification: &Notification) {
        // Handlers may release subscriptions, so call them without the lock.
        let handlers: Vec<SessionHandler> = lock(&self.inner).handlers.values().cloned().collect();
        trace!(listeners = handlers.len(), "delivering session notification");
        for handler in handlers {
            handler(notification);
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Release handle for a registered change handler. Dropping it releases too.
#[must_use = "dropping a subscription unregisters its handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Listeners>>,
    released: AtomicBool,
}

impl Subscription {
    /// Unregisters the handler. Safe to call any number of times.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(listeners) = self.registry.upgrade() {
            lock(&listeners).handlers.remove(&self.id);
        }
        debug!(subscription = self.id, "session listener released");
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}
