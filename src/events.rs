//! Event surface: opened / closed / message notifications.
//!
//! Listeners are registered explicitly and invoked in registration order on
//! the transport session's own task. Handlers must not block that task; a UI
//! or other collaborator is responsible for redispatching to its own
//! execution context. A panic inside one listener is caught at the dispatch
//! boundary so it can neither skip later listeners nor abort the read loop.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

type OpenListener = Arc<dyn Fn() + Send + Sync>;
type CloseListener = Arc<dyn Fn() + Send + Sync>;
type MessageListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Registry of listeners for the three notification channels.
#[derive(Default)]
pub struct EventListeners {
    opened: RwLock<Vec<OpenListener>>,
    closed: RwLock<Vec<CloseListener>>,
    message: RwLock<Vec<MessageListener>>,
}

impl EventListeners {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for the `opened` event.
    pub fn on_open(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.opened.write().push(Arc::new(listener));
    }

    /// Register a listener for the `closed` event.
    pub fn on_close(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.closed.write().push(Arc::new(listener));
    }

    /// Register a listener for inbound text messages.
    pub fn on_message(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.message.write().push(Arc::new(listener));
    }

    // Dispatch runs on a cloned snapshot, never under the registry lock: a
    // listener may register further listeners without deadlocking.

    pub(crate) fn emit_opened(&self) {
        let listeners = self.opened.read().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                warn!("opened listener panicked");
            }
        }
    }

    pub(crate) fn emit_closed(&self) {
        let listeners = self.closed.read().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                warn!("closed listener panicked");
            }
        }
    }

    pub(crate) fn emit_message(&self, text: &str) {
        let listeners = self.message.read().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(text))).is_err() {
                warn!("message listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListeners")
            .field("opened", &self.opened.read().len())
            .field("closed", &self.closed.read().len())
            .field("message", &self.message.read().len())
            .finish()
    }
}
