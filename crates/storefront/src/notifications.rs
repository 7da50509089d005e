//! Transient user-facing messages.
//!
//! Each notification lives until its timer fires or it is dismissed,
//! whichever comes first. Arrival order is preserved and nothing is
//! coalesced. The current list is published on a `watch` channel for the
//! view layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use souk_core::Severity;

pub type NotificationId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub severity: Severity,
}

/// Handle to the shared notification list. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    next_id: AtomicU64,
    default_duration: Duration,
    state: Mutex<NotifierState>,
    tx: watch::Sender<Vec<Notification>>,
}

#[derive(Default)]
struct NotifierState {
    active: Vec<Notification>,
    timers: HashMap<NotificationId, AbortHandle>,
}

impl NotifierInner {
    fn state(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove a notification and return whether it was present.
    fn remove(&self, id: NotificationId) -> bool {
        let mut state = self.state();
        if let Some(timer) = state.timers.remove(&id) {
            timer.abort();
        }
        let before = state.active.len();
        state.active.retain(|n| n.id != id);
        let removed = state.active.len() != before;
        if removed {
            self.tx.send_replace(state.active.clone());
        }
        removed
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("default_duration", &self.inner.default_duration)
            .field("active", &self.active().len())
            .finish()
    }
}

impl Notifier {
    #[must_use]
    pub fn new(default_duration: Duration) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(NotifierInner {
                next_id: AtomicU64::new(1),
                default_duration,
                state: Mutex::new(NotifierState::default()),
                tx,
            }),
        }
    }

    /// Show a message for the default duration.
    pub fn notify(&self, message: impl Into<String>, severity: Severity) -> NotificationId {
        self.notify_for(message, severity, self.inner.default_duration)
    }

    /// Show a message for `duration`.
    ///
    /// Outside a Tokio runtime no timer can be scheduled; the notification
    /// then stays until dismissed.
    pub fn notify_for(
        &self,
        message: impl Into<String>,
        severity: Severity,
        duration: Duration,
    ) -> NotificationId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let notification = Notification {
            id,
            message: message.into(),
            severity,
        };
        debug!(id, severity = %severity, message = %notification.message, "Notification shown");

        // Hold the lock across the spawn so the timer cannot fire before its
        // handle is recorded.
        let mut state = self.inner.state();
        state.active.push(notification);

        match Handle::try_current() {
            Ok(handle) => {
                let weak: Weak<NotifierInner> = Arc::downgrade(&self.inner);
                let task = handle.spawn(async move {
                    tokio::time::sleep(duration).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.state().timers.remove(&id);
                        inner.remove(id);
                    }
                });
                state.timers.insert(id, task.abort_handle());
            }
            Err(_) => warn!(id, "No Tokio runtime, notification will not expire"),
        }

        self.inner.tx.send_replace(state.active.clone());
        id
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, Severity::Info)
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, Severity::Success)
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, Severity::Warning)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, Severity::Error)
    }

    /// Remove a notification now and cancel its timer. Dismissing an
    /// unknown or expired id does nothing.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        self.inner.remove(id)
    }

    /// Currently visible notifications, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<Notification> {
        self.inner.state().active.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn pending_timers(&self) -> usize {
        self.inner.state().timers.len()
    }
}
