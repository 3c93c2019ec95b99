//! Tick listener registration.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::timer::TimerHandle;

/// Error a listener may return to signal failure.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a listener.
pub type ListenerResult = Result<(), ListenerError>;

/// Callback function type for tick notifications.
pub type TickCallback = Arc<dyn Fn(&TimerHandle) -> ListenerResult + Send + Sync>;

/// Identifier returned by `add_listener`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Ordered fan-out list of tick listeners.
///
/// Each tick works on a snapshot, so listeners may add or remove listeners
/// (including themselves) without deadlocking; the change applies from the
/// next tick.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: RwLock<Vec<(ListenerId, TickCallback)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, callback: TickCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Listeners in registration order.
    pub(crate) fn snapshot(&self) -> Vec<(ListenerId, TickCallback)> {
        self.entries.read().clone()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<ListenerId> = self.entries.read().iter().map(|(id, _)| *id).collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &ids)
            .finish_non_exhaustive()
    }
}
