//! Registry of session-event listeners.
//!
//! 会话事件监听器注册表。

use crate::protocol::SessionEvent;
use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Event listener type definition
/// 事件监听器类型定义
pub type EventListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Identifies a registered listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: DashMap<u64, EventListener>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners_count", &self.listeners.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub(crate) fn register(&self, listener: EventListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        ListenerId(id)
    }

    pub(crate) fn unregister(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id.0).is_some()
    }

    /// Invokes every listener with `event`.
    ///
    /// Listeners are snapshotted first so they may register, unregister or
    /// close the client from inside the callback.
    ///
    /// 先对监听器做快照，因此回调中可以注册、注销监听器或关闭客户端。
    pub(crate) fn dispatch(&self, event: &SessionEvent) {
        let snapshot: Vec<EventListener> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}
