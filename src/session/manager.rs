//! 会话句柄管理器 - 统一管理连接的完整生命周期
//! Session Handle Manager - Unified management of the connection lifecycle
//!
//! 所有共享状态（连接状态、当前句柄、会话标识）都由一把互斥锁保护，
//! 并配有一个用于阻塞等待的通知条件。每一轮（epoch）最多只发起一次物理连接。
//!
//! All shared state (connection state, current handle, session identifier) is
//! guarded by a single mutex paired with a notification condition for blocking
//! waits. At most one physical connect is issued per epoch: callers arriving
//! while an epoch is `Connecting` join its wait instead of connecting again.

use super::{
    handle::Session,
    listeners::ListenerRegistry,
    state::{ConnectionState, EndCause, Epoch, SessionState},
    watcher::ConnectionWatcher,
};
use crate::{
    config::Config,
    credentials::Credentials,
    error::{Error, Result},
    protocol::{Connector, SessionEvent, SessionId},
};
use parking_lot::{Mutex, MutexGuard};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::Notify,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

/// State guarded by the manager's lock.
/// 由管理器锁保护的状态。
#[derive(Debug)]
pub(crate) struct Inner {
    state: ConnectionState,
    /// Identifier of the most recently started epoch.
    last_epoch: u64,
    /// How the most recently ended epoch ended, read by waiters that joined it.
    last_end: Option<(u64, EndCause)>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: ConnectionState::Initial,
            last_epoch: 0,
            last_end: None,
        }
    }

    pub(crate) fn state(&self) -> &ConnectionState {
        &self.state
    }

    fn check(&self, next: SessionState) -> Result<()> {
        let from = self.state.phase();
        if from.can_transition_to(next) {
            return Ok(());
        }
        warn!(
            from = from.name(),
            to = next.name(),
            "Invalid state transition attempted"
        );
        Err(Error::InvalidStateTransition {
            from: from.name(),
            to: next.name(),
        })
    }

    fn begin(&mut self, epoch: Epoch) -> Result<()> {
        self.check(SessionState::Connecting)?;
        debug!(
            epoch = epoch.id(),
            from = self.state.phase().name(),
            to = "Connecting",
            "State transition executed"
        );
        self.state = ConnectionState::Connecting(epoch);
        Ok(())
    }

    fn establish(&mut self) -> Result<()> {
        self.check(SessionState::Connected)?;
        self.state = match std::mem::replace(&mut self.state, ConnectionState::Initial) {
            ConnectionState::Connecting(mut epoch) => {
                let session_id = epoch.refresh_session_id();
                info!(epoch = epoch.id(), session_id = ?session_id, "Session established");
                ConnectionState::Connected(epoch)
            }
            other => other,
        };
        Ok(())
    }

    /// The client reconnected on its own; the session must be the same one.
    fn resume(&mut self) {
        if let ConnectionState::Connected(epoch) = &mut self.state {
            let previous = epoch.session_id();
            let current = epoch.refresh_session_id();
            if previous == current {
                debug!(
                    epoch = epoch.id(),
                    session_id = ?current,
                    "Connection re-established with existing session"
                );
            } else {
                warn!(
                    epoch = epoch.id(),
                    previous = ?previous,
                    current = ?current,
                    "Client reported a different session after reconnecting"
                );
            }
        }
    }

    /// Ends the live epoch, disposing its connection before returning.
    ///
    /// 结束当前一轮，并在返回前释放其连接。
    fn end(&mut self, cause: EndCause) -> bool {
        let Some(epoch) = self.state.epoch_id() else {
            return false;
        };
        debug!(
            epoch,
            from = self.state.phase().name(),
            to = "Closed",
            cause = ?cause,
            "State transition executed"
        );
        // Dropping the epoch disconnects its handle while the lock is held.
        self.state = ConnectionState::Closed;
        self.last_end = Some((epoch, cause));
        true
    }

    fn end_if_connecting(&mut self, epoch: u64, cause: EndCause) -> bool {
        self.state.connecting_epoch() == Some(epoch) && self.end(cause)
    }

    fn ended_with(&self, epoch: u64) -> Option<&EndCause> {
        match &self.last_end {
            Some((ended, cause)) if *ended == epoch => Some(cause),
            _ => None,
        }
    }
}

/// The session core shared by the facade and every epoch's watcher.
///
/// 由门面和每一轮的监视器共享的会话核心。
pub(crate) struct SessionManager {
    config: Config,
    credentials: Credentials,
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    changed: Notify,
    listeners: ListenerRegistry,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl SessionManager {
    pub(crate) fn new(
        config: Config,
        credentials: Credentials,
        connector: Arc<dyn Connector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            credentials,
            connector,
            inner: Mutex::new(Inner::new()),
            changed: Notify::new(),
            listeners: ListenerRegistry::default(),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    /// Wakes every caller blocked in `get`.
    pub(crate) fn wake_all(&self) {
        self.changed.notify_waiters();
    }

    pub(crate) fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn state(&self) -> SessionState {
        self.inner.lock().state.phase()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().state.is_closed()
    }

    pub(crate) fn session_id(&self) -> Option<SessionId> {
        match &self.inner.lock().state {
            ConnectionState::Connected(epoch) => epoch.session_id(),
            _ => None,
        }
    }

    /// Waits for the live session, connecting first if there is none.
    ///
    /// The wait ends with an error when `timeout` elapses or `interrupt`
    /// resolves first; either one abandons the in-flight epoch. Dropping the
    /// returned future mid-wait abandons it as well.
    ///
    /// 等待当前会话，如果没有则先发起连接。`timeout` 到期或 `interrupt` 先完成时
    /// 以错误结束等待，并中止进行中的这一轮；等待中途丢弃该 future 同样会中止它。
    pub(crate) async fn get<F>(
        self: &Arc<Self>,
        timeout: Option<Duration>,
        interrupt: F,
    ) -> Result<Session>
    where
        F: Future<Output = ()>,
    {
        // A deadline past the clock's range means no deadline.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let expiry = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);
        tokio::pin!(interrupt);

        let mut joined: Option<u64> = None;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Registered before the state check so no broadcast can be missed.
            notified.as_mut().enable();

            let epoch = {
                let mut inner = self.inner.lock();
                if let Some(session) = inner.state.session() {
                    return Ok(session);
                }
                if let Some(EndCause::AuthFailed(scheme)) =
                    joined.and_then(|epoch| inner.ended_with(epoch))
                {
                    return Err(Error::AuthFailed {
                        scheme: scheme.clone(),
                    });
                }
                match inner.state.connecting_epoch() {
                    Some(epoch) => epoch,
                    None => {
                        if deadline.is_some_and(|at| at <= Instant::now()) {
                            let timeout = timeout.unwrap_or_default();
                            return Err(Error::ConnectionTimeout { timeout });
                        }
                        self.begin_epoch(&mut inner)?
                    }
                }
            };
            joined = Some(epoch);

            let mut guard = AbandonOnDrop {
                manager: self,
                epoch,
                armed: true,
            };
            // The caller's own deadline and interrupt take precedence over a broadcast.
            let ended = tokio::select! {
                biased;
                _ = &mut interrupt => Some(EndCause::Interrupted),
                _ = &mut expiry => Some(EndCause::TimedOut(timeout.unwrap_or_default())),
                _ = &mut notified => None,
            };
            guard.armed = false;

            if let Some(cause) = ended {
                return self.abandon(epoch, cause);
            }
        }
    }

    /// Starts a new epoch: one connect, credentials applied before exposure.
    fn begin_epoch(self: &Arc<Self>, inner: &mut Inner) -> Result<u64> {
        inner.check(SessionState::Connecting)?;
        self.config.validate()?;

        inner.last_epoch += 1;
        let epoch = inner.last_epoch;
        info!(epoch, servers = ?self.config.servers, "Starting new connection");

        let watcher = ConnectionWatcher::new(Arc::downgrade(self), epoch);
        let handle = self
            .connector
            .connect(&self.config, watcher)
            .inspect_err(|e| warn!(epoch, error = %e, "Connector refused to start connection"))?;
        self.credentials.apply(handle.as_ref());
        inner.begin(Epoch::new(epoch, handle))?;
        Ok(epoch)
    }

    /// Ends a wait that timed out or was interrupted.
    ///
    /// A session that became live in the meantime is returned instead; otherwise
    /// the epoch is aborted once, by whichever waiter gets here first.
    fn abandon(&self, epoch: u64, cause: EndCause) -> Result<Session> {
        let ended = {
            let mut inner = self.inner.lock();
            if let Some(session) = inner.state.session() {
                return Ok(session);
            }
            inner.end_if_connecting(epoch, cause.clone())
        };
        if ended {
            warn!(epoch, cause = ?cause, "Connection attempt abandoned");
            self.changed.notify_waiters();
        }
        Err(cause.to_error())
    }

    fn abandon_dropped(&self, epoch: u64) {
        let ended = self
            .inner
            .lock()
            .end_if_connecting(epoch, EndCause::Cancelled);
        if ended {
            warn!(epoch, "Connection attempt abandoned by a dropped waiter");
            self.changed.notify_waiters();
        }
    }

    /// Disposes the live epoch, if any. Idempotent.
    ///
    /// 释放当前一轮（如果存在）。幂等。
    pub(crate) fn close(&self) {
        let closed = {
            let mut inner = self.inner.lock();
            match inner.state.epoch_id() {
                Some(epoch) => {
                    inner.end(EndCause::Closed);
                    info!(epoch, "Session closed");
                    true
                }
                None => false,
            }
        };
        if closed {
            self.changed.notify_waiters();
        }
    }

    /// Applies a connection-state event of the current epoch. Called by the
    /// epoch's watcher with the lock held.
    ///
    /// 应用当前一轮的连接状态事件。由该轮的监视器在持有锁时调用。
    pub(crate) fn on_state_event(&self, inner: &mut Inner, event: &SessionEvent) -> Result<()> {
        let epoch = inner.state.epoch_id();
        match (inner.state.phase(), event) {
            (SessionState::Connecting, SessionEvent::Connected) => inner.establish(),
            (SessionState::Connected, SessionEvent::Connected) => {
                inner.resume();
                Ok(())
            }
            (SessionState::Initial | SessionState::Closed, SessionEvent::Connected) => Ok(()),
            (_, SessionEvent::Disconnected) => {
                // The client reconnects by itself and keeps the session.
                debug!(epoch = ?epoch, "Connection lost, awaiting reconnection");
                Ok(())
            }
            (_, SessionEvent::Expired) => {
                warn!(epoch = ?epoch, "Session expired, next get starts a new session");
                inner.end(EndCause::Expired);
                Ok(())
            }
            (_, SessionEvent::AuthFailed { scheme }) => {
                warn!(epoch = ?epoch, %scheme, "Authentication failed, closing connection");
                inner.end(EndCause::AuthFailed(scheme.clone()));
                Ok(())
            }
        }
    }
}

/// Abandons the joined epoch if the waiting future is dropped mid-wait.
struct AbandonOnDrop<'a> {
    manager: &'a SessionManager,
    epoch: u64,
    armed: bool,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager.abandon_dropped(self.epoch);
        }
    }
}
