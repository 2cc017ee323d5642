//! 会话管理器测试
//! Session manager tests, driven through a scripted connector.

use super::{ConnectionWatcher, Session, SessionState};
use crate::{
    client::KeeperClient,
    config::Config,
    credentials::Credentials,
    error::{Error, OperationError, OperationResult, Result},
    protocol::{Acl, Connector, CreateMode, SessionEvent, SessionHandle, SessionId, Stat},
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// A connection that never talks to anything; the test drives its events.
#[derive(Debug)]
struct MockHandle {
    session_id: SessionId,
    auth: Mutex<Vec<(String, Vec<u8>)>>,
    disconnected: AtomicBool,
}

impl MockHandle {
    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn auth(&self) -> Vec<(String, Vec<u8>)> {
        self.auth.lock().clone()
    }
}

#[async_trait]
impl SessionHandle for MockHandle {
    fn session_id(&self) -> Option<SessionId> {
        Some(self.session_id)
    }

    fn add_auth_info(&self, scheme: &str, token: &[u8]) {
        self.auth.lock().push((scheme.to_string(), token.to_vec()));
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    async fn create(
        &self,
        _path: &str,
        _data: Bytes,
        _acl: Vec<Acl>,
        _mode: CreateMode,
    ) -> OperationResult<String> {
        Err(OperationError::ConnectionLoss)
    }

    async fn get_data(&self, _path: &str) -> OperationResult<(Bytes, Stat)> {
        Err(OperationError::ConnectionLoss)
    }

    async fn set_data(&self, _path: &str, _data: Bytes, _version: i32) -> OperationResult<Stat> {
        Err(OperationError::ConnectionLoss)
    }

    async fn exists(&self, _path: &str) -> OperationResult<Option<Stat>> {
        Ok(None)
    }

    async fn delete(&self, _path: &str, _version: i32) -> OperationResult<()> {
        Err(OperationError::ConnectionLoss)
    }
}

/// Records every connection it is asked for.
#[derive(Debug, Default)]
struct MockConnector {
    connections: Mutex<Vec<(ConnectionWatcher, Arc<MockHandle>)>>,
    refuse: AtomicBool,
}

impl MockConnector {
    fn count(&self) -> usize {
        self.connections.lock().len()
    }

    fn watcher(&self, index: usize) -> ConnectionWatcher {
        self.connections.lock()[index].0.clone()
    }

    fn handle(&self, index: usize) -> Arc<MockHandle> {
        self.connections.lock()[index].1.clone()
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        _config: &Config,
        watcher: ConnectionWatcher,
    ) -> Result<Arc<dyn SessionHandle>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Connect("connection refused".into()));
        }
        let mut connections = self.connections.lock();
        let handle = Arc::new(MockHandle {
            session_id: SessionId(0x100 + connections.len() as i64),
            auth: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        });
        connections.push((watcher, handle.clone()));
        Ok(handle)
    }
}

fn mock_client(credentials: Credentials) -> (KeeperClient, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::default());
    let client = KeeperClient::new(Config::default(), credentials, connector.clone());
    (client, connector)
}

async fn wait_for_connects(connector: &MockConnector, expected: usize) {
    while connector.count() < expected {
        tokio::task::yield_now().await;
    }
}

/// Connects the client through epoch `index` and returns once `get` succeeded.
async fn connect(client: &KeeperClient, connector: &MockConnector, index: usize) -> Session {
    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.get().await })
    };
    wait_for_connects(connector, index + 1).await;
    connector.watcher(index).process(SessionEvent::Connected);
    waiter.await.unwrap().unwrap()
}

#[tokio::test]
async fn test_concurrent_gets_share_one_connection() {
    let (client, connector) = mock_client(Credentials::none());

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.get().await })
        })
        .collect();
    wait_for_connects(&connector, 1).await;
    assert_eq!(client.state(), SessionState::Connecting);

    connector.watcher(0).process(SessionEvent::Connected);
    let sessions: Vec<_> = futures::future::join_all(waiters)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(connector.count(), 1);
    assert!(sessions.iter().all(|session| session.ptr_eq(&sessions[0])));
    assert_eq!(client.state(), SessionState::Connected);
    assert_eq!(client.session_id(), Some(SessionId(0x100)));
}

#[tokio::test]
async fn test_connected_client_does_not_reconnect() {
    let (client, connector) = mock_client(Credentials::none());
    let first = connect(&client, &connector, 0).await;

    for _ in 0..3 {
        let again = client.get().await.unwrap();
        assert!(again.ptr_eq(&first));
    }
    assert_eq!(connector.count(), 1);
    assert!(!client.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_aborts_the_epoch() {
    let (client, connector) = mock_client(Credentials::none());

    let err = client.get_timeout(Duration::from_millis(50)).await.unwrap_err();
    assert_eq!(
        err,
        Error::ConnectionTimeout {
            timeout: Duration::from_millis(50)
        }
    );
    assert_eq!(client.state(), SessionState::Closed);
    assert!(client.is_closed());
    assert!(connector.handle(0).is_disconnected());

    // A late event from the aborted connection changes nothing.
    connector.watcher(0).process(SessionEvent::Connected);
    assert_eq!(client.state(), SessionState::Closed);

    let session = connect(&client, &connector, 1).await;
    assert_eq!(session.session_id(), Some(SessionId(0x101)));
    assert_eq!(connector.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_timeout_waits_for_the_session() {
    let (client, connector) = mock_client(Credentials::none());

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.get_timeout(Duration::MAX).await })
    };
    wait_for_connects(&connector, 1).await;
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(client.state(), SessionState::Connecting);

    connector.watcher(0).process(SessionEvent::Connected);
    let session = waiter.await.unwrap().unwrap();
    assert_eq!(session.session_id(), Some(SessionId(0x100)));
}

#[tokio::test(start_paused = true)]
async fn test_simultaneous_timeouts_abort_once() {
    let (client, connector) = mock_client(Credentials::none());
    let timeout = Duration::from_millis(50);

    let (first, second) = tokio::join!(client.get_timeout(timeout), client.get_timeout(timeout));

    assert_eq!(first.unwrap_err(), Error::ConnectionTimeout { timeout });
    assert_eq!(second.unwrap_err(), Error::ConnectionTimeout { timeout });
    assert_eq!(connector.count(), 1);
    assert!(connector.handle(0).is_disconnected());
    assert_eq!(client.state(), SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_of_aborted_epoch_retries() {
    let (client, connector) = mock_client(Credentials::none());

    let impatient = {
        let client = client.clone();
        tokio::spawn(async move { client.get_timeout(Duration::from_millis(50)).await })
    };
    let patient = {
        let client = client.clone();
        tokio::spawn(async move { client.get_timeout(Duration::from_secs(10)).await })
    };
    wait_for_connects(&connector, 1).await;

    assert!(matches!(
        impatient.await.unwrap(),
        Err(Error::ConnectionTimeout { .. })
    ));
    wait_for_connects(&connector, 2).await;
    assert!(connector.handle(0).is_disconnected());

    connector.watcher(1).process(SessionEvent::Connected);
    let session = patient.await.unwrap().unwrap();
    assert_eq!(session.session_id(), Some(SessionId(0x101)));
}

#[tokio::test]
async fn test_interrupt_aborts_the_epoch() {
    let (client, connector) = mock_client(Credentials::none());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get_or_interrupt(async move {
                    let _ = rx.await;
                })
                .await
        })
    };
    wait_for_connects(&connector, 1).await;
    tx.send(()).unwrap();

    assert_eq!(waiter.await.unwrap().unwrap_err(), Error::Interrupted);
    assert_eq!(client.state(), SessionState::Closed);
    assert!(connector.handle(0).is_disconnected());
}

#[tokio::test]
async fn test_interrupt_is_ignored_once_connected() {
    let (client, connector) = mock_client(Credentials::none());
    let first = connect(&client, &connector, 0).await;

    let session = client.get_or_interrupt(async {}).await.unwrap();
    assert!(session.ptr_eq(&first));
    assert!(!connector.handle(0).is_disconnected());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_waiter_aborts_the_epoch() {
    let (client, connector) = mock_client(Credentials::none());

    let outcome = tokio::time::timeout(Duration::from_millis(10), client.get()).await;
    assert!(outcome.is_err());

    assert_eq!(client.state(), SessionState::Closed);
    assert!(connector.handle(0).is_disconnected());
}

#[tokio::test]
async fn test_stale_events_are_ignored() {
    let (client, connector) = mock_client(Credentials::none());
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        client.register_listener(move |event| seen.lock().push(event.clone()));
    }

    connect(&client, &connector, 0).await;
    client.close();
    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.get().await })
    };
    wait_for_connects(&connector, 2).await;

    connector.watcher(0).process(SessionEvent::Connected);
    connector.watcher(0).process(SessionEvent::Expired);
    assert_eq!(client.state(), SessionState::Connecting);
    assert!(!connector.handle(1).is_disconnected());

    connector.watcher(1).process(SessionEvent::Connected);
    let session = waiter.await.unwrap().unwrap();
    assert_eq!(session.session_id(), Some(SessionId(0x101)));
    assert_eq!(
        *seen.lock(),
        vec![SessionEvent::Connected, SessionEvent::Connected]
    );
}

#[tokio::test]
async fn test_disconnect_keeps_the_session() {
    let (client, connector) = mock_client(Credentials::none());
    let first = connect(&client, &connector, 0).await;

    connector.watcher(0).process(SessionEvent::Disconnected);
    assert_eq!(client.state(), SessionState::Connected);
    assert!(client.get().await.unwrap().ptr_eq(&first));

    connector.watcher(0).process(SessionEvent::Connected);
    assert_eq!(client.state(), SessionState::Connected);
    assert_eq!(client.session_id(), Some(SessionId(0x100)));
    assert!(!connector.handle(0).is_disconnected());
    assert_eq!(connector.count(), 1);
}

#[tokio::test]
async fn test_expiry_closes_and_notifies() {
    let (client, connector) = mock_client(Credentials::none());
    let expirations = Arc::new(AtomicUsize::new(0));
    {
        let expirations = expirations.clone();
        client.register_expiration_handler(move || {
            expirations.fetch_add(1, Ordering::SeqCst);
        });
    }
    let first = connect(&client, &connector, 0).await;

    connector.watcher(0).process(SessionEvent::Expired);
    assert_eq!(client.state(), SessionState::Closed);
    assert!(connector.handle(0).is_disconnected());
    assert_eq!(expirations.load(Ordering::SeqCst), 1);

    let second = connect(&client, &connector, 1).await;
    assert!(!second.ptr_eq(&first));
    assert_ne!(second.session_id(), first.session_id());
}

#[tokio::test]
async fn test_auth_failure_fails_waiters() {
    let (client, connector) = mock_client(Credentials::digest("user", "secret"));

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.get().await })
    };
    wait_for_connects(&connector, 1).await;
    connector.watcher(0).process(SessionEvent::AuthFailed {
        scheme: "digest".into(),
    });

    assert_eq!(
        waiter.await.unwrap().unwrap_err(),
        Error::AuthFailed {
            scheme: "digest".into()
        }
    );
    assert_eq!(client.state(), SessionState::Closed);
    assert!(connector.handle(0).is_disconnected());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (client, connector) = mock_client(Credentials::none());
    client.close();
    assert_eq!(client.state(), SessionState::Initial);
    assert!(client.is_closed());

    connect(&client, &connector, 0).await;
    client.close();
    client.close();

    assert_eq!(client.state(), SessionState::Closed);
    assert_eq!(client.session_id(), None);
    assert!(connector.handle(0).is_disconnected());
    assert_eq!(connector.count(), 1);
}

#[tokio::test]
async fn test_listener_may_close_the_client() {
    let (client, connector) = mock_client(Credentials::none());
    {
        let closer = client.clone();
        client.register_listener(move |event| {
            if *event == SessionEvent::Disconnected {
                closer.close();
            }
        });
    }
    connect(&client, &connector, 0).await;

    connector.watcher(0).process(SessionEvent::Disconnected);
    assert_eq!(client.state(), SessionState::Closed);
    assert!(connector.handle(0).is_disconnected());
}

#[tokio::test]
async fn test_invalid_config_never_connects() {
    let connector = Arc::new(MockConnector::default());
    let config = Config {
        servers: Vec::new(),
        ..Config::default()
    };
    let client = KeeperClient::new(config, Credentials::none(), connector.clone());

    assert!(matches!(client.get().await, Err(Error::InvalidConfig(_))));
    assert_eq!(connector.count(), 0);
    assert_eq!(client.state(), SessionState::Initial);
}

#[tokio::test]
async fn test_connector_error_is_propagated() {
    let (client, connector) = mock_client(Credentials::none());
    connector.refuse.store(true, Ordering::SeqCst);

    assert!(matches!(client.get().await, Err(Error::Connect(_))));
    assert_eq!(client.state(), SessionState::Initial);

    connector.refuse.store(false, Ordering::SeqCst);
    connect(&client, &connector, 0).await;
    assert_eq!(client.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_credentials_applied_to_every_epoch() {
    let (client, connector) = mock_client(Credentials::digest("user", "secret"));
    assert!(client.has_credentials());

    connect(&client, &connector, 0).await;
    client.close();
    connect(&client, &connector, 1).await;

    let expected = vec![("digest".to_string(), b"user:secret".to_vec())];
    assert_eq!(connector.handle(0).auth(), expected);
    assert_eq!(connector.handle(1).auth(), expected);
}

#[tokio::test]
async fn test_dropping_the_client_disposes_the_connection() {
    let (client, connector) = mock_client(Credentials::none());
    connect(&client, &connector, 0).await;

    drop(client);
    assert!(connector.handle(0).is_disconnected());
    // The watcher outlives the manager and must tolerate it.
    connector.watcher(0).process(SessionEvent::Disconnected);
}
