//! Shared setup for the integration tests.
#![allow(dead_code)]

use keeper_client::{Config, Credentials, KeeperClient, testing::InMemoryEnsemble};
use std::sync::Once;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "keeper_client=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// An in-memory ensemble plus helpers to build clients against it.
pub struct TestCluster {
    pub ensemble: InMemoryEnsemble,
}

impl TestCluster {
    pub fn new() -> Self {
        init_tracing();
        Self {
            ensemble: InMemoryEnsemble::new(),
        }
    }

    pub fn client(&self, credentials: Credentials) -> KeeperClient {
        self.client_with(Config::default(), credentials)
    }

    pub fn client_with(&self, config: Config, credentials: Credentials) -> KeeperClient {
        KeeperClient::new(config, credentials, self.ensemble.connector())
    }
}

/// Yields until `condition` holds, letting event delivery tasks run.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
