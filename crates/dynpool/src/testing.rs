//! In-memory doubles for pool tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dynpool_broker::{BrokerError, BrokerFailure, CredentialSource, DynamicCredential};

use crate::connector::{ConnectOptions, Connector, DriverError};

/// Credential source issuing `user-1`, `user-2`, … with optional scripted
/// broker rejections and an artificial round-trip delay.
#[derive(Default)]
pub struct ScriptedSource {
    calls: AtomicU64,
    issued: AtomicU64,
    failures: Mutex<VecDeque<u16>>,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    /// The next call fails as if the auth endpoint returned `status`.
    pub fn fail_next_auth(&self, status: u16) {
        self.failures.lock().unwrap().push_back(status);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for ScriptedSource {
    async fn fetch_credential(&self) -> Result<DynamicCredential, BrokerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(status) = failure {
            return Err(BrokerError::Auth(BrokerFailure::Status {
                status,
                body: "scripted".into(),
            }));
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DynamicCredential::new(format!("user-{n}"), format!("pw-{n}")))
    }
}

/// A fake physical connection.
#[derive(Debug)]
pub struct FakeConn {
    pub id: u64,
    pub username: String,
}

#[derive(Default)]
struct FakeState {
    connect_failures: VecDeque<DriverError>,
    validate_failures: VecDeque<DriverError>,
    reset_failures: VecDeque<DriverError>,
    resets: usize,
    usernames: Vec<String>,
    closed: Vec<u64>,
}

/// Connector whose connect and validate results can be scripted.
/// Clones share state.
#[derive(Clone, Default)]
pub struct FakeConnector {
    next_id: Arc<AtomicU64>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue failures for the next `connect` calls.
    pub fn fail_connects(&self, errors: impl IntoIterator<Item = DriverError>) {
        self.state.lock().unwrap().connect_failures.extend(errors);
    }

    /// Queue failures for the next `validate` calls.
    pub fn fail_validations(&self, errors: impl IntoIterator<Item = DriverError>) {
        self.state.lock().unwrap().validate_failures.extend(errors);
    }

    /// Queue failures for the next `reset` calls.
    pub fn fail_resets(&self, errors: impl IntoIterator<Item = DriverError>) {
        self.state.lock().unwrap().reset_failures.extend(errors);
    }

    /// Session resets performed so far, failed ones included.
    pub fn resets(&self) -> usize {
        self.state.lock().unwrap().resets
    }

    /// Usernames of every successful connect, in order.
    pub fn usernames(&self) -> Vec<String> {
        self.state.lock().unwrap().usernames.clone()
    }

    /// Ids of closed connections.
    pub fn closed(&self) -> Vec<u64> {
        self.state.lock().unwrap().closed.clone()
    }

    /// Successful connects so far.
    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().usernames.len()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConn;

    async fn connect(&self, options: &ConnectOptions) -> Result<FakeConn, DriverError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.connect_failures.pop_front() {
            return Err(err);
        }
        state.usernames.push(options.credential.username().to_string());
        Ok(FakeConn {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            username: options.credential.username().to_string(),
        })
    }

    async fn validate(&self, _conn: &mut FakeConn, query: &str) -> Result<(), DriverError> {
        assert_eq!(query, "SELECT 1");
        match self.state.lock().unwrap().validate_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn reset(&self, _conn: &mut FakeConn) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.resets += 1;
        match state.reset_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&self, conn: FakeConn) {
        self.state.lock().unwrap().closed.push(conn.id);
    }
}
