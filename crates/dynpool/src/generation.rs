//! One generation of the underlying connection pool.
//!
//! A [`Generation`] is tied to exactly one dynamic credential.  It bounds
//! concurrent connections with a semaphore, keeps idle connections on a
//! LIFO stack, and once retired closes every connection handed back to it
//! instead of pooling it again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::connector::{ConnectOptions, Connector, DriverError};
use crate::error::PoolError;
use crate::handle::ConnectionHandle;

/// Why a checkout produced no connection.
#[derive(Debug)]
pub(crate) enum CheckoutError {
    /// The generation was replaced while the caller waited for it; retry on
    /// the current one.
    Retired,
    /// The driver failed to open or validate a connection.
    Driver(DriverError),
}

impl From<DriverError> for CheckoutError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

/// A point-in-time view of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationStatus {
    /// Monotonic generation number, starting at 1.
    pub id: u64,
    /// Time since the generation was built.
    pub age: Duration,
    /// Idle connections ready for reuse.
    pub idle: usize,
    /// Connections currently leased to callers.
    pub in_use: usize,
    /// Maximum live connections.
    pub max_size: usize,
}

/// One complete instance of the underlying pool.
pub struct Generation<C: Connector> {
    id: u64,
    created_at: Instant,
    options: ConnectOptions,
    connector: Arc<C>,
    slots: Arc<Semaphore>,
    max_size: usize,
    idle: Mutex<Vec<C::Connection>>,
    retired: AtomicBool,
}

impl<C: Connector> Generation<C> {
    /// Build a generation for `options`, opening `min_idle` connections up
    /// front.  Any warm-up failure closes what was opened and fails the build.
    pub(crate) async fn build(
        id: u64,
        options: ConnectOptions,
        connector: Arc<C>,
        max_size: usize,
        min_idle: usize,
    ) -> Result<Arc<Self>, PoolError> {
        if options.credential.username().is_empty() {
            return Err(PoolError::PoolInit(DriverError::other(
                "dynamic credential has an empty username",
            )));
        }

        let mut warm = Vec::with_capacity(min_idle);
        for _ in 0..min_idle {
            match connector.connect(&options).await {
                Ok(conn) => warm.push(conn),
                Err(e) => {
                    for conn in warm {
                        connector.close(conn).await;
                    }
                    return Err(PoolError::PoolInit(e));
                }
            }
        }

        debug!(generation = id, warm = min_idle, max_size, "pool generation built");
        Ok(Arc::new(Self {
            id,
            created_at: Instant::now(),
            options,
            connector,
            slots: Arc::new(Semaphore::new(max_size)),
            max_size,
            idle: Mutex::new(warm),
            retired: AtomicBool::new(false),
        }))
    }

    /// Generation number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the generation was built.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// `true` once a newer generation has replaced this one.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Username the generation's connections authenticate as.
    pub fn username(&self) -> &str {
        self.options.credential.username()
    }

    /// Snapshot of the generation's occupancy.
    pub async fn status(&self) -> GenerationStatus {
        GenerationStatus {
            id: self.id,
            age: self.created_at.elapsed(),
            idle: self.idle.lock().await.len(),
            in_use: self.max_size - self.slots.available_permits(),
            max_size: self.max_size,
        }
    }

    /// Check out a connection and validate it with `query`.
    ///
    /// A connection that fails validation is closed, never returned.  A
    /// retired generation opens no connections and hands none out.
    pub(crate) async fn checkout(
        self: &Arc<Self>,
        query: &str,
    ) -> Result<ConnectionHandle<C>, CheckoutError> {
        // Retirement closes the semaphore, waking every queued caller.
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| CheckoutError::Retired)?;
        if self.is_retired() {
            return Err(CheckoutError::Retired);
        }

        let reused = self.idle.lock().await.pop();
        let mut conn = match reused {
            Some(conn) => conn,
            None => {
                if self.is_retired() {
                    return Err(CheckoutError::Retired);
                }
                self.connector.connect(&self.options).await?
            }
        };

        if let Err(e) = self.connector.validate(&mut conn, query).await {
            debug!(generation = self.id, error = %e, "connection failed validation");
            self.connector.close(conn).await;
            return Err(e.into());
        }
        if self.is_retired() {
            self.connector.close(conn).await;
            return Err(CheckoutError::Retired);
        }

        Ok(ConnectionHandle::new(conn, Arc::clone(self), permit))
    }

    /// Take back a connection from a caller: reset and pool it if this
    /// generation is still current, close it otherwise.
    pub(crate) async fn reclaim(&self, mut conn: C::Connection) {
        if !self.is_retired() {
            if let Err(e) = self.connector.reset(&mut conn).await {
                debug!(generation = self.id, error = %e, "session reset failed, closing connection");
                self.connector.close(conn).await;
                return;
            }
        }

        let mut idle = self.idle.lock().await;
        if self.is_retired() {
            drop(idle);
            debug!(generation = self.id, "closing connection of retired generation");
            self.connector.close(conn).await;
        } else {
            idle.push(conn);
        }
    }

    /// Mark the generation superseded and close its idle connections.
    ///
    /// Leased connections are closed as they come back through
    /// [`reclaim`](Self::reclaim).
    pub(crate) async fn retire(&self) {
        let drained = {
            let mut idle = self.idle.lock().await;
            self.retired.store(true, Ordering::Release);
            self.slots.close();
            std::mem::take(&mut *idle)
        };

        debug!(
            generation = self.id,
            idle = drained.len(),
            leased = self.max_size - self.slots.available_permits(),
            "retiring pool generation"
        );
        for conn in drained {
            self.connector.close(conn).await;
        }
    }
}
