//! Credential-aware connection pool.
//!
//! [`CredentialPool`] owns the current [`Generation`] and decides when to
//! replace it:
//!
//! * **Proactively**, before every acquisition, once the credential is older
//!   than `ttl - refresh_margin`.
//! * **Reactively**, when a checkout fails with an authentication-class
//!   error, which is how a credential revoked ahead of its TTL shows up.
//!
//! Refreshes are single-flight.  Concurrent callers that find the
//! credential stale queue on the refresh lock; the first performs the
//! broker round trip and the rest re-check freshness and proceed against
//! the new generation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dynpool_broker::CredentialSource;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::connector::{ConnectOptions, Connector};
use crate::error::PoolError;
use crate::generation::{CheckoutError, Generation, GenerationStatus};
use crate::handle::ConnectionHandle;

/// Bookkeeping guarded by the refresh lock.
#[derive(Debug)]
struct RefreshState {
    last_refresh: Instant,
    refreshes: u64,
}

struct Inner<C: Connector> {
    config: PoolConfig,
    source: Arc<dyn CredentialSource>,
    connector: Arc<C>,
    current: RwLock<Arc<Generation<C>>>,
    refresh: Mutex<RefreshState>,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

/// A connection pool whose credentials are short-lived and rotated by an
/// external broker.
///
/// Construct once at startup with [`connect`](Self::connect) and clone the
/// handle into every request path; clones share the same pool.
pub struct CredentialPool<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for CredentialPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> CredentialPool<C> {
    /// Fetch an initial credential and build the first generation.
    ///
    /// Any failure is fatal: there is no pool without a credential.
    pub async fn connect(
        config: PoolConfig,
        source: Arc<dyn CredentialSource>,
        connector: C,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let connector = Arc::new(connector);

        let first = build_generation(&config, source.as_ref(), &connector, 1).await?;
        info!(
            generation = first.id(),
            host = %config.host,
            database = %config.database,
            max_size = config.max_size,
            ttl_secs = config.ttl.as_secs_f64(),
            "credential pool ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                source,
                connector,
                current: RwLock::new(first),
                refresh: Mutex::new(RefreshState {
                    last_refresh: Instant::now(),
                    refreshes: 0,
                }),
                next_generation: AtomicU64::new(2),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Lease a validated connection.
    ///
    /// Refreshes first if the credential is near expiry.  Authentication-class
    /// checkout failures trigger backoff, a refresh and another attempt, up to
    /// `max_attempts`; any other failure is returned immediately.
    ///
    /// A caller waiting on a full generation that gets replaced moves on to
    /// the new one without spending an attempt.
    ///
    /// Worst-case latency is roughly `max_attempts × retry_backoff` plus the
    /// broker round trips; wrap the call in a timeout if that matters.
    pub async fn acquire(&self) -> Result<ConnectionHandle<C>, PoolError> {
        self.check_open()?;
        self.ensure_fresh().await?;

        let config = &self.inner.config;
        let mut attempt = 1;
        loop {
            self.check_open()?;
            let generation = self.current().await;
            let err = match generation.checkout(&config.validation_query).await {
                Ok(handle) => return Ok(handle),
                Err(CheckoutError::Retired) => {
                    debug!(generation = generation.id(), "generation replaced while waiting");
                    continue;
                }
                Err(CheckoutError::Driver(e)) => e,
            };

            if !err.is_authentication() {
                error!(generation = generation.id(), error = %err, "connection checkout failed");
                return Err(PoolError::ConnectionAcquire(err));
            }
            if attempt >= config.max_attempts {
                error!(
                    attempts = attempt,
                    generation = generation.id(),
                    error = %err,
                    "authentication failures persisted, giving up"
                );
                return Err(PoolError::MaxRetriesExceeded {
                    attempts: attempt,
                    last: err,
                });
            }

            warn!(
                attempt,
                max_attempts = config.max_attempts,
                generation = generation.id(),
                error = %err,
                "authentication-class failure, rotating credentials"
            );
            tokio::time::sleep(config.retry_backoff).await;
            self.refresh_after_failure(generation.id()).await?;
            attempt += 1;
        }
    }

    /// Return a leased connection.
    ///
    /// Connections of a superseded generation are closed rather than pooled.
    pub async fn release(&self, handle: ConnectionHandle<C>) {
        handle.release().await;
    }

    /// Unconditionally replace the current generation with one built from a
    /// freshly fetched credential.
    ///
    /// All-or-nothing: on failure the current generation stays in place and
    /// the error is returned.
    pub async fn refresh(&self) -> Result<(), PoolError> {
        let mut state = self.inner.refresh.lock().await;
        self.rotate(&mut state).await
    }

    /// Number of the current generation.
    pub async fn generation(&self) -> u64 {
        self.current().await.id()
    }

    /// When the current credential was obtained.
    pub async fn last_refresh(&self) -> Instant {
        self.inner.refresh.lock().await.last_refresh
    }

    /// Completed refreshes since construction.
    pub async fn refresh_count(&self) -> u64 {
        self.inner.refresh.lock().await.refreshes
    }

    /// Occupancy of the current generation.
    pub async fn status(&self) -> GenerationStatus {
        self.current().await.status().await
    }

    /// The pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Retire the current generation and close its idle connections.
    ///
    /// Leased connections are closed when released.  Afterwards `acquire`
    /// and `refresh` fail with [`PoolError::Closed`].  Closing twice is a
    /// no-op.
    pub async fn close(&self) {
        let _state = self.inner.refresh.lock().await;
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let current = self.current().await;
        current.retire().await;
        info!(generation = current.id(), "credential pool closed");
    }

    /// `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), PoolError> {
        if self.is_closed() {
            Err(PoolError::Closed)
        } else {
            Ok(())
        }
    }

    async fn current(&self) -> Arc<Generation<C>> {
        Arc::clone(&*self.inner.current.read().await)
    }

    /// Refresh if the credential has reached `ttl - refresh_margin`.
    ///
    /// The check and the refresh happen under one lock, so of many
    /// concurrent callers only the first to see a stale credential performs
    /// the round trip.
    async fn ensure_fresh(&self) -> Result<(), PoolError> {
        let mut state = self.inner.refresh.lock().await;
        let age = state.last_refresh.elapsed();
        if age < self.inner.config.refresh_after() {
            return Ok(());
        }

        debug!(age_secs = age.as_secs_f64(), "credential near expiry, refreshing");
        self.rotate(&mut state).await
    }

    /// Refresh in response to a failure on generation `failed`, unless a
    /// concurrent caller has already replaced it.
    async fn refresh_after_failure(&self, failed: u64) -> Result<(), PoolError> {
        let mut state = self.inner.refresh.lock().await;
        let current = self.current().await.id();
        if current != failed {
            debug!(failed, current, "generation already replaced");
            return Ok(());
        }
        self.rotate(&mut state).await
    }

    /// Build a new generation and swap it in.  Callers hold the refresh lock.
    async fn rotate(&self, state: &mut RefreshState) -> Result<(), PoolError> {
        self.check_open()?;
        let inner = &self.inner;
        let id = inner.next_generation.fetch_add(1, Ordering::Relaxed);

        let next = match build_generation(&inner.config, inner.source.as_ref(), &inner.connector, id)
            .await
        {
            Ok(generation) => generation,
            Err(e) => {
                error!(generation = id, error = %e, "credential refresh failed");
                return Err(e);
            }
        };

        let previous = std::mem::replace(&mut *inner.current.write().await, next);
        previous.retire().await;

        state.last_refresh = Instant::now();
        state.refreshes += 1;
        info!(
            generation = id,
            retired = previous.id(),
            refreshes = state.refreshes,
            "credential pool rotated"
        );
        Ok(())
    }
}

async fn build_generation<C: Connector>(
    config: &PoolConfig,
    source: &dyn CredentialSource,
    connector: &Arc<C>,
    id: u64,
) -> Result<Arc<Generation<C>>, PoolError> {
    let credential = source.fetch_credential().await?;
    let options = ConnectOptions {
        host: config.host.clone(),
        port: config.port,
        database: config.database.clone(),
        credential,
    };
    Generation::build(
        id,
        options,
        Arc::clone(connector),
        config.max_size,
        config.min_idle,
    )
    .await
}
