//! # dynpool
//!
//! A database connection pool whose credentials are issued by a
//! dynamic-secret broker and expire after a short TTL.
//!
//! [`CredentialPool`] owns one [`Generation`] at a time.  Each generation is
//! a complete pool built from one credential.  The pool replaces it
//! proactively once the credential nears expiry, and reactively when the
//! database rejects the credential before then.  Connections leased from a
//! superseded generation keep working until they are released, at which
//! point they are closed.
//!
//! Credentials come from any [`CredentialSource`]; the broker client in
//! [`dynpool_broker`] is the production one.  Physical connections come
//! from a [`Connector`]; [`MySqlConnector`] is provided behind the `mysql`
//! feature.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dynpool::{Broker, CredentialPool, MySqlConnector, PoolConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let broker = Arc::new(Broker::from_env()?);
//! let pool = CredentialPool::connect(PoolConfig::from_env()?, broker, MySqlConnector).await?;
//!
//! let conn = pool.acquire().await?;
//! // ... use `conn` as a `sqlx::MySqlConnection` ...
//! pool.release(conn).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod generation;
pub mod handle;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod pool;

#[cfg(test)]
mod testing;

pub use config::PoolConfig;
pub use connector::{ConnectOptions, Connector, DriverError, DriverErrorKind};
pub use error::PoolError;
pub use generation::{Generation, GenerationStatus};
pub use handle::ConnectionHandle;
#[cfg(feature = "mysql")]
pub use mysql::MySqlConnector;
pub use pool::CredentialPool;

pub use dynpool_broker::{Broker, BrokerConfig, BrokerError, CredentialSource, DynamicCredential};
