//! # dynpool-broker
//!
//! Client for a dynamic-secret broker that issues short-lived database
//! credentials to workloads.
//!
//! The exchange has two steps:
//!
//! 1. [`AuthBrokerClient`] trades the workload identity token (read from an
//!    [`IdentityTokenSource`]) for a short-lived [`BearerToken`].
//! 2. [`SecretBrokerClient`] trades that bearer token for a
//!    [`DynamicCredential`].
//!
//! [`Broker`] chains both and implements [`CredentialSource`], which is what
//! connection pools consume.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use dynpool_broker::{Broker, CredentialSource};
//!
//! # async fn run() -> Result<(), dynpool_broker::BrokerError> {
//! let broker = Broker::from_env()?;
//! let credential = broker.fetch_credential().await?;
//! println!("issued a credential ({} byte username)", credential.username().len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod broker;
pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod secret;

#[cfg(test)]
mod test_support;

pub use auth::AuthBrokerClient;
pub use broker::{Broker, CredentialSource};
pub use config::{parse_duration, BrokerConfig};
pub use credentials::{BearerToken, DynamicCredential, IdentityToken};
pub use error::{BrokerError, BrokerFailure};
pub use identity::IdentityTokenSource;
pub use secret::SecretBrokerClient;
