//! Pool error types.
//!
//! [`PoolError`] is returned by every fallible pool operation.  Broker
//! failures keep their own type ([`BrokerError`]) so callers can tell an
//! identity rejection from a secret fetch failure.

use dynpool_broker::BrokerError;

use crate::connector::DriverError;

/// Error type for all pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The broker round trip failed during a refresh.  The previous
    /// generation (if any) remains current.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// A fetched credential could not be turned into a new pool generation.
    #[error("failed to build connection pool: {0}")]
    PoolInit(DriverError),

    /// Checkout or validation failed with an error that rotating
    /// credentials cannot fix.
    #[error("failed to acquire a database connection: {0}")]
    ConnectionAcquire(DriverError),

    /// Authentication-class failures persisted across every attempt.
    #[error("authentication failures persisted after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        /// Attempts made, including the last one.
        attempts: u32,
        /// Failure of the last attempt.
        last: DriverError,
    },

    /// The pool was closed with [`CredentialPool::close`](crate::CredentialPool::close).
    #[error("credential pool is closed")]
    Closed,

    /// Invalid pool configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use dynpool_broker::BrokerFailure;

    use super::*;

    #[test]
    fn broker_errors_are_transparent() {
        let err = PoolError::from(BrokerError::Auth(BrokerFailure::Status {
            status: 500,
            body: String::new(),
        }));
        assert_eq!(err.to_string(), "authentication failed: broker returned HTTP 500");
    }

    #[test]
    fn max_retries_display() {
        let err = PoolError::MaxRetriesExceeded {
            attempts: 3,
            last: DriverError::authentication("access denied"),
        };
        assert_eq!(
            err.to_string(),
            "authentication failures persisted after 3 attempts: authentication failure: access denied"
        );
    }
}
