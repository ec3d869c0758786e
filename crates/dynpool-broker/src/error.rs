//! Broker error types.
//!
//! [`BrokerError`] names the step of the exchange that failed (identity
//! token, authentication, secret fetch) and [`BrokerFailure`] carries the
//! detail of what went wrong on the wire.  Neither type ever holds token
//! or password material.

use std::fmt;

/// Error type for every broker operation.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The workload identity token could not be read.
    #[error("identity token unavailable: {0}")]
    IdentityToken(String),

    /// The broker rejected, or could not be reached for, the identity exchange.
    #[error("authentication failed: {0}")]
    Auth(BrokerFailure),

    /// The broker rejected, or could not be reached for, the secret exchange,
    /// or it returned a payload without the expected fields.
    #[error("dynamic secret fetch failed: {0}")]
    SecretFetch(BrokerFailure),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// HTTP status returned by the broker, if the failure was a rejection.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth(BrokerFailure::Status { status, .. })
            | Self::SecretFetch(BrokerFailure::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// What went wrong during a single broker call.
#[derive(Debug)]
pub enum BrokerFailure {
    /// The request never produced a response (DNS, connect, timeout, body read).
    Transport(reqwest::Error),

    /// The broker answered with a non-success status.
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// The broker answered 2xx but the body did not have the expected shape.
    Malformed(String),
}

impl fmt::Display for BrokerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Status { status, body } if body.is_empty() => {
                write!(f, "broker returned HTTP {status}")
            }
            Self::Status { status, body } => write!(f, "broker returned HTTP {status}: {body}"),
            Self::Malformed(reason) => write!(f, "malformed response: {reason}"),
        }
    }
}

impl std::error::Error for BrokerFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}
