//! Database driver abstraction.
//!
//! The pool only needs three capabilities from a driver: open a connection
//! with a given credential, run a validation query on it, and close it.
//! Drivers classify their own failures into [`DriverErrorKind`] so the pool
//! never has to match on error message text.

use std::fmt;

use async_trait::async_trait;
use dynpool_broker::DynamicCredential;

/// Everything needed to open one physical connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database (schema) name.
    pub database: String,
    /// Credential of the generation this connection belongs to.
    pub credential: DynamicCredential,
}

/// How a driver failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Plausibly caused by a revoked or rotated credential (access denied,
    /// connection refused).  Worth a credential refresh and another attempt.
    Authentication,
    /// Anything else.  Rotating credentials will not help.
    Other,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => f.write_str("authentication failure"),
            Self::Other => f.write_str("driver error"),
        }
    }
}

/// A classified driver failure.
///
/// Messages must not carry credential material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    message: String,
}

impl DriverError {
    /// Build an error of an explicit kind.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// An authentication-class failure.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Authentication, message)
    }

    /// Any other failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Other, message)
    }

    /// Classification of this failure.
    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    /// `true` for failures a credential refresh may fix.
    pub fn is_authentication(&self) -> bool {
        self.kind == DriverErrorKind::Authentication
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Opens, validates and closes physical connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The physical connection type handed to callers.
    type Connection: Send + 'static;

    /// Open a new connection authenticating with `options.credential`.
    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Connection, DriverError>;

    /// Run a cheap round-trip query to prove the connection is usable.
    async fn validate(&self, conn: &mut Self::Connection, query: &str) -> Result<(), DriverError>;

    /// Reset session state before a connection goes back to the idle set.
    ///
    /// A failure closes the connection instead of pooling it.  The default
    /// does nothing.
    async fn reset(&self, _conn: &mut Self::Connection) -> Result<(), DriverError> {
        Ok(())
    }

    /// Close a connection.  Failures are the driver's to log; the connection
    /// is gone either way.
    async fn close(&self, conn: Self::Connection);
}
