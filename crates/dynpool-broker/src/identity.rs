//! Workload identity token source.

use std::fmt;
use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::credentials::IdentityToken;
use crate::error::BrokerError;

/// Where the platform mounts the service-account token inside a pod.
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Supplies the workload's identity token.
///
/// The token is read on every call to [`read`](Self::read) and never cached:
/// projected service-account tokens are rotated on disk by the platform.
#[derive(Clone)]
pub enum IdentityTokenSource {
    /// Read the token from a file (surrounding whitespace is trimmed).
    File(PathBuf),
    /// Use an injected token value, for local development.
    Literal(Zeroizing<String>),
}

impl IdentityTokenSource {
    /// Token mounted at [`SERVICE_ACCOUNT_TOKEN_PATH`].
    pub fn service_account() -> Self {
        Self::File(PathBuf::from(SERVICE_ACCOUNT_TOKEN_PATH))
    }

    /// Injected token value.
    pub fn literal(token: impl Into<String>) -> Self {
        Self::Literal(Zeroizing::new(token.into()))
    }

    /// Select the source from environment variables.
    ///
    /// | Variable              | Description                                         |
    /// |-----------------------|-----------------------------------------------------|
    /// | `ENVIRONMENT`         | `remote` selects the file source                    |
    /// | `IDENTITY_TOKEN_PATH` | file path (default: the service-account mount)      |
    /// | `IDENTITY_TOKEN`      | literal token, required when not running `remote`   |
    pub fn from_env() -> Result<Self, BrokerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BrokerError> {
        if lookup("ENVIRONMENT").as_deref() == Some("remote") {
            return Ok(match lookup("IDENTITY_TOKEN_PATH") {
                Some(path) if !path.is_empty() => Self::File(PathBuf::from(path)),
                _ => Self::service_account(),
            });
        }

        lookup("IDENTITY_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .map(Self::literal)
            .ok_or_else(|| {
                BrokerError::Config("IDENTITY_TOKEN must be set unless ENVIRONMENT=remote".into())
            })
    }

    /// Read the current identity token.
    pub async fn read(&self) -> Result<IdentityToken, BrokerError> {
        let token = match self {
            Self::File(path) => {
                let raw = Zeroizing::new(tokio::fs::read_to_string(path).await.map_err(|e| {
                    BrokerError::IdentityToken(format!("{}: {e}", path.display()))
                })?);
                IdentityToken::new(raw.trim())
            }
            Self::Literal(value) => IdentityToken::new(value.trim()),
        };

        if token.is_empty() {
            return Err(BrokerError::IdentityToken("token is empty".into()));
        }
        Ok(token)
    }
}

impl fmt::Debug for IdentityTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Literal(_) => f.write_str("Literal(..)"),
        }
    }
}
