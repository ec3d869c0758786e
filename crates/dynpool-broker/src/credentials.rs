//! Secret-bearing values exchanged with the broker.
//!
//! All three types zeroize their contents on drop and print only a length
//! from `Debug`, so they can sit inside structured log fields or error
//! chains without leaking material.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Workload identity token, read fresh for every authentication attempt.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IdentityToken(Vec<u8>);

impl IdentityToken {
    /// Wrap raw token bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Standard base64 encoding, as embedded in the auth payload.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `true` if the token holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityToken")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Short-lived token issued by the broker's auth endpoint.
///
/// Used once, immediately, to fetch a dynamic secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token as sent on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Database username/password pair issued on demand by the broker.
///
/// The broker does not return an expiry in this flow; the validity window
/// is the locally configured TTL.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DynamicCredential {
    username: String,
    password: String,
}

impl DynamicCredential {
    /// Build a credential from its parts.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Dynamic database username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Dynamic database password.
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for DynamicCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicCredential")
            .field("username_len", &self.username.len())
            .field("password_len", &self.password.len())
            .finish()
    }
}
