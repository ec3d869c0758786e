//! The full identity → bearer token → dynamic secret round trip.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::auth::AuthBrokerClient;
use crate::config::BrokerConfig;
use crate::credentials::DynamicCredential;
use crate::error::BrokerError;
use crate::identity::IdentityTokenSource;
use crate::secret::SecretBrokerClient;

/// Anything that can hand out a fresh dynamic database credential.
///
/// [`Broker`] is the production implementation; connection pools depend on
/// this trait so the exchange can be replaced in tests.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Obtain a brand-new credential.  Nothing is cached between calls.
    async fn fetch_credential(&self) -> Result<DynamicCredential, BrokerError>;
}

/// Broker client performing the two-step exchange.
#[derive(Debug, Clone)]
pub struct Broker {
    identity: IdentityTokenSource,
    auth: AuthBrokerClient,
    secrets: SecretBrokerClient,
}

impl Broker {
    /// Build a broker client from its configuration and identity source.
    pub fn new(config: BrokerConfig, identity: IdentityTokenSource) -> Self {
        let http = reqwest::Client::new();
        Self {
            identity,
            auth: AuthBrokerClient::new(http.clone(), config.clone()),
            secrets: SecretBrokerClient::new(http, config),
        }
    }

    /// Build both the configuration and the identity source from the
    /// environment.
    pub fn from_env() -> Result<Self, BrokerError> {
        Ok(Self::new(
            BrokerConfig::from_env()?,
            IdentityTokenSource::from_env()?,
        ))
    }

    /// The identity exchange client.
    pub fn auth(&self) -> &AuthBrokerClient {
        &self.auth
    }

    /// The secret exchange client.
    pub fn secrets(&self) -> &SecretBrokerClient {
        &self.secrets
    }
}

#[async_trait]
impl CredentialSource for Broker {
    async fn fetch_credential(&self) -> Result<DynamicCredential, BrokerError> {
        // 1. Identity token, read fresh
        let identity = self.identity.read().await?;
        debug!(identity_len = identity.as_bytes().len(), "identity token loaded");

        // 2. Identity → bearer token
        let bearer = self.auth.authenticate(&identity).await?;
        drop(identity);

        // 3. Bearer token → dynamic credential
        let credential = self.secrets.fetch_dynamic_secret(&bearer).await?;
        info!("dynamic database credential issued");
        Ok(credential)
    }
}
