//! Identity exchange: workload identity token → bearer token.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::credentials::{BearerToken, IdentityToken};
use crate::error::{BrokerError, BrokerFailure};

/// Client for the broker's authentication endpoint.
#[derive(Debug, Clone)]
pub struct AuthBrokerClient {
    http: reqwest::Client,
    config: BrokerConfig,
}

impl AuthBrokerClient {
    /// Create a client sharing the given HTTP connection pool.
    pub fn new(http: reqwest::Client, config: BrokerConfig) -> Self {
        Self { http, config }
    }

    /// Exchange an identity token for a bearer token.
    ///
    /// Any non-success status is fatal for this attempt; there is no
    /// partial success.
    pub async fn authenticate(&self, identity: &IdentityToken) -> Result<BearerToken, BrokerError> {
        let url = self.config.auth_url();
        debug!(%url, access_type = %self.config.access_type, "authenticating with broker");

        let res = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&auth_payload(&self.config, identity))
            .send()
            .await
            .map_err(|e| BrokerError::Auth(BrokerFailure::Transport(e)))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "broker rejected authentication");
            return Err(BrokerError::Auth(BrokerFailure::Status {
                status: status.as_u16(),
                body,
            }));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| BrokerError::Auth(BrokerFailure::Transport(e)))?;
        let token = parse_token(&bytes)?;

        debug!(token_len = token.expose().len(), "bearer token issued");
        Ok(token)
    }
}

fn parse_token(bytes: &[u8]) -> Result<BearerToken, BrokerError> {
    let malformed = |reason: String| BrokerError::Auth(BrokerFailure::Malformed(reason));

    let body: Value =
        serde_json::from_slice(bytes).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
    body["token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(BearerToken::new)
        .ok_or_else(|| malformed("missing `token` in auth response".into()))
}

/// Build the JSON body of the identity exchange.
///
/// The auth-config and token field names are prefixed with the access type
/// (`k8s-auth-config-name`, `k8s-service-account-token`).
fn auth_payload(config: &BrokerConfig, identity: &IdentityToken) -> Value {
    let access_type = &config.access_type;
    let mut payload = json!({
        "access-type": access_type,
        "access-id": config.access_id,
        "gateway-url": config.gateway_url,
        "json": true,
    });
    payload[format!("{access_type}-auth-config-name")] = json!(config.auth_config_name);
    payload[format!("{access_type}-service-account-token")] = json!(identity.to_base64());
    payload
}
