//! Secret exchange: bearer token → dynamic database credential.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::credentials::{BearerToken, DynamicCredential};
use crate::error::{BrokerError, BrokerFailure};

/// Client for the broker's dynamic-secret endpoint.
#[derive(Debug, Clone)]
pub struct SecretBrokerClient {
    http: reqwest::Client,
    config: BrokerConfig,
}

/// Success body of the secret endpoint.  Fields are optional so that a
/// missing one can be reported by name.
#[derive(Deserialize)]
struct SecretResponse {
    user: Option<String>,
    password: Option<String>,
}

impl SecretBrokerClient {
    /// Create a client sharing the given HTTP connection pool.
    pub fn new(http: reqwest::Client, config: BrokerConfig) -> Self {
        Self { http, config }
    }

    /// Fetch a fresh dynamic credential using a just-issued bearer token.
    ///
    /// Malformed payloads are fatal and not retried here.
    pub async fn fetch_dynamic_secret(
        &self,
        bearer: &BearerToken,
    ) -> Result<DynamicCredential, BrokerError> {
        let url = self.config.secret_url();
        debug!(%url, secret = %self.config.dynamic_secret_name, "fetching dynamic secret");

        let res = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.config.secret_timeout)
            .json(&secret_payload(&self.config, bearer))
            .send()
            .await
            .map_err(|e| BrokerError::SecretFetch(BrokerFailure::Transport(e)))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                secret = %self.config.dynamic_secret_name,
                "broker rejected dynamic secret request"
            );
            return Err(BrokerError::SecretFetch(BrokerFailure::Status {
                status: status.as_u16(),
                body,
            }));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| BrokerError::SecretFetch(BrokerFailure::Transport(e)))?;
        parse_secret(&bytes)
    }
}

fn secret_payload(config: &BrokerConfig, bearer: &BearerToken) -> Value {
    json!({
        "json": true,
        "timeout": config.secret_timeout.as_secs(),
        "name": config.dynamic_secret_name,
        "token": bearer.expose(),
    })
}

fn parse_secret(bytes: &[u8]) -> Result<DynamicCredential, BrokerError> {
    let malformed = |reason: String| BrokerError::SecretFetch(BrokerFailure::Malformed(reason));

    let body: SecretResponse =
        serde_json::from_slice(bytes).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
    let user = body
        .user
        .filter(|u| !u.is_empty())
        .ok_or_else(|| malformed("missing `user` in secret response".into()))?;
    let password = body
        .password
        .ok_or_else(|| malformed("missing `password` in secret response".into()))?;

    Ok(DynamicCredential::new(user, password))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;
    use crate::test_support::serve;

    fn client_for(addr: SocketAddr) -> SecretBrokerClient {
        let cfg = BrokerConfig::new(
            format!("http://{addr}"),
            "https://gw.example.com:8000",
            "p-abc123",
            "cluster-auth",
            "/db/todos-rw",
        );
        SecretBrokerClient::new(reqwest::Client::new(), cfg)
    }

    #[test]
    fn payload_carries_name_token_and_timeout() {
        let cfg = BrokerConfig::new("http://gw", "https://gw:8000", "p-1", "cfg", "/db/x")
            .with_secret_timeout(Duration::from_secs(20));
        let payload = secret_payload(&cfg, &BearerToken::new("t-abc"));

        assert_eq!(payload["name"], "/db/x");
        assert_eq!(payload["token"], "t-abc");
        assert_eq!(payload["timeout"], 20);
        assert_eq!(payload["json"], true);
    }

    #[test]
    fn parse_rejects_missing_fields() {
        let err = parse_secret(br#"{"password":"p"}"#).unwrap_err();
        assert!(err.to_string().contains("missing `user`"));

        let err = parse_secret(br#"{"user":"u"}"#).unwrap_err();
        assert!(err.to_string().contains("missing `password`"));

        let err = parse_secret(b"not json").unwrap_err();
        assert!(matches!(
            err,
            BrokerError::SecretFetch(BrokerFailure::Malformed(_))
        ));
    }

    #[test]
    fn parse_ignores_extra_fields() {
        let cred = parse_secret(br#"{"user":"v-todos-1","password":"pw","ttl_in_minutes":"1"}"#)
            .unwrap();
        assert_eq!(cred.username(), "v-todos-1");
        assert_eq!(cred.password(), "pw");
    }

    #[tokio::test]
    async fn fetches_user_and_password() {
        let app = Router::new().route(
            "/get-dynamic-secret-value",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["token"], "t-abc");
                assert_eq!(body["name"], "/db/todos-rw");
                Json(json!({ "user": "v-todos-8f2a", "password": "s3cr3t" }))
            }),
        );
        let addr = serve(app).await;

        let cred = client_for(addr)
            .fetch_dynamic_secret(&BearerToken::new("t-abc"))
            .await
            .unwrap();
        assert_eq!(cred.username(), "v-todos-8f2a");
        assert_eq!(cred.password(), "s3cr3t");
    }

    #[tokio::test]
    async fn rejected_token_is_secret_fetch_error() {
        let app = Router::new().route(
            "/get-dynamic-secret-value",
            post(|| async { (StatusCode::UNAUTHORIZED, "token expired") }),
        );
        let addr = serve(app).await;

        let err = client_for(addr)
            .fetch_dynamic_secret(&BearerToken::new("t-stale"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(matches!(err, BrokerError::SecretFetch(_)));
    }
}
