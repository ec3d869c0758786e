//! Local stand-in for the dynamic-secret broker.
//!
//! Serves the two endpoints the pool depends on:
//!
//! * `POST /auth`: checks the access id, auth config name and base64
//!   identity token, then issues a one-shot bearer token.
//! * `POST /get-dynamic-secret-value`: consumes a bearer token and issues a
//!   new `user`/`password` pair, with a fresh username each time.
//!
//! Failures can be injected and calls are counted, so tests can assert how
//! many round trips a pool performed.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Static expectations of the mock.
#[derive(Debug, Clone)]
pub struct MockBrokerSettings {
    /// Access id the auth request must carry.
    pub access_id: String,
    /// Auth config name the auth request must carry.
    pub auth_config_name: String,
    /// Raw (not base64) identity token the auth request must carry.
    pub identity_token: String,
    /// Name of the only dynamic secret served.
    pub secret_name: String,
    /// Prefix of issued usernames; a counter is appended.
    pub user_prefix: String,
}

impl Default for MockBrokerSettings {
    fn default() -> Self {
        Self {
            access_id: "p-mock".to_string(),
            auth_config_name: "mock-k8s".to_string(),
            identity_token: "mock-identity-token".to_string(),
            secret_name: "/db/mock".to_string(),
            user_prefix: "v-mock-".to_string(),
        }
    }
}

#[derive(Default)]
struct BrokerState {
    live_tokens: HashSet<String>,
    issued_users: Vec<String>,
    auth_calls: u64,
    secret_calls: u64,
    fail_auth: Option<StatusCode>,
}

/// Shared handle on a running (or routable) mock broker.
#[derive(Clone)]
pub struct MockBroker {
    settings: Arc<MockBrokerSettings>,
    state: Arc<Mutex<BrokerState>>,
}

type Rejection = (StatusCode, Json<Value>);

fn reject(status: StatusCode, message: &str) -> Rejection {
    (status, Json(json!({ "error": message })))
}

impl MockBroker {
    /// Create a mock with the given expectations.
    pub fn new(settings: MockBrokerSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(BrokerState::default())),
        }
    }

    /// The expectations this mock enforces.
    pub fn settings(&self) -> &MockBrokerSettings {
        &self.settings
    }

    /// Axum router serving both endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/auth", post(auth))
            .route("/get-dynamic-secret-value", post(dynamic_secret))
            .with_state(self.clone())
    }

    /// Serve on an ephemeral localhost port and return its address.
    pub async fn spawn(&self) -> std::io::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "mock broker stopped");
            }
        });
        Ok(addr)
    }

    /// Make every subsequent auth call fail with `status` (or stop failing).
    pub async fn fail_auth_with(&self, status: Option<StatusCode>) {
        self.state.lock().await.fail_auth = status;
    }

    /// Number of `POST /auth` requests received.
    pub async fn auth_calls(&self) -> u64 {
        self.state.lock().await.auth_calls
    }

    /// Number of `POST /get-dynamic-secret-value` requests received.
    pub async fn secret_calls(&self) -> u64 {
        self.state.lock().await.secret_calls
    }

    /// Usernames issued so far, oldest first.
    pub async fn issued_users(&self) -> Vec<String> {
        self.state.lock().await.issued_users.clone()
    }
}

/// `POST /auth`: identity token → bearer token.
async fn auth(
    State(broker): State<MockBroker>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Rejection> {
    let settings = &broker.settings;
    let mut state = broker.state.lock().await;
    state.auth_calls += 1;

    if let Some(status) = state.fail_auth {
        return Err(reject(status, "injected failure"));
    }

    let access_type = body["access-type"]
        .as_str()
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "missing access-type"))?;

    if body["access-id"].as_str() != Some(settings.access_id.as_str()) {
        return Err(reject(StatusCode::UNAUTHORIZED, "unknown access id"));
    }
    if body[format!("{access_type}-auth-config-name")].as_str()
        != Some(settings.auth_config_name.as_str())
    {
        return Err(reject(StatusCode::UNAUTHORIZED, "unknown auth config"));
    }

    let presented = body[format!("{access_type}-service-account-token")]
        .as_str()
        .and_then(|b64| STANDARD.decode(b64).ok())
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "identity token is not base64"))?;
    if presented != settings.identity_token.as_bytes() {
        return Err(reject(StatusCode::UNAUTHORIZED, "identity token rejected"));
    }

    let token = format!("t-{}", uuid::Uuid::new_v4().simple());
    state.live_tokens.insert(token.clone());
    info!(auth_calls = state.auth_calls, "bearer token issued");

    Ok(Json(json!({ "token": token })))
}

/// `POST /get-dynamic-secret-value`: bearer token → username/password.
async fn dynamic_secret(
    State(broker): State<MockBroker>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Rejection> {
    let settings = &broker.settings;
    let mut state = broker.state.lock().await;
    state.secret_calls += 1;

    let token = body["token"].as_str().unwrap_or_default();
    if !state.live_tokens.remove(token) {
        return Err(reject(StatusCode::UNAUTHORIZED, "invalid or reused token"));
    }
    if body["name"].as_str() != Some(settings.secret_name.as_str()) {
        return Err(reject(StatusCode::NOT_FOUND, "no such dynamic secret"));
    }

    let user = format!("{}{}", settings.user_prefix, state.issued_users.len() + 1);
    state.issued_users.push(user.clone());
    info!(issued = state.issued_users.len(), "dynamic secret issued");

    Ok(Json(json!({
        "user": user,
        "password": uuid::Uuid::new_v4().simple().to_string(),
        "ttl_in_minutes": "1",
    })))
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;

    use super::*;

    fn auth_body(settings: &MockBrokerSettings) -> Value {
        json!({
            "access-type": "k8s",
            "access-id": settings.access_id,
            "gateway-url": "http://gateway",
            "k8s-auth-config-name": settings.auth_config_name,
            "k8s-service-account-token": STANDARD.encode(&settings.identity_token),
            "json": true,
        })
    }

    fn server() -> (MockBroker, TestServer) {
        let broker = MockBroker::new(MockBrokerSettings::default());
        let server = TestServer::new(broker.router()).unwrap();
        (broker, server)
    }

    #[tokio::test]
    async fn auth_then_secret_issues_rotating_users() {
        let (broker, server) = server();
        let settings = broker.settings().clone();

        for expected in ["v-mock-1", "v-mock-2"] {
            let token: Value = server.post("/auth").json(&auth_body(&settings)).await.json();
            let secret: Value = server
                .post("/get-dynamic-secret-value")
                .json(&json!({
                    "json": true,
                    "timeout": 15,
                    "name": settings.secret_name,
                    "token": token["token"],
                }))
                .await
                .json();
            assert_eq!(secret["user"], expected);
            assert!(secret["password"].as_str().is_some());
        }

        assert_eq!(broker.auth_calls().await, 2);
        assert_eq!(broker.secret_calls().await, 2);
    }

    #[tokio::test]
    async fn wrong_identity_token_is_unauthorized() {
        let (broker, server) = server();
        let mut body = auth_body(broker.settings());
        body["k8s-service-account-token"] = json!(STANDARD.encode("someone-else"));

        let res = server.post("/auth").json(&body).await;
        res.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bearer_tokens_are_single_use() {
        let (broker, server) = server();
        let settings = broker.settings().clone();
        let token: Value = server.post("/auth").json(&auth_body(&settings)).await.json();
        let request = json!({ "name": settings.secret_name, "token": token["token"] });

        server
            .post("/get-dynamic-secret-value")
            .json(&request)
            .await
            .assert_status_ok();
        server
            .post("/get-dynamic-secret-value")
            .json(&request)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn injected_auth_failure() {
        let (broker, server) = server();
        broker
            .fail_auth_with(Some(StatusCode::INTERNAL_SERVER_ERROR))
            .await;

        let res = server.post("/auth").json(&auth_body(broker.settings())).await;
        res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broker.auth_calls().await, 1);
    }

    #[tokio::test]
    async fn unknown_secret_name_is_not_found() {
        let (broker, server) = server();
        let token: Value = server
            .post("/auth")
            .json(&auth_body(broker.settings()))
            .await
            .json();

        let res = server
            .post("/get-dynamic-secret-value")
            .json(&json!({ "name": "/db/other", "token": token["token"] }))
            .await;
        res.assert_status(StatusCode::NOT_FOUND);
    }
}
