//! Mock broker binary for local development.
//!
//! Run it next to a database whose users match the issued `v-mock-N`
//! names, point `GATEWAY_API_URL` at it, and the pool will rotate through
//! those users.

use mock_broker::{MockBroker, MockBrokerSettings};
use tracing::info;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let defaults = MockBrokerSettings::default();
    let var = |key: &str, default: String| std::env::var(key).unwrap_or(default);

    let settings = MockBrokerSettings {
        access_id: var("AUTH_METHOD_ID", defaults.access_id),
        auth_config_name: var("AUTH_CONFIG_NAME", defaults.auth_config_name),
        identity_token: var("IDENTITY_TOKEN", defaults.identity_token),
        secret_name: var("DYNAMIC_SECRET_NAME", defaults.secret_name),
        user_prefix: var("MOCK_USER_PREFIX", defaults.user_prefix),
    };
    let port: u16 = std::env::var("MOCK_BROKER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8081);

    info!(
        access_id = %settings.access_id,
        secret = %settings.secret_name,
        "mock broker configured"
    );

    let app = MockBroker::new(settings).router();
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(address = %addr, "mock broker listening");
    axum::serve(listener, app).await
}
