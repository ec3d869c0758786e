use axum::http::StatusCode;
use dynpool_broker::{
    Broker, BrokerConfig, BrokerError, CredentialSource, IdentityTokenSource,
};
use mock_broker::{MockBroker, MockBrokerSettings};

async fn broker_against_mock(identity: &str) -> (MockBroker, Broker) {
    let mock = MockBroker::new(MockBrokerSettings::default());
    let addr = mock.spawn().await.unwrap();
    let settings = mock.settings().clone();

    let config = BrokerConfig::new(
        format!("http://{addr}"),
        "http://gateway.local:8000",
        settings.access_id,
        settings.auth_config_name,
        settings.secret_name,
    );
    let broker = Broker::new(config, IdentityTokenSource::literal(identity));
    (mock, broker)
}

#[tokio::test]
async fn full_exchange_yields_credential() {
    let (mock, broker) = broker_against_mock("mock-identity-token").await;

    let credential = broker.fetch_credential().await.unwrap();
    assert_eq!(credential.username(), "v-mock-1");
    assert!(!credential.password().is_empty());

    assert_eq!(mock.auth_calls().await, 1);
    assert_eq!(mock.secret_calls().await, 1);
}

#[tokio::test]
async fn every_fetch_is_a_fresh_round_trip() {
    let (mock, broker) = broker_against_mock("mock-identity-token").await;

    let first = broker.fetch_credential().await.unwrap();
    let second = broker.fetch_credential().await.unwrap();
    assert_ne!(first.username(), second.username());
    assert_eq!(mock.auth_calls().await, 2);
}

#[tokio::test]
async fn rejected_identity_stops_before_secret_call() {
    let (mock, broker) = broker_against_mock("forged-identity").await;

    let err = broker.fetch_credential().await.unwrap_err();
    assert!(matches!(err, BrokerError::Auth(_)));
    assert_eq!(err.status(), Some(401));
    assert_eq!(mock.secret_calls().await, 0);
}

#[tokio::test]
async fn broker_outage_surfaces_as_auth_error() {
    let (mock, broker) = broker_against_mock("mock-identity-token").await;
    mock.fail_auth_with(Some(StatusCode::INTERNAL_SERVER_ERROR))
        .await;

    let err = broker.fetch_credential().await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().starts_with("authentication failed"));
}

#[tokio::test]
async fn errors_never_contain_the_identity_token() {
    let (_mock, broker) = broker_against_mock("forged-identity").await;

    let err = broker.fetch_credential().await.unwrap_err();
    let rendered = format!("{err} {err:?}");
    assert!(!rendered.contains("forged-identity"));
}
