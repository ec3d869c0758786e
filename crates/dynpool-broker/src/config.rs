//! Broker client configuration.
//!
//! Built from environment variables at startup (see [`BrokerConfig::from_env`])
//! or assembled directly in tests with [`BrokerConfig::new`].

use std::time::Duration;

use crate::error::BrokerError;

/// Identity method tag used when none is configured.
pub const DEFAULT_ACCESS_TYPE: &str = "k8s";

/// Default `timeout` sent with every secret request.
pub const DEFAULT_SECRET_TIMEOUT: Duration = Duration::from_secs(15);

/// Static parameters of the two broker exchanges.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Base URL of the broker API (e.g. `https://gw.example.com:8081`).
    pub api_url: String,
    /// Gateway URL sent inside the auth payload.
    pub gateway_url: String,
    /// Identity method tag (`access-type`); also prefixes payload field names.
    pub access_type: String,
    /// Access id of the workload auth method.
    pub access_id: String,
    /// Name of the workload auth config on the gateway.
    pub auth_config_name: String,
    /// Name of the dynamic database secret.
    pub dynamic_secret_name: String,
    /// Broker-side timeout for producing the secret; also bounds the HTTP call.
    pub secret_timeout: Duration,
}

impl BrokerConfig {
    /// Create a configuration with the default access type and secret timeout.
    pub fn new(
        api_url: impl Into<String>,
        gateway_url: impl Into<String>,
        access_id: impl Into<String>,
        auth_config_name: impl Into<String>,
        dynamic_secret_name: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            gateway_url: gateway_url.into(),
            access_type: DEFAULT_ACCESS_TYPE.to_string(),
            access_id: access_id.into(),
            auth_config_name: auth_config_name.into(),
            dynamic_secret_name: dynamic_secret_name.into(),
            secret_timeout: DEFAULT_SECRET_TIMEOUT,
        }
    }

    /// Override the secret request timeout.
    #[must_use]
    pub fn with_secret_timeout(mut self, timeout: Duration) -> Self {
        self.secret_timeout = timeout;
        self
    }

    /// Override the identity method tag.
    #[must_use]
    pub fn with_access_type(mut self, access_type: impl Into<String>) -> Self {
        self.access_type = access_type.into();
        self
    }

    /// Build the configuration from environment variables.
    ///
    /// | Variable                 | Default | Description                          |
    /// |--------------------------|---------|--------------------------------------|
    /// | `AUTH_METHOD_ID`         | required| access id of the auth method         |
    /// | `GATEWAY_URL`            | required| gateway URL sent in the auth payload |
    /// | `GATEWAY_API_URL`        | required| base of the auth/secret endpoints    |
    /// | `AUTH_CONFIG_NAME`       | required| workload auth config name            |
    /// | `DYNAMIC_SECRET_NAME`    | required| dynamic secret identifier            |
    /// | `ACCESS_TYPE`            | `k8s`   | identity method tag                  |
    /// | `SECRET_REQUEST_TIMEOUT` | `15s`   | secret `timeout` and HTTP timeout    |
    pub fn from_env() -> Result<Self, BrokerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BrokerError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BrokerError::Config(format!("{key} must be set")))
        };

        let mut config = Self::new(
            required("GATEWAY_API_URL")?,
            required("GATEWAY_URL")?,
            required("AUTH_METHOD_ID")?,
            required("AUTH_CONFIG_NAME")?,
            required("DYNAMIC_SECRET_NAME")?,
        );

        if let Some(access_type) = lookup("ACCESS_TYPE").filter(|v| !v.is_empty()) {
            config.access_type = access_type;
        }
        if let Some(raw) = lookup("SECRET_REQUEST_TIMEOUT") {
            config.secret_timeout = parse_duration(&raw).ok_or_else(|| {
                BrokerError::Config(format!("SECRET_REQUEST_TIMEOUT: invalid duration {raw:?}"))
            })?;
        }

        Ok(config)
    }

    /// `POST` target of the identity exchange.
    pub fn auth_url(&self) -> String {
        format!("{}/auth", self.api_url)
    }

    /// `POST` target of the secret exchange.
    pub fn secret_url(&self) -> String {
        format!("{}/get-dynamic-secret-value", self.api_url)
    }
}

/// Parse a short duration such as `15s`, `500ms`, `2m` or a bare `15`
/// (seconds).
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(value)),
        "ms" => Some(Duration::from_millis(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("GATEWAY_API_URL", "https://gw.example.com:8081/"),
        ("GATEWAY_URL", "https://gw.example.com:8000"),
        ("AUTH_METHOD_ID", "p-abc123"),
        ("AUTH_CONFIG_NAME", "cluster-auth"),
        ("DYNAMIC_SECRET_NAME", "/db/todos-rw"),
    ];

    #[test]
    fn endpoints_derive_from_api_url() {
        let cfg = BrokerConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(cfg.auth_url(), "https://gw.example.com:8081/auth");
        assert_eq!(
            cfg.secret_url(),
            "https://gw.example.com:8081/get-dynamic-secret-value"
        );
    }

    #[test]
    fn defaults_apply() {
        let cfg = BrokerConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(cfg.access_type, "k8s");
        assert_eq!(cfg.secret_timeout, Duration::from_secs(15));
    }

    #[test]
    fn missing_required_variable() {
        let err = BrokerConfig::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, BrokerError::Config(ref m) if m.contains("GATEWAY_API_URL")));
    }

    #[test]
    fn overrides_are_read() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("ACCESS_TYPE", "gcp"));
        vars.push(("SECRET_REQUEST_TIMEOUT", "30s"));
        let cfg = BrokerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(cfg.access_type, "gcp");
        assert_eq!(cfg.secret_timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SECRET_REQUEST_TIMEOUT", "soon"));
        assert!(BrokerConfig::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("15s"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration(" 3s "), Some(Duration::from_secs(3)));
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("1h"), None);
        assert_eq!(parse_duration("-1s"), None);
    }
}
