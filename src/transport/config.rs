//! Transport configuration.

use crate::error::{ClientError, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Function producing the `connection_init` payload, called once per handshake.
pub type ConnectionParamsProvider = Arc<dyn Fn() -> Result<Option<Value>> + Send + Sync>;

/// Payload sent with `connection_init`.
#[derive(Clone)]
pub enum ConnectionParams {
    Static(Value),
    Provider(ConnectionParamsProvider),
}

impl ConnectionParams {
    pub fn provider(f: impl Fn() -> Result<Option<Value>> + Send + Sync + 'static) -> Self {
        ConnectionParams::Provider(Arc::new(f))
    }

    /// Produce the payload for the current handshake.
    pub fn resolve(&self) -> Result<Option<Value>> {
        match self {
            ConnectionParams::Static(value) => Ok(Some(value.clone())),
            ConnectionParams::Provider(provider) => provider(),
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionParams::Static(value) => f.debug_tuple("Static").field(value).finish(),
            ConnectionParams::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Configuration for a [`SubscriptionTransport`](super::SubscriptionTransport).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Endpoint URL. Required.
    pub url: String,

    /// Max wait for `connection_ack` after opening.
    /// Default: 5000 ms
    pub connection_timeout: Duration,

    /// Reconnect cycles before giving up.
    /// Default: 5
    pub max_reconnect_attempts: u32,

    /// Base delay before the first reconnect.
    /// Default: 1000 ms
    pub reconnect_delay: Duration,

    /// Growth factor applied per reconnect attempt (must be >= 1).
    /// Default: 1.5
    pub backoff_multiplier: f64,

    /// Send periodic pings while connected.
    /// Default: true
    pub keep_alive: bool,

    /// Interval between keepalive pings.
    /// Default: 30 s
    pub keep_alive_interval: Duration,

    /// Defer connecting until the first subscription, and close once the
    /// last one is unsubscribed.
    /// Default: false
    pub lazy: bool,

    /// Payload for `connection_init` (None = no payload).
    pub connection_params: Option<ConnectionParams>,

    /// Capacity of each subscription's event channel.
    /// Default: 256
    pub event_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connection_timeout: Duration::from_millis(5000),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.5,
            keep_alive: true,
            keep_alive_interval: Duration::from_secs(30),
            lazy: false,
            connection_params: None,
            event_buffer_size: 256,
        }
    }
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ClientError::Config("url is required".to_string()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ClientError::Config(format!(
                "backoff_multiplier must be a finite value >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.keep_alive && self.keep_alive_interval.is_zero() {
            return Err(ClientError::Config(
                "keep_alive_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before reconnect attempt `attempt` (0-based):
    /// `reconnect_delay * backoff_multiplier^attempt`, saturating.
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(attempt.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(self.reconnect_delay.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::new("ws://localhost/graphql");
        assert_eq!(config.connection_timeout, Duration::from_millis(5000));
        assert!(config.keep_alive);
        assert!(!config.lazy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_url() {
        let result = TransportConfig::default().validate();
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let config = TransportConfig {
            backoff_multiplier: 0.5,
            ..TransportConfig::new("ws://x")
        };
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let config = TransportConfig {
            backoff_multiplier: f64::NAN,
            ..TransportConfig::new("ws://x")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_delay_growth() {
        let config = TransportConfig {
            reconnect_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            ..TransportConfig::new("ws://x")
        };
        assert_eq!(config.reconnect_delay_for(0), Duration::from_millis(100));
        assert_eq!(config.reconnect_delay_for(1), Duration::from_millis(200));
        assert_eq!(config.reconnect_delay_for(3), Duration::from_millis(800));
        assert_eq!(config.reconnect_delay_for(10_000), Duration::MAX);
    }

    #[test]
    fn test_connection_params_resolve() {
        let fixed = ConnectionParams::Static(json!({"token": "abc"}));
        assert_eq!(fixed.resolve().unwrap(), Some(json!({"token": "abc"})));

        let failing = ConnectionParams::provider(|| {
            Err(ClientError::Connection("token refresh failed".to_string()))
        });
        assert!(failing.resolve().is_err());
        assert_eq!(format!("{:?}", failing), "Provider(..)");
    }
}
