use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::time::Duration;

const MAINNET_WS_URL: &str = "wss://stream.binance.com:9443";
const TESTNET_WS_URL: &str = "wss://testnet.binance.vision";
const MAINNET_REST_URL: &str = "https://api.binance.com";
const TESTNET_REST_URL: &str = "https://testnet.binance.vision";

/// Binance drops a connection that has not answered a ping for one minute.
pub const DEFAULT_PONG_DEADLINE: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub api_key: Secret<String>,
    pub testnet: bool,
    pub ws_base_url: Option<String>,
    pub rest_base_url: Option<String>,
    /// Capacity of every update channel. 1 keeps the hand-off as close to
    /// unbuffered as a tokio channel allows.
    pub channel_capacity: usize,
    pub pong_deadline: Duration,
    pub connect_timeout: Duration,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for StreamConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("StreamConfig", 7)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("testnet", &self.testnet)?;
        state.serialize_field("ws_base_url", &self.ws_base_url)?;
        state.serialize_field("rest_base_url", &self.rest_base_url)?;
        state.serialize_field("channel_capacity", &self.channel_capacity)?;
        state.serialize_field("pong_deadline_ms", &duration_millis(self.pong_deadline))?;
        state.serialize_field("connect_timeout_ms", &duration_millis(self.connect_timeout))?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for StreamConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct StreamConfigHelper {
            #[serde(default)]
            api_key: String,
            #[serde(default)]
            testnet: bool,
            ws_base_url: Option<String>,
            rest_base_url: Option<String>,
            channel_capacity: Option<usize>,
            pong_deadline_ms: Option<u64>,
            connect_timeout_ms: Option<u64>,
        }

        let helper = StreamConfigHelper::deserialize(deserializer)?;
        let capacity = helper.channel_capacity.unwrap_or(1);
        if capacity == 0 {
            return Err(serde::de::Error::custom("channel_capacity must be at least 1"));
        }

        Ok(Self {
            api_key: Secret::new(helper.api_key),
            testnet: helper.testnet,
            ws_base_url: helper.ws_base_url,
            rest_base_url: helper.rest_base_url,
            channel_capacity: capacity,
            pong_deadline: helper
                .pong_deadline_ms
                .map_or(DEFAULT_PONG_DEADLINE, Duration::from_millis),
            connect_timeout: helper
                .connect_timeout_ms
                .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis),
        })
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl StreamConfig {
    /// Create a configuration carrying the API key used for listen keys
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            ..Self::read_only()
        }
    }

    /// Configuration for public market data streams, no API key required
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            api_key: Secret::new(String::new()),
            testnet: false,
            ws_base_url: None,
            rest_base_url: None,
            channel_capacity: 1,
            pong_deadline: DEFAULT_PONG_DEADLINE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY` (e.g., `BINANCE_API_KEY`)
    /// - `{PREFIX}_TESTNET` (optional, defaults to false)
    /// - `{PREFIX}_WS_URL` (optional)
    /// - `{PREFIX}_REST_URL` (optional)
    /// - `{PREFIX}_CHANNEL_CAPACITY` (optional, defaults to 1)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;

        let testnet = env::var(format!("{}_TESTNET", prefix))
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let channel_capacity = match env::var(format!("{}_CHANNEL_CAPACITY", prefix)) {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(ConfigError::InvalidConfiguration(format!(
                        "{}_CHANNEL_CAPACITY must be a positive integer, got '{}'",
                        prefix, raw
                    )))
                }
            },
            Err(_) => 1,
        };

        Ok(Self {
            api_key: Secret::new(api_key),
            testnet,
            ws_base_url: env::var(format!("{}_WS_URL", prefix)).ok(),
            rest_base_url: env::var(format!("{}_REST_URL", prefix)).ok(),
            channel_capacity,
            ..Self::read_only()
        })
    }

    /// Load a `.env` file (if present) and then read the environment
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // no file, fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }

    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    #[must_use]
    pub fn ws_base_url(mut self, url: String) -> Self {
        self.ws_base_url = Some(url);
        self
    }

    #[must_use]
    pub fn rest_base_url(mut self, url: String) -> Self {
        self.rest_base_url = Some(url);
        self
    }

    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Websocket base URL, honouring overrides and testnet mode
    pub fn resolved_ws_url(&self) -> String {
        if let Some(url) = &self.ws_base_url {
            return url.clone();
        }
        let url = if self.testnet { TESTNET_WS_URL } else { MAINNET_WS_URL };
        url.to_string()
    }

    /// REST base URL used for listen key management
    pub fn resolved_rest_url(&self) -> String {
        if let Some(url) = &self.rest_base_url {
            return url.clone();
        }
        let url = if self.testnet { TESTNET_REST_URL } else { MAINNET_REST_URL };
        url.to_string()
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::read_only()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_redacts_api_key() {
        let config = StreamConfig::new("super-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: StreamConfig = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert_eq!(config.api_key(), "k");
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.pong_deadline, DEFAULT_PONG_DEADLINE);
        assert!(!config.testnet);
    }

    #[test]
    fn test_deserialize_rejects_zero_capacity() {
        let result = serde_json::from_str::<StreamConfig>(r#"{"channel_capacity":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolved_urls() {
        let config = StreamConfig::read_only();
        assert_eq!(config.resolved_ws_url(), MAINNET_WS_URL);
        assert_eq!(config.resolved_rest_url(), MAINNET_REST_URL);

        let config = config.testnet(true);
        assert_eq!(config.resolved_ws_url(), TESTNET_WS_URL);
        assert_eq!(config.resolved_rest_url(), TESTNET_REST_URL);

        let config = config.ws_base_url("ws://localhost:9844".to_string());
        assert_eq!(config.resolved_ws_url(), "ws://localhost:9844");
    }

    #[test]
    fn test_from_env() {
        env::set_var("BWS_TEST_API_KEY", "env-key");
        env::set_var("BWS_TEST_TESTNET", "true");
        env::set_var("BWS_TEST_CHANNEL_CAPACITY", "16");

        let config = StreamConfig::from_env("bws_test").unwrap();
        assert_eq!(config.api_key(), "env-key");
        assert!(config.testnet);
        assert_eq!(config.channel_capacity, 16);
        assert!(config.has_credentials());
    }

    #[test]
    fn test_from_env_missing_key() {
        let err = StreamConfig::from_env("BWS_ABSENT_PREFIX").unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnvironmentVariable("BWS_ABSENT_PREFIX_API_KEY".to_string())
        );
    }

    #[test]
    fn test_from_env_bad_capacity() {
        env::set_var("BWS_BAD_API_KEY", "k");
        env::set_var("BWS_BAD_CHANNEL_CAPACITY", "zero");
        let err = StreamConfig::from_env("BWS_BAD").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfiguration(_)));
    }
}
