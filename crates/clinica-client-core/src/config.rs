use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const ENV_API_BASE_URL: &str = "CLINICA_API_BASE_URL";
pub const ENV_API_TIMEOUT_MS: &str = "CLINICA_API_TIMEOUT_MS";
pub const ENV_API_RETRY_ATTEMPTS: &str = "CLINICA_API_RETRY_ATTEMPTS";
pub const ENV_API_RETRY_DELAY_MS: &str = "CLINICA_API_RETRY_DELAY_MS";

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_USER_TIMEOUT_MS: u64 = 35_000;
pub const DEFAULT_LOGIN_ROUTE: &str = "login.html";
pub const DEFAULT_DENIAL_REDIRECT_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
    #[error("invalid {key}: {value}")]
    InvalidNumber { key: String, value: String },
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeatInterval,
    #[error("user timeout {timeout_ms}ms must exceed twice the heartbeat interval {interval_ms}ms")]
    PresenceWindowTooShort { interval_ms: u64, timeout_ms: u64 },
    #[error("invalid config file: {0}")]
    Parse(String),
}

/// Connection settings for the records backend.
///
/// Config files may use either the snake_case names or the uppercase keys
/// (`BASE_URL`, `TIMEOUT`, `RETRY_ATTEMPTS`, `RETRY_DELAY`) of the web frontend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    #[serde(alias = "BASE_URL")]
    pub base_url: String,
    #[serde(alias = "TIMEOUT")]
    pub timeout_ms: u64,
    #[serde(alias = "RETRY_ATTEMPTS")]
    pub retry_attempts: u32,
    #[serde(alias = "RETRY_DELAY")]
    pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Normalizes the base url and clamps the attempt count to at least one.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.base_url = normalize_base_url(&self.base_url)?;
        self.retry_attempts = self.retry_attempts.max(1);
        Ok(self)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(base_url) = env_non_empty(ENV_API_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(timeout_ms) = env_number::<u64>(ENV_API_TIMEOUT_MS)? {
            self.timeout_ms = timeout_ms;
        }
        if let Some(attempts) = env_number::<u32>(ENV_API_RETRY_ATTEMPTS)? {
            self.retry_attempts = attempts;
        }
        if let Some(delay_ms) = env_number::<u64>(ENV_API_RETRY_DELAY_MS)? {
            self.retry_delay_ms = delay_ms;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub heartbeat_interval_ms: u64,
    pub user_timeout_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            user_timeout_ms: DEFAULT_USER_TIMEOUT_MS,
        }
    }
}

impl PresenceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn user_timeout(&self) -> Duration {
        Duration::from_millis(self.user_timeout_ms)
    }

    /// A user must survive one missed heartbeat before being pruned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        if self.user_timeout_ms <= self.heartbeat_interval_ms.saturating_mul(2) {
            return Err(ConfigError::PresenceWindowTooShort {
                interval_ms: self.heartbeat_interval_ms,
                timeout_ms: self.user_timeout_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub login_route: String,
    pub denial_redirect_delay_ms: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            denial_redirect_delay_ms: DEFAULT_DENIAL_REDIRECT_DELAY_MS,
        }
    }
}

impl AccessConfig {
    pub fn denial_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.denial_redirect_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub presence: PresenceConfig,
    pub access: AccessConfig,
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|error| ConfigError::Parse(error.to_string()))?;
        config.validated()
    }

    /// Defaults overlaid with `CLINICA_API_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.api.apply_env_overrides()?;
        config.validated()
    }

    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.api = self.api.validated()?;
        self.presence.validate()?;
        Ok(self)
    }
}

pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    let Some((scheme, remainder)) = trimmed.split_once("://") else {
        return Err(ConfigError::InvalidBaseUrl);
    };
    if !matches!(scheme, "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl);
    }
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(ConfigError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let Some(raw) = env_non_empty(key) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const ALL_KEYS: [&str; 4] = [
        ENV_API_BASE_URL,
        ENV_API_TIMEOUT_MS,
        ENV_API_RETRY_ATTEMPTS,
        ENV_API_RETRY_DELAY_MS,
    ];

    fn with_env<T>(overrides: &[(&str, &str)], test: impl FnOnce() -> T) -> T {
        let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = ALL_KEYS
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect::<Vec<_>>();

        for key in ALL_KEYS {
            unsafe { std::env::remove_var(key) };
        }
        for (key, value) in overrides {
            unsafe { std::env::set_var(key, value) };
        }

        let result = test();

        for (key, value) in previous {
            if let Some(value) = value {
                unsafe { std::env::set_var(key, value) };
            } else {
                unsafe { std::env::remove_var(key) };
            }
        }

        result
    }

    #[test]
    fn defaults_match_frontend_constants() {
        let config = ApiConfig::default();
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(PresenceConfig::default().validate(), Ok(()));
    }

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        let normalized = normalize_base_url(" http://192.168.49.2:30800/ ").expect("valid url");
        assert_eq!(normalized, "http://192.168.49.2:30800");
    }

    #[test]
    fn normalize_base_url_rejects_missing_scheme_or_host() {
        assert_eq!(
            normalize_base_url("localhost:8000"),
            Err(ConfigError::InvalidBaseUrl)
        );
        assert_eq!(
            normalize_base_url("ftp://files.example.com"),
            Err(ConfigError::InvalidBaseUrl)
        );
        assert_eq!(normalize_base_url("https:///pacientes"), Err(ConfigError::InvalidBaseUrl));
        assert_eq!(normalize_base_url("  "), Err(ConfigError::EmptyBaseUrl));
    }

    #[test]
    fn toml_accepts_frontend_uppercase_keys() {
        let config = ClientConfig::from_toml_str(
            r#"
            [api]
            BASE_URL = "http://192.168.49.2:30800/"
            TIMEOUT = 5000
            RETRY_ATTEMPTS = 0
            RETRY_DELAY = 250

            [access]
            login_route = "/ingreso"
            "#,
        )
        .expect("config parses");

        assert_eq!(config.api.base_url, "http://192.168.49.2:30800");
        assert_eq!(config.api.timeout_ms, 5_000);
        assert_eq!(config.api.retry_attempts, 1);
        assert_eq!(config.api.retry_delay_ms, 250);
        assert_eq!(config.access.login_route, "/ingreso");
        assert_eq!(config.presence, PresenceConfig::default());
    }

    #[test]
    fn toml_rejects_presence_window_shorter_than_two_heartbeats() {
        let error = ClientConfig::from_toml_str(
            r"
            [presence]
            heartbeat_interval_ms = 15000
            user_timeout_ms = 30000
            ",
        )
        .expect_err("window too short");
        assert_eq!(
            error,
            ConfigError::PresenceWindowTooShort {
                interval_ms: 15_000,
                timeout_ms: 30_000,
            }
        );
    }

    #[test]
    fn from_env_defaults_local() {
        with_env(&[], || {
            let config = ClientConfig::from_env().expect("default config");
            assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
            assert_eq!(config.api.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        });
    }

    #[test]
    fn from_env_applies_overrides() {
        with_env(
            &[
                (ENV_API_BASE_URL, "https://api.clinica.example/"),
                (ENV_API_TIMEOUT_MS, "1500"),
                (ENV_API_RETRY_ATTEMPTS, "5"),
                (ENV_API_RETRY_DELAY_MS, "20"),
            ],
            || {
                let config = ClientConfig::from_env().expect("env config");
                assert_eq!(config.api.base_url, "https://api.clinica.example");
                assert_eq!(config.api.timeout(), Duration::from_millis(1_500));
                assert_eq!(config.api.retry_attempts, 5);
                assert_eq!(config.api.retry_delay_ms, 20);
            },
        );
    }

    #[test]
    fn from_env_rejects_non_numeric_timeout() {
        with_env(&[(ENV_API_TIMEOUT_MS, "soon")], || {
            let error = ClientConfig::from_env().expect_err("invalid timeout");
            assert_eq!(
                error,
                ConfigError::InvalidNumber {
                    key: ENV_API_TIMEOUT_MS.to_string(),
                    value: "soon".to_string(),
                }
            );
        });
    }
}
