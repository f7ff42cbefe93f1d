//! Client configuration loaded from TOML with environment overrides.
//!
//! # Example TOML
//!
//! ```toml
//! api_base_url = "https://inspections.example.com/api"
//! detection_base_url = "http://10.0.0.12:8000"
//! request_timeout_ms = 30000
//! credentials_dir = "/var/lib/fieldsync"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Environment variable overriding [`ClientConfig::api_base_url`].
pub const ENV_API_URL: &str = "FIELDSYNC_API_URL";
/// Environment variable overriding [`ClientConfig::detection_base_url`].
pub const ENV_DETECTION_URL: &str = "FIELDSYNC_DETECTION_URL";
/// Environment variable overriding [`ClientConfig::request_timeout_ms`].
pub const ENV_TIMEOUT_MS: &str = "FIELDSYNC_TIMEOUT_MS";
/// Environment variable overriding [`ClientConfig::credentials_dir`].
pub const ENV_CREDENTIALS_DIR: &str = "FIELDSYNC_CREDENTIALS_DIR";

/// Settings shared by every client built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the inspection REST backend (including any `/api` prefix).
    pub api_base_url: Url,

    /// Base URL of the image-detection service.
    pub detection_base_url: Url,

    /// Per-request timeout for backend calls, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Per-request timeout for detection uploads, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub detection_timeout_ms: u64,

    /// Directory holding the persisted session entries.
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,

    /// `User-Agent` sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Path prefixes that are never signed with the session token.
    #[serde(default = "default_auth_paths")]
    pub auth_paths: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_credentials_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("fieldsync")
}

fn default_user_agent() -> String {
    format!("fieldsync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_auth_paths() -> Vec<String> {
    vec!["/auth/".to_string()]
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the URLs.
    pub fn new(api_base_url: Url, detection_base_url: Url) -> Self {
        Self {
            api_base_url,
            detection_base_url,
            request_timeout_ms: default_timeout_ms(),
            detection_timeout_ms: default_timeout_ms(),
            credentials_dir: default_credentials_dir(),
            user_agent: default_user_agent(),
            auth_paths: default_auth_paths(),
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::config(format!("failed to parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `FIELDSYNC_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (used by tests).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_API_URL) {
            self.api_base_url = parse_url(ENV_API_URL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DETECTION_URL) {
            self.detection_base_url = parse_url(ENV_DETECTION_URL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.request_timeout_ms = raw
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{ENV_TIMEOUT_MS} must be an integer")))?;
        }
        if let Some(raw) = lookup(ENV_CREDENTIALS_DIR) {
            self.credentials_dir = PathBuf::from(raw);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check URL schemes and timeouts.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("api_base_url", &self.api_base_url),
            ("detection_base_url", &self.detection_base_url),
        ] {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::config(format!(
                    "{name} must use http or https, got '{}'",
                    url.scheme()
                )));
            }
        }
        if self.request_timeout_ms == 0 || self.detection_timeout_ms == 0 {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        Ok(())
    }

    /// Backend request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Detection upload timeout.
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| Error::config(format!("{key} is not a valid URL: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
        api_base_url = "https://inspections.example.com/api"
        detection_base_url = "http://10.0.0.12:8000"
        request_timeout_ms = 15000
    "#;

    #[test]
    fn parses_toml_with_defaults() {
        let config = ClientConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.api_base_url.as_str(), "https://inspections.example.com/api");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.detection_timeout(), Duration::from_secs(30));
        assert_eq!(config.auth_paths, vec!["/auth/".to_string()]);
        assert!(config.user_agent.starts_with("fieldsync/"));
    }

    #[test]
    fn rejects_invalid_toml() {
        let err = ClientConfig::from_toml_str("api_base_url = 3").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let text = SAMPLE.replace("https://inspections", "ftp://inspections");
        let err = ClientConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("api_base_url"));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            (ENV_API_URL, "http://localhost:3000/api"),
            (ENV_TIMEOUT_MS, "5000"),
            (ENV_CREDENTIALS_DIR, "/tmp/fieldsync-test"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_toml_str(SAMPLE)
            .unwrap()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_base_url.as_str(), "http://localhost:3000/api");
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.credentials_dir, PathBuf::from("/tmp/fieldsync-test"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ClientConfig::from_toml_str(SAMPLE)
            .unwrap()
            .with_overrides(|k| (k == ENV_TIMEOUT_MS).then(|| "0".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
