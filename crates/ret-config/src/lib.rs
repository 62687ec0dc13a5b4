//! Multi-tier TOML configuration for RET.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use ret_sse::ReconnectConfig;
use ret_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default bound on a single connection attempt, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 6000;

/// Name of the settings file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolved configuration for the live-update feed.
#[derive(Debug, Clone)]
pub struct RetConfig {
    pub feed_url: String,
    pub auth_token: Option<String>,
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedSettings {
    pub url: Option<String>,
    pub auth_token: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

/// Reconnect backoff section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconnectSettings {
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub auth_token: Option<String>,
}

impl RetConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables (`RET_FEED_URL`, `RET_AUTH_TOKEN`)
    /// 3. Config file (~/.ret/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join(CONFIG_FILE_NAME));
        Self::resolve(overrides, settings, config_dir, |key| std::env::var(key).ok())
    }

    /// Path of the settings file this configuration was read from.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    fn resolve(
        overrides: CliOverrides,
        settings: SettingsFile,
        config_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Resolve feed URL: CLI > env > config file
        let feed_url = overrides
            .url
            .or_else(|| env("RET_FEED_URL"))
            .or(settings.feed.url)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: "feed.url (set RET_FEED_URL or add to ~/.ret/config.toml)".into(),
            })?;

        // Resolve auth token: CLI > env > config file > none
        let auth_token = overrides
            .auth_token
            .or_else(|| env("RET_AUTH_TOKEN"))
            .or(settings.feed.auth_token)
            .filter(|token| !token.is_empty());

        let connect_timeout_ms = settings
            .feed
            .connect_timeout_ms
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
        if connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "feed.connect_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        let reconnect = resolve_reconnect(settings.reconnect)?;

        Ok(RetConfig {
            feed_url,
            auth_token,
            connect_timeout_ms,
            reconnect,
            config_dir,
        })
    }
}

/// Merge the reconnect section over the defaults and validate the result.
fn resolve_reconnect(settings: ReconnectSettings) -> Result<ReconnectConfig, ConfigError> {
    let defaults = ReconnectConfig::default();
    let config = ReconnectConfig {
        initial_delay_ms: settings
            .initial_delay_ms
            .unwrap_or(defaults.initial_delay_ms),
        max_delay_ms: settings.max_delay_ms.unwrap_or(defaults.max_delay_ms),
        backoff_factor: settings.backoff_factor.unwrap_or(defaults.backoff_factor),
    };

    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        return Err(ConfigError::InvalidValue {
            key: "reconnect.backoff_factor".into(),
            message: format!("must be >= 1.0, got {}", config.backoff_factor),
        });
    }
    if config.max_delay_ms < config.initial_delay_ms {
        return Err(ConfigError::InvalidValue {
            key: "reconnect.max_delay_ms".into(),
            message: format!(
                "must be >= reconnect.initial_delay_ms ({})",
                config.initial_delay_ms
            ),
        });
    }

    Ok(config)
}

/// Get the RET config directory path (~/.ret/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RET_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ret")
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn settings_with_url(url: &str) -> SettingsFile {
        SettingsFile {
            feed: FeedSettings {
                url: Some(url.into()),
                ..FeedSettings::default()
            },
            ..SettingsFile::default()
        }
    }

    fn resolve(
        overrides: CliOverrides,
        settings: SettingsFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<RetConfig, ConfigError> {
        RetConfig::resolve(overrides, settings, PathBuf::from("/tmp/ret"), env)
    }

    #[test]
    fn test_config_file_in_config_dir() {
        let config = resolve(
            CliOverrides::default(),
            settings_with_url("http://feed.test/"),
            no_env,
        )
        .unwrap();
        assert_eq!(config.config_file(), PathBuf::from("/tmp/ret/config.toml"));
    }

    #[test]
    fn test_default_settings() {
        let settings = SettingsFile::default();
        assert!(settings.feed.url.is_none());
        assert!(settings.feed.auth_token.is_none());
    }

    #[test]
    fn test_settings_toml_parse() {
        let toml_str = r#"
[feed]
url = "https://developer-api.nest.com/"
auth_token = "c.abc123"
connect_timeout_ms = 10000

[reconnect]
initial_delay_ms = 500
max_delay_ms = 5000
backoff_factor = 1.5
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        assert_eq!(
            settings.feed.url.as_deref(),
            Some("https://developer-api.nest.com/")
        );
        assert_eq!(settings.feed.auth_token.as_deref(), Some("c.abc123"));
        assert_eq!(settings.feed.connect_timeout_ms, Some(10000));
        assert_eq!(settings.reconnect.initial_delay_ms, Some(500));
        assert_eq!(settings.reconnect.max_delay_ms, Some(5000));
        assert_eq!(settings.reconnect.backoff_factor, Some(1.5));
    }

    #[test]
    fn test_missing_reconnect_section_defaults() {
        let toml_str = r#"
[feed]
url = "https://feed.example.com/"
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        let config = resolve(CliOverrides::default(), settings, no_env).unwrap();
        assert_eq!(config.reconnect.initial_delay_ms, 1000);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_missing_url_is_error() {
        let err = resolve(CliOverrides::default(), SettingsFile::default(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }

    #[test]
    fn test_blank_url_is_missing() {
        let err = resolve(CliOverrides::default(), settings_with_url("  "), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let env = |key: &str| match key {
            "RET_FEED_URL" => Some("https://env.example.com/".to_string()),
            "RET_AUTH_TOKEN" => Some("env-token".to_string()),
            _ => None,
        };

        let config = resolve(
            CliOverrides::default(),
            settings_with_url("https://file.example.com/"),
            env,
        )
        .unwrap();
        assert_eq!(config.feed_url, "https://env.example.com/");
        assert_eq!(config.auth_token.as_deref(), Some("env-token"));

        let config = resolve(
            CliOverrides {
                url: Some("https://cli.example.com/".into()),
                auth_token: Some("cli-token".into()),
            },
            settings_with_url("https://file.example.com/"),
            env,
        )
        .unwrap();
        assert_eq!(config.feed_url, "https://cli.example.com/");
        assert_eq!(config.auth_token.as_deref(), Some("cli-token"));
    }

    #[test]
    fn test_empty_token_is_none() {
        let mut settings = settings_with_url("https://feed.example.com/");
        settings.feed.auth_token = Some(String::new());
        let config = resolve(CliOverrides::default(), settings, no_env).unwrap();
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_invalid_backoff_factor() {
        let mut settings = settings_with_url("https://feed.example.com/");
        settings.reconnect.backoff_factor = Some(0.5);
        let err = resolve(CliOverrides::default(), settings, no_env).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "reconnect.backoff_factor"),
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_max_delay_below_initial() {
        let mut settings = settings_with_url("https://feed.example.com/");
        settings.reconnect.initial_delay_ms = Some(5000);
        settings.reconnect.max_delay_ms = Some(1000);
        let err = resolve(CliOverrides::default(), settings, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_connect_timeout() {
        let mut settings = settings_with_url("https://feed.example.com/");
        settings.feed.connect_timeout_ms = Some(0);
        let err = resolve(CliOverrides::default(), settings, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_settings_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[feed]\nurl = \"https://feed.example.com/\"\n").unwrap();

        let settings = load_settings_file(&path);
        assert_eq!(
            settings.feed.url.as_deref(),
            Some("https://feed.example.com/")
        );
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[feed\nurl = ").unwrap();

        let settings = load_settings_file(&path);
        assert!(settings.feed.url.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_file(&dir.path().join("absent.toml"));
        assert!(settings.feed.url.is_none());
    }
}
