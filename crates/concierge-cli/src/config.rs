//! Configuration file support

use concierge_agent::{BrokerConfig, DispatcherConfig, RetryConfig};
use concierge_api::services::OAuthSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for concierge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OAuth2 client registration at the identity provider
    pub identity: OAuthSettings,
    /// Backend base URLs
    pub services: ServiceUrls,
    pub dispatch: DispatchSettings,
    /// Optional cache expiry (unset keeps entries for the process lifetime)
    pub broker: BrokerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceUrls {
    pub hotel_api_base_url: String,
    pub booking_api_base_url: String,
    pub calendar_api_base_url: String,
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            hotel_api_base_url: "http://localhost:8001".to_string(),
            booking_api_base_url: "http://localhost:8001".to_string(),
            calendar_api_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Per-call timeout in seconds
    pub call_timeout_secs: u64,
    /// Retries for read actions
    pub read_retries: u32,
    pub calendar_summary: Option<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
            read_retries: 2,
            calendar_summary: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub token_ttl_secs: Option<u64>,
    pub pending_ttl_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("concierge")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CONCIERGE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file. A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init(path: &Path) -> std::io::Result<PathBuf> {
        if !path.exists() {
            let default_config = Config {
                identity: OAuthSettings {
                    redirect_uri: "http://localhost:3000/callback".to_string(),
                    ..OAuthSettings::default()
                },
                ..Config::default()
            };
            default_config.save(path)?;
        }
        Ok(path.to_path_buf())
    }

    /// Overlay the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Overlay values from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets: [(&str, &mut String); 8] = [
            ("CLIENT_ID", &mut self.identity.client_id),
            ("CLIENT_SECRET", &mut self.identity.client_secret),
            ("TOKEN_URL", &mut self.identity.token_url),
            ("AUTHORIZE_URL", &mut self.identity.authorize_url),
            ("REDIRECT_URI", &mut self.identity.redirect_uri),
            ("HOTEL_API_BASE_URL", &mut self.services.hotel_api_base_url),
            ("BOOKING_API_BASE_URL", &mut self.services.booking_api_base_url),
            ("CALENDAR_API_BASE_URL", &mut self.services.calendar_api_base_url),
        ];
        for (name, target) in targets {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        }
    }

    pub fn validate(&self) -> concierge_api::Result<()> {
        self.identity.validate()?;
        let services = [
            ("hotel_api_base_url", &self.services.hotel_api_base_url),
            ("booking_api_base_url", &self.services.booking_api_base_url),
            ("calendar_api_base_url", &self.services.calendar_api_base_url),
        ];
        for (name, value) in services {
            if value.trim().is_empty() {
                return Err(concierge_api::Error::InvalidConfig(format!(
                    "services.{} is not set",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            token_ttl: self.broker.token_ttl_secs.map(Duration::from_secs),
            pending_ttl: self.broker.pending_ttl_secs.map(Duration::from_secs),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let defaults = DispatcherConfig::default();
        DispatcherConfig {
            call_timeout: Duration::from_secs(self.dispatch.call_timeout_secs),
            read_retry: RetryConfig {
                max_retries: self.dispatch.read_retries,
                ..RetryConfig::default()
            },
            calendar_summary: self
                .dispatch
                .calendar_summary
                .clone()
                .unwrap_or(defaults.calendar_summary),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# concierge configuration file
# Place at ~/.config/concierge/config.toml (Linux) or set CONCIERGE_CONFIG_PATH

# OAuth2 client registration. CLIENT_ID, CLIENT_SECRET, TOKEN_URL,
# AUTHORIZE_URL and REDIRECT_URI in the environment take precedence.
[identity]
client_id = ""
client_secret = ""
authorize_url = "https://api.asgardeo.io/t/<org>/oauth2/authorize"
token_url = "https://api.asgardeo.io/t/<org>/oauth2/token"
redirect_uri = "http://localhost:3000/callback"

# Backend services (HOTEL_API_BASE_URL, BOOKING_API_BASE_URL,
# CALENDAR_API_BASE_URL override these)
[services]
hotel_api_base_url = "http://localhost:8001"
booking_api_base_url = "http://localhost:8001"
calendar_api_base_url = "https://www.googleapis.com/calendar/v3"

[dispatch]
call_timeout_secs = 30
read_retries = 2
# calendar_summary = "Hotel stay"

# Cache expiry in seconds (optional, unset = keep for the process lifetime)
[broker]
# token_ttl_secs = 3600
# pending_ttl_secs = 600
"#
}
