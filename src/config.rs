use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::attempts::AttemptLimitConfig;

/// Main configuration for the MFA service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub mfa: MfaSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

/// Knobs for the verification flows.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MfaSettings {
    /// Issuer shown in authenticator apps.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Lifetime of a staged (unconfirmed) secret, in seconds.
    #[serde(default = "default_pending_secret_ttl")]
    pub pending_secret_ttl_secs: u64,
    /// Lifetime of a payment-verified grant window, in seconds.
    #[serde(default = "default_ceremony_ttl")]
    pub ceremony_ttl_secs: u64,
    /// Maximum code-verification attempts per owner per window.
    #[serde(default = "default_max_verify_attempts")]
    pub max_verify_attempts: u32,
    /// Attempt-limit window, in seconds.
    #[serde(default = "default_verify_window")]
    pub verify_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            mfa: MfaSettings::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

impl Default for MfaSettings {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            pending_secret_ttl_secs: default_pending_secret_ttl(),
            ceremony_ttl_secs: default_ceremony_ttl(),
            max_verify_attempts: default_max_verify_attempts(),
            verify_window_secs: default_verify_window(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

fn default_issuer() -> String {
    "RadioIQ".to_string()
}

fn default_pending_secret_ttl() -> u64 {
    300
}

fn default_ceremony_ttl() -> u64 {
    300
}

fn default_max_verify_attempts() -> u32 {
    10
}

fn default_verify_window() -> u64 {
    300
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

impl MfaSettings {
    pub fn attempt_limit(&self) -> AttemptLimitConfig {
        AttemptLimitConfig::new(self.max_verify_attempts, self.verify_window_secs)
    }
}

fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("RADIOIQ_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.mfa.issuer = issuer.into();
        self
    }

    pub fn with_pending_secret_ttl_secs(mut self, secs: u64) -> Self {
        self.config.mfa.pending_secret_ttl_secs = secs;
        self
    }

    pub fn with_ceremony_ttl_secs(mut self, secs: u64) -> Self {
        self.config.mfa.ceremony_ttl_secs = secs;
        self
    }

    pub fn with_attempt_limit(mut self, max_attempts: u32, window_secs: u64) -> Self {
        self.config.mfa.max_verify_attempts = max_attempts;
        self.config.mfa.verify_window_secs = window_secs;
        self
    }

    /// Load configuration from environment variables with RADIOIQ_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        // Check RADIOIQ_PORT first, fall back to PORT (for PaaS compatibility)
        if let Some(port) = get_env_with_prefix("PORT") {
            if let Ok(p) = port.parse() {
                self.config.server.port = p;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(issuer) = get_env_with_prefix("MFA_ISSUER") {
            self.config.mfa.issuer = issuer;
        }
        if let Some(ttl) = get_env_with_prefix("PENDING_SECRET_TTL_SECS") {
            if let Ok(secs) = ttl.parse() {
                self.config.mfa.pending_secret_ttl_secs = secs;
            }
        }
        if let Some(ttl) = get_env_with_prefix("CEREMONY_TTL_SECS") {
            if let Ok(secs) = ttl.parse() {
                self.config.mfa.ceremony_ttl_secs = secs;
            }
        }
        if let Some(max) = get_env_with_prefix("MAX_VERIFY_ATTEMPTS") {
            if let Ok(n) = max.parse() {
                self.config.mfa.max_verify_attempts = n;
            }
        }
        if let Some(window) = get_env_with_prefix("VERIFY_WINDOW_SECS") {
            if let Ok(secs) = window.parse() {
                self.config.mfa.verify_window_secs = secs;
            }
        }
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
