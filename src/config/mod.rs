use crate::error::{SocError, SocResult};
use config::{Config, Environment as EnvSource, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

pub mod validation;

use validation::ConfigValidator;

/// Prefix for environment overrides, e.g. `SOC__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "SOC";
pub const DEFAULT_CONFIG_FILE: &str = "scrapsoc";
pub const DEVELOPMENT_KEY_SECRET: &str = "scrapsoc-development-key-hashing-secret";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SocConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    pub environment: Environment,
    #[validate(nested)]
    pub store: StoreConfig,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
    #[validate(nested)]
    pub forensics: ForensicsConfig,
    #[validate(nested)]
    pub insights: InsightsConfig,
    #[validate(nested)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    /// Identify clients by `x-forwarded-for` / `x-real-ip` /
    /// `cf-connecting-ip`. Leave off unless a proxy in front rewrites them.
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    Redis,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Redis => "redis",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub file_path: Option<String>,
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    #[validate(range(min = 1, max = 86400000))]
    pub window_ms: u64,
    #[validate(range(min = 1))]
    pub max_requests: u64,
    #[validate(range(min = 1, max = 86400))]
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct ForensicsConfig {
    pub signing_secret: Option<String>,
    #[validate(range(min = 1, max = 2160))]
    pub default_hours: i64,
}

impl fmt::Debug for ForensicsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForensicsConfig")
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "[REDACTED]"))
            .field("default_hours", &self.default_hours)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InsightsConfig {
    #[validate(range(min = 1, max = 168))]
    pub window_hours: i64,
    #[validate(range(min = 1, max = 10000))]
    pub sample_limit: usize,
}

#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    /// `adminId:key` pairs
    #[serde(default)]
    pub admin_keys: Vec<String>,
    #[validate(length(min = 32))]
    pub key_secret: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("admin_keys", &self.admin_keys.len())
            .field("key_secret", &"[REDACTED]")
            .finish()
    }
}

/// Accounts loaded into the in-memory registry at startup, as `userId:ROLE`.
/// Embedding applications supply their own registry instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default)]
    pub seed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub json_logs: bool,
    pub log_level: String,
}

impl Default for SocConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8081,
                trust_proxy_headers: false,
            },
            environment: Environment::Development,
            store: StoreConfig {
                backend: StoreBackend::Memory,
                file_path: None,
                redis_url: None,
            },
            rate_limit: RateLimitConfig {
                window_ms: crate::rate_limiter::DEFAULT_WINDOW_MS,
                max_requests: crate::rate_limiter::DEFAULT_MAX_REQUESTS,
                sweep_interval_secs: 300,
            },
            forensics: ForensicsConfig {
                signing_secret: None,
                default_hours: 24,
            },
            insights: InsightsConfig {
                window_hours: 24,
                sample_limit: 500,
            },
            auth: AuthConfig {
                admin_keys: Vec::new(),
                key_secret: DEVELOPMENT_KEY_SECRET.to_string(),
            },
            accounts: AccountsConfig::default(),
            observability: ObservabilityConfig {
                json_logs: false,
                log_level: "info".to_string(),
            },
        }
    }
}

impl SocConfig {
    /// Defaults, then `scrapsoc.toml` (or the file named by `SCRAPSOC_CONFIG`)
    /// if present, then `SOC__*` environment variables
    pub fn load() -> SocResult<Self> {
        let file = std::env::var("SCRAPSOC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file)
    }

    pub fn load_from(file: &str) -> SocResult<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| SocError::configuration(format!("Invalid defaults: {}", e)))?;

        let settings = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name(file).required(false))
            .add_source(
                EnvSource::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_keys")
                    .with_list_parse_key("accounts.seed")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SocError::configuration(format!("Failed to load configuration: {}", e)))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| SocError::configuration(format!("Failed to parse configuration: {}", e)))?;

        ConfigValidator::new().validate(&config)?;

        tracing::debug!(environment = %config.environment, "Configuration loaded");
        Ok(config)
    }
}
