use super::{SocConfig, StoreBackend, DEVELOPMENT_KEY_SECRET};
use crate::auth::MIN_API_KEY_LENGTH;
use crate::containment::Role;
use crate::error::{SocError, SocResult};
use crate::forensics::chain_signer::{INSECURE_FALLBACK_SECRET, MIN_SECRET_LENGTH};
use validator::Validate;

/// Field checks from the derive plus the rules that span sections
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, config: &SocConfig) -> SocResult<()> {
        config
            .validate()
            .map_err(|e| SocError::configuration(format!("Configuration validation failed: {}", e)))?;

        SecretsRule.check(config)?;
        StoreRule.check(config)?;
        AdminKeysRule.check(config)?;
        AccountSeedRule.check(config)?;

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

trait Rule {
    fn check(&self, config: &SocConfig) -> SocResult<()>;
}

/// Signing and key-hashing secrets
struct SecretsRule;

impl Rule for SecretsRule {
    fn check(&self, config: &SocConfig) -> SocResult<()> {
        let production = config.environment.is_production();

        match config.forensics.signing_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => {
                if secret.len() < MIN_SECRET_LENGTH {
                    return Err(SocError::configuration(format!(
                        "forensics.signing_secret must be at least {} characters long",
                        MIN_SECRET_LENGTH
                    )));
                }
                if production && secret == INSECURE_FALLBACK_SECRET {
                    return Err(SocError::configuration(
                        "forensics.signing_secret must not be the development fallback in production",
                    ));
                }
            }
            _ if production => {
                return Err(SocError::configuration(
                    "forensics.signing_secret must be set in production",
                ));
            }
            _ => {}
        }

        if production && config.auth.key_secret == DEVELOPMENT_KEY_SECRET {
            return Err(SocError::configuration(
                "auth.key_secret must be changed from the development default in production",
            ));
        }

        Ok(())
    }
}

/// Backend-specific settings must be present
struct StoreRule;

impl Rule for StoreRule {
    fn check(&self, config: &SocConfig) -> SocResult<()> {
        match config.store.backend {
            StoreBackend::Redis => {
                let url = config.store.redis_url.as_deref().unwrap_or_default();
                if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                    return Err(SocError::configuration(
                        "store.redis_url must start with redis:// or rediss://",
                    ));
                }
            }
            StoreBackend::File => {
                if config.store.file_path.as_deref().map_or(true, |p| p.trim().is_empty()) {
                    return Err(SocError::configuration(
                        "store.file_path is required for the file backend",
                    ));
                }
            }
            StoreBackend::Memory => {
                if config.environment.is_production() {
                    tracing::warn!("Memory event store in production: the security log is lost on restart");
                }
            }
        }
        Ok(())
    }
}

struct AdminKeysRule;

impl Rule for AdminKeysRule {
    fn check(&self, config: &SocConfig) -> SocResult<()> {
        for entry in &config.auth.admin_keys {
            let valid = entry
                .split_once(':')
                .map_or(false, |(id, key)| !id.trim().is_empty() && key.len() >= MIN_API_KEY_LENGTH);
            if !valid {
                return Err(SocError::configuration(format!(
                    "auth.admin_keys entries must look like 'adminId:key' with a key of at least {} characters",
                    MIN_API_KEY_LENGTH
                )));
            }
        }

        if config.environment.is_production() && config.auth.admin_keys.is_empty() {
            return Err(SocError::configuration(
                "auth.admin_keys must not be empty in production",
            ));
        }
        Ok(())
    }
}

struct AccountSeedRule;

impl Rule for AccountSeedRule {
    fn check(&self, config: &SocConfig) -> SocResult<()> {
        for entry in &config.accounts.seed {
            let valid = entry
                .split_once(':')
                .map_or(false, |(id, role)| !id.trim().is_empty() && Role::parse(role).is_some());
            if !valid {
                return Err(SocError::configuration(format!(
                    "accounts.seed entry '{}' must look like 'userId:ROLE'",
                    entry
                )));
            }
        }
        Ok(())
    }
}
