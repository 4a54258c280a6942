use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use blake3::Hasher;
use std::collections::HashMap;
use std::sync::Arc;

pub const MIN_API_KEY_LENGTH: usize = 32;

/// The operator behind a request, as resolved by the session layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub admin_id: String,
}

/// Resolves bearer keys to admin principals.
///
/// Only keyed hashes of the keys are kept in memory.
pub struct ApiKeyValidator {
    secret: String,
    keys: HashMap<String, String>,
    allow_anonymous: bool,
}

impl ApiKeyValidator {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            keys: HashMap::new(),
            allow_anonymous: false,
        }
    }

    /// Build from `adminId:key` entries
    pub fn from_entries(secret: String, entries: &[String]) -> anyhow::Result<Self> {
        let mut validator = Self::new(secret);
        for entry in entries {
            let (admin_id, api_key) = entry
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("Admin key entry must look like 'adminId:key'"))?;
            validator.register(admin_id, api_key)?;
        }
        Ok(validator)
    }

    /// Let requests without an Authorization header through without a
    /// principal. Presented keys are still checked.
    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    pub fn register(&mut self, admin_id: &str, api_key: &str) -> anyhow::Result<()> {
        let admin_id = admin_id.trim();
        if admin_id.is_empty() {
            anyhow::bail!("Admin id must not be empty");
        }
        if api_key.len() < MIN_API_KEY_LENGTH {
            anyhow::bail!(
                "API key for {} must be at least {} characters",
                admin_id,
                MIN_API_KEY_LENGTH
            );
        }
        let hash = self.hash_api_key(api_key);
        self.keys.insert(hash, admin_id.to_string());
        Ok(())
    }

    pub fn resolve(&self, api_key: &str) -> Option<Principal> {
        if api_key.len() < MIN_API_KEY_LENGTH {
            return None;
        }
        self.keys
            .get(&self.hash_api_key(api_key))
            .map(|admin_id| Principal {
                admin_id: admin_id.clone(),
            })
    }

    pub fn hash_api_key(&self, api_key: &str) -> String {
        let mut hasher = Hasher::new();
        hasher.update(api_key.as_bytes());
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

pub async fn auth_middleware(
    State(validator): State<Arc<ApiKeyValidator>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = headers.get("authorization").and_then(|h| h.to_str().ok());

    let api_key = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(key) => key.trim(),
        None if auth_header.is_none() && validator.allow_anonymous => {
            return Ok(next.run(request).await);
        }
        None => {
            tracing::warn!("Missing or invalid Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    match validator.resolve(api_key) {
        Some(principal) => {
            tracing::debug!(admin_id = %principal.admin_id, "API key validation successful");
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!("API key validation failed");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
