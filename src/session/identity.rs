//! User identity resolution.
//!
//! Providers are tried in order; any failure falls through to the next,
//! and the final fallback is the stored-or-generated local identifier.
//! Once resolved, the id is persisted and never changes for the lifetime
//! of the installation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use rand::Rng;

use super::store::{StateStore, USER_ID_KEY};

/// A source of user identity, e.g. an external login provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the provider is reachable but knows no identity
    /// (e.g. not logged in); errors are swallowed by the fallback chain.
    async fn resolve(&self) -> Result<Option<String>>;
}

/// Identity from an environment variable, standing in for an external
/// profile lookup in headless deployments.
pub struct EnvIdentity {
    var: String,
}

impl EnvIdentity {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl IdentityProvider for EnvIdentity {
    fn name(&self) -> &str {
        "env"
    }

    async fn resolve(&self) -> Result<Option<String>> {
        Ok(std::env::var(&self.var)
            .ok()
            .filter(|value| !value.trim().is_empty()))
    }
}

/// Resolve the user id through the provider chain, persisting the result.
pub async fn resolve_user_id(
    providers: &[Box<dyn IdentityProvider>],
    store: &mut dyn StateStore,
) -> Result<String> {
    for provider in providers {
        match provider.resolve().await {
            Ok(Some(id)) => {
                store.set(USER_ID_KEY, &id)?;
                return Ok(id);
            }
            Ok(None) => debug!("identity provider '{}' had no identity", provider.name()),
            Err(err) => debug!("identity provider '{}' failed: {err:#}", provider.name()),
        }
    }

    if let Some(stored) = store.get(USER_ID_KEY) {
        return Ok(stored);
    }

    let generated = generate_local_id();
    store.set(USER_ID_KEY, &generated)?;
    Ok(generated)
}

/// Temporary local identity: `temp_<millis>_<7 base36 chars>`.
fn generate_local_id() -> String {
    format!("temp_{}_{}", Utc::now().timestamp_millis(), random_suffix(7))
}

/// Lowercase base36 suffix, as the original run-id scheme uses.
pub fn random_suffix(len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}
