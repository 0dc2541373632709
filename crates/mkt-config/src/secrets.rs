//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"MKT_DATABASE_URL"`).
//! - Binaries call [`resolve_secrets`] once at startup and pass the result
//!   into constructors; `std::env::var` is not called anywhere else.
//! - `Debug` redacts values; errors mention the NAME only.

use anyhow::{bail, Result};

use crate::{ServiceConfig, StoreBackend};

/// All runtime-resolved secrets for one process.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Postgres connection URL. `None` when the memory backend is configured
    /// and the named env var is absent.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Resolve a named environment variable. Blank counts as unset.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve every secret the configured backends need.
///
/// # Errors
/// `SECRETS_MISSING` naming the env var when the postgres backend is
/// configured but its URL variable is unset or blank.
pub fn resolve_secrets(cfg: &ServiceConfig) -> Result<ResolvedSecrets> {
    resolve_secrets_with(cfg, resolve_env)
}

/// Same as [`resolve_secrets`] with an injectable lookup, for tests.
pub fn resolve_secrets_with<F>(cfg: &ServiceConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let var = cfg.store.database_url_env.trim();
    let database_url = lookup(var).filter(|v| !v.trim().is_empty());

    if cfg.store.backend == StoreBackend::Postgres && database_url.is_none() {
        bail!(
            "SECRETS_MISSING backend=postgres: required env var '{}' \
             (database url) is not set or empty",
            var
        );
    }

    Ok(ResolvedSecrets { database_url })
}
