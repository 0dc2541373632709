use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed configuration for the daemon and CLI.
///
/// Every field has a default so an empty config is a valid in-memory dev
/// setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub daemon: DaemonSection,
    pub store: StoreSection,
    pub workflow: WorkflowSection,
    pub messaging: MessagingSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub bind_addr: String,
    /// Browser origins allowed by CORS.
    pub allowed_origins: Vec<String>,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    /// NAME of the env var holding the database URL (never the URL itself).
    pub database_url_env: String,
    pub max_connections: u32,
    /// Upper bound on every single store call.
    pub timeout_ms: u64,
    /// Extra attempts for idempotent reads after a transient failure.
    pub read_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub retry_backoff_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url_env: "MKT_DATABASE_URL".to_string(),
            max_connections: 10,
            timeout_ms: 5_000,
            read_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkflowSection {
    /// When true the buyer may also request `cancelled`. Vendor-only by default.
    pub buyer_may_cancel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingSection {
    pub default_page_limit: u32,
    pub max_page_limit: u32,
}

impl Default for MessagingSection {
    fn default() -> Self {
        Self {
            default_page_limit: 100,
            max_page_limit: 1_000,
        }
    }
}

impl ServiceConfig {
    /// Build from canonical config JSON (produced by `load_layered_yaml*`).
    pub fn from_json(cfg: &Value) -> Result<Self> {
        let parsed: ServiceConfig =
            serde_json::from_value(cfg.clone()).context("config does not match ServiceConfig")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.timeout_ms == 0 {
            bail!("store.timeout_ms must be > 0");
        }
        if self.store.database_url_env.trim().is_empty() {
            bail!("store.database_url_env must name an env var");
        }
        if self.messaging.default_page_limit == 0 || self.messaging.max_page_limit == 0 {
            bail!("messaging page limits must be > 0");
        }
        if self.messaging.default_page_limit > self.messaging.max_page_limit {
            bail!(
                "messaging.default_page_limit ({}) exceeds max_page_limit ({})",
                self.messaging.default_page_limit,
                self.messaging.max_page_limit
            );
        }
        Ok(())
    }
}
