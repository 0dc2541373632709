//! Command handler modules for the `mkt` CLI.
//!
//! Shared config / connection plumbing lives here; command logic lives in
//! the submodules.

pub mod db;
pub mod workflow;

use std::sync::Arc;

use anyhow::{Context, Result};
use mkt_config::{
    load_layered_yaml, load_layered_yaml_from_strings, resolve_secrets, ServiceConfig,
};
use mkt_orders::{OrderService, TransitionPolicy};
use mkt_store::{PgStore, Repository, ResilientStore, RetryPolicy};
use sqlx::PgPool;
use uuid::Uuid;

pub fn load_config(paths: &[String]) -> Result<ServiceConfig> {
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = if refs.is_empty() {
        load_layered_yaml_from_strings(&[])?
    } else {
        load_layered_yaml(&refs)?
    };
    loaded.service_config()
}

/// Connect to the configured Postgres database. The URL comes from the env
/// var NAMED by `store.database_url_env`.
pub async fn connect(config_paths: &[String]) -> Result<PgPool> {
    let cfg = load_config(config_paths)?;
    connect_with(&cfg).await
}

async fn connect_with(cfg: &ServiceConfig) -> Result<PgPool> {
    let secrets = resolve_secrets(cfg)?;
    let url = secrets.database_url.as_deref().with_context(|| {
        format!(
            "SECRETS_MISSING: env var '{}' (database url) is not set",
            cfg.store.database_url_env
        )
    })?;
    mkt_store::connect(url, cfg.store.max_connections).await
}

pub fn parse_uuid(kind: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid {kind} uuid: {raw}"))
}

/// Order service wired against the configured database.
pub struct Workflow {
    pub orders: OrderService,
}

impl Workflow {
    pub async fn open(config_paths: &[String]) -> Result<Self> {
        let cfg = load_config(config_paths)?;
        let pool = connect_with(&cfg).await?;
        let store = ResilientStore::new(
            Arc::new(PgStore::new(pool)),
            RetryPolicy::from(&cfg.store),
        );
        let repo = Repository::new(Arc::new(store));
        Ok(Self {
            orders: OrderService::new(
                repo,
                TransitionPolicy {
                    buyer_may_cancel: cfg.workflow.buyer_may_cancel,
                },
            ),
        })
    }
}
