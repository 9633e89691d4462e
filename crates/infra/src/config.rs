//! Process configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use catbridge_migration::{RetryPolicy, TemplatePolicy};

use crate::remote::OdooConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_RETRIES: u32 = 3;
pub const DEFAULT_TASK_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` when no ERP is configured (dev mode: in-memory catalog).
    pub erp: Option<OdooConfig>,
    pub state_db: PathBuf,
    pub bind: SocketAddr,
    pub template_policy: TemplatePolicy,
    /// Task-level retries before a migration pauses.
    pub max_task_retries: u32,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_secs = match var("CATBRIDGE_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("CATBRIDGE_HTTP_TIMEOUT_SECS must be a number of seconds, got {raw:?}"))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let http_retries = parse_count(&var, "CATBRIDGE_HTTP_RETRIES", DEFAULT_HTTP_RETRIES)?;
        let max_task_retries = parse_count(&var, "CATBRIDGE_MAX_RETRIES", DEFAULT_TASK_RETRIES)?;

        let erp = match var("CATBRIDGE_ERP_URL") {
            Some(url) => {
                let required = |key: &str| {
                    var(key).with_context(|| format!("{key} must be set when CATBRIDGE_ERP_URL is set"))
                };
                Some(
                    OdooConfig::new(
                        url,
                        required("CATBRIDGE_ERP_DB")?,
                        required("CATBRIDGE_ERP_USER")?,
                        required("CATBRIDGE_ERP_PASSWORD")?,
                    )
                    .with_timeout(Duration::from_secs(timeout_secs))
                    .with_transport_retry(transport_retry(http_retries)),
                )
            }
            None => None,
        };

        let state_db = match var("CATBRIDGE_STATE_DB") {
            Some(path) => PathBuf::from(path),
            None => default_state_db_path()?,
        };

        let bind_raw = var("CATBRIDGE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .with_context(|| format!("CATBRIDGE_BIND must be host:port, got {bind_raw:?}"))?;

        let template_policy = match var("CATBRIDGE_TEMPLATE_POLICY").as_deref() {
            None | Some("always_create") => TemplatePolicy::AlwaysCreate,
            Some("skip_existing") => TemplatePolicy::SkipExisting,
            Some(other) => bail!("CATBRIDGE_TEMPLATE_POLICY must be always_create or skip_existing, got {other:?}"),
        };

        Ok(Self {
            erp,
            state_db,
            bind,
            template_policy,
            max_task_retries,
        })
    }
}

fn parse_count(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u32,
) -> anyhow::Result<u32> {
    match var(key) {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        None => Ok(default),
    }
}

/// Retries of a single JSON-RPC call on transport errors and 502/503/504.
fn transport_retry(retries: u32) -> RetryPolicy {
    if retries == 0 {
        RetryPolicy::no_retry()
    } else {
        RetryPolicy::exponential(retries, Duration::from_millis(500), Duration::from_secs(8))
    }
}

/// `{data_dir}/catbridge/state.db`.
pub fn default_state_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut path = base;
    path.push("catbridge");
    path.push("state.db");
    Ok(path)
}
