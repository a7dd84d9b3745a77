//! Service configuration.
//!
//! Defaults are overlaid by an optional JSON file, then by environment variables,
//! then by command-line flags (applied by the server binary).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Where a table's contents come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableSource {
    /// Snapshot files under `data_dir`.
    #[default]
    LocalFile,
    /// Fetched from `GET {url}?table={name}` and passed through unchanged. Read-only.
    RemoteEndpoint { url: String },
}

/// How a table is exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableAccess {
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub source: TableSource,
}

impl TableAccess {
    pub fn read_only() -> Self { Self { writable: false, source: TableSource::LocalFile } }
    pub fn read_write() -> Self { Self { writable: true, source: TableSource::LocalFile } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accept user records whose secret is stored as plaintext instead of an Argon2 hash.
    #[serde(default = "AuthConfig::default_allow_plaintext")]
    pub allow_plaintext_secrets: bool,
}

impl AuthConfig {
    fn default_allow_plaintext() -> bool { true }
}

impl Default for AuthConfig {
    fn default() -> Self { Self { allow_plaintext_secrets: Self::default_allow_plaintext() } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Folder holding one `<table>.json` snapshot per table, including `user.json`.
    pub data_dir: PathBuf,
    pub pretty_snapshots: bool,
    pub session_ttl_secs: u64,
    /// Add `Secure` to the session cookie. Disable only for plain-HTTP development.
    pub secure_cookies: bool,
    pub remote_timeout_secs: u64,
    pub auth: AuthConfig,
    /// Tables reachable under `/api/{table}`. Anything not listed is 404.
    pub tables: BTreeMap<String, TableAccess>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let mut tables = BTreeMap::new();
        for name in ["claim", "rebuttal", "claimRebuttal", "crisis"] {
            tables.insert(name.to_string(), TableAccess::read_only());
        }
        for name in ["contact", "hero", "note"] {
            tables.insert(name.to_string(), TableAccess::read_write());
        }
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            data_dir: PathBuf::from("db"),
            pretty_snapshots: false,
            session_ttl_secs: 60 * 60,
            secure_cookies: true,
            remote_timeout_secs: 10,
            auth: AuthConfig::default(),
            tables,
        }
    }
}

impl ServiceConfig {
    /// Read a JSON config file; fields it omits keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes).with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Apply `RECORDKEEP_*` overrides (and `PORT`, honoured for PaaS hosts) from `lookup`.
    /// Taking a lookup function keeps this testable without touching the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("RECORDKEEP_HTTP_PORT").or_else(|| lookup("PORT"));
        if let Some(p) = port {
            self.http_port = p.parse::<u16>().with_context(|| format!("invalid port '{}'", p))?;
        }
        if let Some(dir) = lookup("RECORDKEEP_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("RECORDKEEP_SECURE_COOKIES") {
            self.secure_cookies = parse_bool(&v).with_context(|| format!("invalid RECORDKEEP_SECURE_COOKIES '{}'", v))?;
        }
        Ok(())
    }

    pub fn table_access(&self, table: &str) -> Option<&TableAccess> { self.tables.get(table) }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
