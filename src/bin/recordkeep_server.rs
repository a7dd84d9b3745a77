//!
//! recordkeep server binary
//! -------------------------
//! Command-line entry point for the record service. Supports configuration via a JSON
//! file, environment variables and CLI flags (flags win).

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use recordkeep::config::ServiceConfig;

fn parse_port_arg(args: &[String], flag: &str) -> Result<Option<u16>> {
    match arg_value(args, flag) {
        Some(v) => Ok(Some(v.parse::<u16>().with_context(|| format!("invalid value for {}: '{}'", flag, v))?)),
        None => Ok(None),
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).cloned();
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn resolve_config(args: &[String]) -> Result<ServiceConfig> {
    let path = arg_value(args, "--config").or_else(|| env::var("RECORDKEEP_CONFIG").ok()).map(PathBuf::from);
    let mut cfg = match path {
        Some(p) => ServiceConfig::load(&p)?,
        None => ServiceConfig::default(),
    };
    cfg.apply_env(|k| env::var(k).ok())?;
    if let Some(port) = parse_port_arg(args, "--http-port")? {
        cfg.http_port = port;
    }
    if let Some(dir) = arg_value(args, "--data-dir") {
        cfg.data_dir = PathBuf::from(dir);
    }
    if has_flag(args, "--insecure-cookies") {
        cfg.secure_cookies = false;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("recordkeep server\n\nUSAGE:\n  recordkeep_server [--config PATH] [--http-port N] [--data-dir PATH] [--insecure-cookies]\n  recordkeep_server --hash-password PASSWORD\n\nOPTIONS:\n  --config PATH         JSON config file (env: RECORDKEEP_CONFIG)\n  --http-port N         HTTP port (env: RECORDKEEP_HTTP_PORT or PORT, default 8080)\n  --data-dir PATH       Folder with <table>.json snapshots and user.json (env: RECORDKEEP_DATA_DIR, default db)\n  --insecure-cookies    Omit the Secure cookie attribute (plain-HTTP development only)\n  --hash-password PW    Print an Argon2 hash to store as a user's password_hash and exit\n");
        return Ok(());
    }

    if has_flag(&args, "--hash-password") {
        let pw = arg_value(&args, "--hash-password").context("--hash-password needs a value")?;
        println!("{}", recordkeep::security::hash_password(&pw)?);
        return Ok(());
    }

    // Initialize tracing subscriber with env filter, defaulting to info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cfg = resolve_config(&args)?;
    tracing::info!("Using port: http={}, data_dir={}", cfg.http_port, cfg.data_dir.display());
    recordkeep::server::run(cfg).await
}
