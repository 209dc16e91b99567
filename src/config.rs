use anyhow::{Context, Result};
use chrono::Duration;
use std::env;
use std::net::{IpAddr, SocketAddr};

use crate::idempotency::DEFAULT_TTL_SECS;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub idempotency_ttl: Duration,
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            idempotency_ttl: Duration::seconds(DEFAULT_TTL_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ip: IpAddr = match get("BIND_ADDR") {
            Some(v) => v.trim().parse().with_context(|| format!("Invalid BIND_ADDR '{}'", v))?,
            None => defaults.addr.ip(),
        };
        let port: u16 = match get("PORT") {
            Some(v) => v.trim().parse().with_context(|| format!("Invalid PORT '{}'", v))?,
            None => defaults.addr.port(),
        };
        let ttl_secs: i64 = match get("IDEMPOTENCY_TTL_SECS") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Invalid IDEMPOTENCY_TTL_SECS '{}'", v))?,
            None => DEFAULT_TTL_SECS,
        };
        if ttl_secs <= 0 {
            anyhow::bail!("IDEMPOTENCY_TTL_SECS must be positive, got {}", ttl_secs);
        }
        let idempotency_ttl = Duration::try_seconds(ttl_secs)
            .with_context(|| format!("IDEMPOTENCY_TTL_SECS out of range: {}", ttl_secs))?;
        let max_body_bytes: usize = match get("MAX_BODY_BYTES") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Invalid MAX_BODY_BYTES '{}'", v))?,
            None => defaults.max_body_bytes,
        };
        if max_body_bytes == 0 {
            anyhow::bail!("MAX_BODY_BYTES must be positive");
        }

        Ok(Self {
            addr: SocketAddr::new(ip, port),
            idempotency_ttl,
            max_body_bytes,
        })
    }
}
