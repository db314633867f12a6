//! Configuration for the signal ingress service.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `RECONCILER_BIND_ADDR` | `0.0.0.0:3000` |
//! | `RECONCILER_SPOOL_DIR` | `data/spool` |
//! | `RECONCILER_STORE_PATH` | `data/contributions.json` |
//! | `RECONCILER_SIGNAL_SECRET` | required |

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SPOOL_DIR: &str = "data/spool";
const DEFAULT_STORE_PATH: &str = "data/contributions.json";

/// Errors that can occur while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Settings for the HTTP ingress service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,

    /// Directory holding the durable task spool.
    pub spool_dir: PathBuf,

    /// Contribution snapshot file served by the inspection endpoints.
    pub store_path: PathBuf,

    /// Shared secret for HMAC-SHA256 signal signatures.
    pub signal_secret: Vec<u8>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_raw =
            lookup("RECONCILER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "RECONCILER_BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let signal_secret = lookup("RECONCILER_SIGNAL_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("RECONCILER_SIGNAL_SECRET"))?
            .into_bytes();

        Ok(ServiceConfig {
            bind_addr,
            spool_dir: lookup("RECONCILER_SPOOL_DIR")
                .unwrap_or_else(|| DEFAULT_SPOOL_DIR.to_string())
                .into(),
            store_path: lookup("RECONCILER_STORE_PATH")
                .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string())
                .into(),
            signal_secret,
        })
    }
}
