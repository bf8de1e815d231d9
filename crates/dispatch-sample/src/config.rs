//! # Sample Configuration
//!
//! [`SampleConfig`] is read from a TOML file, then `DISPATCH_HOST` and
//! `DISPATCH_PORT` override where the users listener binds. Every section is
//! optional:
//!
//! ```toml
//! color = "blue"
//!
//! [listener]
//! host = "127.0.0.1"
//! port = 3000
//!
//! [remote]            # omit to talk to the listener started above
//! host = "10.0.0.7"
//! port = 3000
//! connect_timeout_ms = 2000
//!
//! [dispatcher]
//! sweep_interval_ms = 60000
//!
//! [id_cache]          # omit to generate a fresh id on every call
//! expires_in_ms = 1000
//! generate_timeout_ms = 3000
//! ```

use crate::error::SampleError;
use action_dispatch::{CacheConfig, ClientConfig, DispatcherConfig, ListenerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const HOST_ENV: &str = "DISPATCH_HOST";
pub const PORT_ENV: &str = "DISPATCH_PORT";

fn default_color() -> String {
    "red".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub listener: ListenerConfig,
    pub remote: Option<ClientConfig>,
    pub dispatcher: DispatcherConfig,
    pub id_cache: Option<CacheConfig>,
    /// Option handed to the `foo:bar` plugin.
    pub color: String,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            remote: None,
            dispatcher: DispatcherConfig::default(),
            id_cache: None,
            color: default_color(),
        }
    }
}

impl SampleConfig {
    /// Reads `path` and applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, SampleError> {
        info!(path = %path.display(), "Loading configuration");
        let text = std::fs::read_to_string(path)
            .map_err(|e| SampleError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, SampleError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `DISPATCH_HOST` / `DISPATCH_PORT` when set.
    pub fn apply_env(&mut self) -> Result<(), SampleError> {
        let host = std::env::var(HOST_ENV).ok();
        let port = std::env::var(PORT_ENV).ok();
        self.apply_overrides(host, port)
    }

    pub fn apply_overrides(
        &mut self,
        host: Option<String>,
        port: Option<String>,
    ) -> Result<(), SampleError> {
        if let Some(host) = host {
            self.listener.host = host;
        }
        if let Some(port) = port {
            self.listener.port = port
                .trim()
                .parse()
                .map_err(|_| SampleError::Config(format!("{PORT_ENV} is not a port: '{port}'")))?;
        }
        Ok(())
    }
}
