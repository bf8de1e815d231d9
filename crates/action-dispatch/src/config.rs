//! # Configuration
//!
//! Plain `serde` structs for the knobs the dispatcher consumes: where a listener
//! binds, where a client connects, and how a cached action expires. Every field
//! has a default so partial documents (TOML, JSON, env-derived) deserialize.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest frame accepted on the wire unless configured otherwise (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

/// Where an [`ActionListener`](crate::transport::ActionListener) binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
    pub max_frame_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl ListenerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Remote endpoint a [`RemoteClient`](crate::transport::RemoteClient) talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: 2_000,
            request_timeout_ms: 10_000,
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Serializable form of a [`CachePolicy`](crate::cache::CachePolicy).
///
/// Custom key functions cannot be expressed here; attach them in code with
/// [`CachePolicy::with_key`](crate::cache::CachePolicy::with_key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub expires_in_ms: u64,
    pub generate_timeout_ms: u64,
    pub bypass_uncacheable: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expires_in_ms: 1_000,
            generate_timeout_ms: 3_000,
            bypass_uncacheable: false,
        }
    }
}

/// Settings for a [`Dispatcher`](crate::Dispatcher) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// How often the background sweeper purges expired cache entries.
    /// Zero disables the sweeper.
    pub sweep_interval_ms: u64,
}

impl DispatcherConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 60_000,
        }
    }
}
