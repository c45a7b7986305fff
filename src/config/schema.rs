//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Request handling behaviour shared by both transports.
    pub gateway: HandlerConfig,

    /// Stream-merge output settings.
    pub merge: MergeConfig,

    /// Spill storage for merged sequence fields.
    pub spill: SpillConfig,

    /// Static credential for outbound calls.
    pub credentials: CredentialsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent requests (backpressure).
    pub max_connections: usize,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// The `[gateway]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Merge streamed records unless a request says `merge=0`.
    pub merge_by_default: bool,

    /// Deadline applied to calls that carry none (0 = no timeout).
    pub default_timeout_secs: u64,

    /// Route of the XML-RPC endpoint.
    pub xmlrpc_path: String,

    /// Append `{"Error": ...}` to a response body that fails after the headers were sent.
    pub error_trailer: bool,

    /// Depth of the channel between the streaming task and the response body.
    pub stream_buffer: usize,
}

impl HandlerConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        match self.default_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            merge_by_default: false,
            default_timeout_secs: 300,
            xmlrpc_path: "/xmlrpc".to_string(),
            error_trailer: false,
            stream_buffer: 16,
        }
    }
}

/// The `[merge]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Response bytes buffered before a chunk is sent.
    pub flush_threshold_bytes: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            flush_threshold_bytes: 32 * 1024,
        }
    }
}

/// The `[spill]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpillConfig {
    /// Directory for temp files; the system temp dir when unset.
    pub directory: Option<PathBuf>,

    /// Bytes kept in memory before a spill moves to disk (0 = always on disk).
    pub memory_threshold_bytes: usize,

    /// LZ4-compress spill files.
    pub compress: bool,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            directory: None,
            memory_threshold_bytes: 64 * 1024,
            compress: true,
        }
    }
}

/// The `[credentials]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    pub password: Option<String>,

    /// Allow sending credentials over an insecure transport.
    pub insecure: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
